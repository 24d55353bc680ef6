//! Positional edits over the original SQL text.

use super::Error;

/// An edit. Positions are byte offsets, `stop` inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlToken {
    Replace {
        start: usize,
        stop: usize,
        text: String,
    },
    Remove {
        start: usize,
        stop: usize,
    },
    /// Insert `text` before `index`.
    Insert { index: usize, text: String },
}

impl SqlToken {
    pub fn replace(start: usize, stop: usize, text: impl ToString) -> Self {
        Self::Replace {
            start,
            stop,
            text: text.to_string(),
        }
    }

    pub fn remove(start: usize, stop: usize) -> Self {
        Self::Remove { start, stop }
    }

    pub fn insert(index: usize, text: impl ToString) -> Self {
        Self::Insert {
            index,
            text: text.to_string(),
        }
    }

    pub fn start(&self) -> usize {
        match self {
            Self::Replace { start, .. } | Self::Remove { start, .. } => *start,
            Self::Insert { index, .. } => *index,
        }
    }

    /// Inserts go before whatever else starts at the same index.
    fn sort_key(&self) -> (usize, u8) {
        match self {
            Self::Insert { index, .. } => (*index, 0),
            _ => (self.start(), 1),
        }
    }

    /// Does the edit replace or remove the text at `position`.
    pub fn covers(&self, position: usize) -> bool {
        match self {
            Self::Replace { start, stop, .. } | Self::Remove { start, stop } => {
                *start <= position && position <= *stop
            }
            Self::Insert { .. } => false,
        }
    }
}

/// Remove some elements of a list, separators included, so that what's
/// left is still a valid list.
///
/// `spans` are the (start, stop) of every element, in order. An element
/// with a kept element somewhere before it is removed from the end of
/// its previous sibling to its own end, taking the separator in front of
/// it. Otherwise it goes from its own start to the start of its next
/// sibling.
pub fn remove_elements(spans: &[(usize, usize)], remove: &[usize]) -> Vec<SqlToken> {
    let mut tokens = vec![];
    let mut kept_before = false;

    for (index, (start, stop)) in spans.iter().enumerate() {
        if !remove.contains(&index) {
            kept_before = true;
            continue;
        }

        let token = if kept_before {
            SqlToken::remove(spans[index - 1].1 + 1, *stop)
        } else if let Some((next, _)) = spans.get(index + 1) {
            SqlToken::remove(*start, next - 1)
        } else {
            SqlToken::remove(*start, *stop)
        };
        tokens.push(token);
    }

    tokens
}

/// Apply edits to `sql`.
///
/// Edits are sorted by position first. They must not overlap and must
/// fall within the text; a violation is a bug in whoever produced them
/// and fails the whole rewrite.
pub fn apply(sql: &str, tokens: &mut [SqlToken]) -> Result<String, Error> {
    tokens.sort_by_key(|token| token.sort_key());

    let mut result = String::with_capacity(sql.len());
    let mut cursor = 0;

    for token in tokens.iter() {
        let (start, stop) = match token {
            SqlToken::Replace { start, stop, .. } | SqlToken::Remove { start, stop } => {
                (*start, Some(*stop))
            }
            SqlToken::Insert { index, .. } => (*index, None),
        };

        let end = stop.map(|stop| stop + 1).unwrap_or(start);
        if start > end
            || end > sql.len()
            || !sql.is_char_boundary(start)
            || !sql.is_char_boundary(end)
        {
            return Err(Error::TokenOutOfBounds {
                start,
                stop: stop.unwrap_or(start),
                len: sql.len(),
            });
        }

        if start < cursor {
            return Err(Error::OverlappingTokens {
                start,
                stop: stop.unwrap_or(start),
            });
        }

        result.push_str(&sql[cursor..start]);
        match token {
            SqlToken::Replace { text, .. } | SqlToken::Insert { text, .. } => {
                result.push_str(text)
            }
            SqlToken::Remove { .. } => (),
        }
        cursor = end;
    }

    result.push_str(&sql[cursor..]);

    Ok(result)
}
