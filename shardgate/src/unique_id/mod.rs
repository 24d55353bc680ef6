//! Unique key generation for INSERTs that leave the key column out.
//!
//! One generator exists per key namespace (logical table and column).
//! Generators own their state; nothing here is process-global.

pub mod error;
pub mod random;
pub mod segment;
pub mod snowflake;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use parking_lot::Mutex;
use shardgate_config::{KeyGeneratorConfig, KeyGeneratorKind};
use tracing::info;

pub use error::Error;
pub use random::RandomKey;
pub use segment::{Block, Coordinator, FileCoordinator, Lease, MemoryCoordinator, Segment};
pub use snowflake::{Clock, Snowflake, SystemClock};

/// A generated key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeneratedKey {
    Long(i64),
    Text(String),
}

impl Display for GeneratedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "{}", value),
        }
    }
}

/// Key generator, selected by configuration.
#[derive(Debug)]
pub enum KeyGenerator {
    Snowflake(Snowflake),
    Segment(Segment),
    Random(RandomKey),
}

impl KeyGenerator {
    /// Build a generator for `namespace`.
    pub fn new(namespace: &str, config: &KeyGeneratorConfig) -> Result<Self, Error> {
        Ok(match config.kind {
            KeyGeneratorKind::Snowflake => Self::Snowflake(Snowflake::new(&config.props)?),
            KeyGeneratorKind::LeafSegment => {
                Self::Segment(Segment::from_props(namespace, &config.props)?)
            }
            KeyGeneratorKind::Uuid => Self::Random(RandomKey),
        })
    }

    /// Generate one key.
    pub async fn next_key(&self) -> Result<GeneratedKey, Error> {
        Ok(match self {
            Self::Snowflake(snowflake) => GeneratedKey::Long(snowflake.next_id().await?),
            Self::Segment(segment) => GeneratedKey::Long(segment.next_id().await?),
            Self::Random(random) => GeneratedKey::Text(random.next_id()),
        })
    }

    /// Generate exactly `count` keys.
    pub async fn next_keys(&self, count: usize) -> Result<Vec<GeneratedKey>, Error> {
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.next_key().await?);
        }
        Ok(keys)
    }
}

/// Generators by namespace, kept across rule reloads.
///
/// Rebuilding a generator on every reload would reset its state
/// (last timestamp, leased block) and could hand out duplicates,
/// so an existing generator is reused as long as its configuration
/// didn't change.
#[derive(Debug, Default)]
pub struct KeyGenerators {
    generators: Mutex<HashMap<String, (KeyGeneratorConfig, Arc<KeyGenerator>)>>,
}

impl KeyGenerators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the generator for `namespace`, creating it if needed.
    pub fn get_or_create(
        &self,
        namespace: &str,
        config: &KeyGeneratorConfig,
    ) -> Result<Arc<KeyGenerator>, Error> {
        let mut generators = self.generators.lock();

        if let Some((existing, generator)) = generators.get(namespace) {
            if existing == config {
                return Ok(generator.clone());
            }
        }

        let generator = Arc::new(KeyGenerator::new(namespace, config)?);
        info!("{} key generator for \"{}\" ready", config.kind, namespace);
        generators.insert(namespace.to_string(), (config.clone(), generator.clone()));

        Ok(generator)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use shardgate_config::Props;

    use super::*;

    fn config(kind: KeyGeneratorKind, props: &[(&str, &str)]) -> KeyGeneratorConfig {
        KeyGeneratorConfig {
            column: "id".into(),
            kind,
            props: props.iter().copied().collect::<Props>(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_keys_distinct() {
        for kind in [
            KeyGeneratorKind::Snowflake,
            KeyGeneratorKind::LeafSegment,
            KeyGeneratorKind::Uuid,
        ] {
            let generator = Arc::new(
                KeyGenerator::new(
                    "t_order.id",
                    &config(kind, &[("serverList", "memory"), ("step", "13")]),
                )
                .unwrap(),
            );

            let mut handles = vec![];
            for _ in 0..10 {
                let generator = generator.clone();
                handles.push(tokio::spawn(async move {
                    generator.next_keys(500).await.unwrap()
                }));
            }

            let mut keys = HashSet::new();
            for handle in handles {
                let batch = handle.await.unwrap();
                assert_eq!(batch.len(), 500);
                keys.extend(batch);
            }
            assert_eq!(keys.len(), 5_000, "{} produced duplicates", kind);
        }
    }

    #[tokio::test]
    async fn test_generators_reused() {
        let generators = KeyGenerators::new();
        let segment = config(
            KeyGeneratorKind::LeafSegment,
            &[("serverList", "memory"), ("step", "100")],
        );

        let first = generators.get_or_create("t_order.id", &segment).unwrap();
        assert_eq!(first.next_key().await.unwrap(), GeneratedKey::Long(1));

        let again = generators.get_or_create("t_order.id", &segment).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.next_key().await.unwrap(), GeneratedKey::Long(2));

        let changed = config(KeyGeneratorKind::Snowflake, &[]);
        let replaced = generators.get_or_create("t_order.id", &changed).unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
    }

    #[test]
    fn test_invalid_config() {
        let err = KeyGenerator::new(
            "t_order.id",
            &config(KeyGeneratorKind::Snowflake, &[("worker.id", "5000")]),
        )
        .unwrap_err();
        assert!(err.is_config());
    }
}
