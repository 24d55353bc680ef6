//! Random (UUID v4) keys.

use uuid::Uuid;

/// Stateless generator of 32-character hex keys. No ordering guarantees.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomKey;

impl RandomKey {
    pub fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
