//! Runtime settings for the ledger service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Cents, DEFAULT_HISTORY_LIMIT};

/// Tunables for `LedgerService` and its storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Credit seeded into every new ledger (5000.00 by default)
    #[serde(default = "default_welcome_bonus")]
    pub welcome_bonus_cents: Cents,

    /// Length of `recent_history` when the caller does not choose one
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,

    /// Number of transactions embedded in a summary
    #[serde(default = "default_summary_recent_limit")]
    pub summary_recent_limit: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Longest a mutation waits for its ledger's lock before giving up
    #[serde(default = "default_lock_timeout", with = "millis", rename = "lock_timeout_ms")]
    pub lock_timeout: Duration,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database file
    #[serde(default = "default_busy_timeout", with = "millis", rename = "busy_timeout_ms")]
    pub busy_timeout: Duration,
}

fn default_welcome_bonus() -> Cents {
    500_000
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_summary_recent_limit() -> usize {
    5
}

fn default_page_size() -> usize {
    10
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            welcome_bonus_cents: default_welcome_bonus(),
            default_history_limit: default_history_limit(),
            summary_recent_limit: default_summary_recent_limit(),
            default_page_size: default_page_size(),
            lock_timeout: default_lock_timeout(),
            max_connections: default_max_connections(),
            busy_timeout: default_busy_timeout(),
        }
    }
}

impl LedgerConfig {
    pub fn with_welcome_bonus(mut self, cents: Cents) -> Self {
        self.welcome_bonus_cents = cents;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
