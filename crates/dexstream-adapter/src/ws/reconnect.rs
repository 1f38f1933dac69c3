/*
[INPUT]:  Reconnect attempt counter
[OUTPUT]: Delay before the next connect attempt (or give up)
[POS]:    WebSocket layer - pluggable reconnection policy
[UPDATE]: When adding policies or changing backoff clamping
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the manager does after its transport drops.
///
/// The default never reconnects; callers re-invoke `connect` themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    #[default]
    None,
    Fixed {
        delay_ms: u64,
        #[serde(default)]
        max_retries: Option<u32>,
    },
    ExponentialBackoff {
        base_ms: u64,
        max_ms: u64,
        #[serde(default)]
        max_retries: Option<u32>,
    },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), `None` to stop.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::None => None,
            ReconnectPolicy::Fixed {
                delay_ms,
                max_retries,
            } => within(attempt, max_retries).then(|| Duration::from_millis(delay_ms)),
            ReconnectPolicy::ExponentialBackoff {
                base_ms,
                max_ms,
                max_retries,
            } => within(attempt, max_retries).then(|| {
                let exp = attempt.saturating_sub(1).min(63);
                let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ReconnectPolicy::None)
    }
}

fn within(attempt: u32, max_retries: Option<u32>) -> bool {
    attempt >= 1 && max_retries.is_none_or(|max| attempt <= max)
}
