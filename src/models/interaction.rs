use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INTERACTION_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub event: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl InteractionEvent {
    pub fn new(event: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            at,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Append to a capped log, dropping the oldest entries. Returns how many
/// entries were dropped.
pub fn append_capped<T>(log: &mut Vec<T>, item: T, capacity: usize) -> usize {
    log.push(item);
    let overflow = log.len().saturating_sub(capacity.max(1));
    log.drain(..overflow);
    overflow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_capped_drops_oldest() {
        let mut log = vec![1, 2, 3];
        let dropped = append_capped(&mut log, 4, 3);
        assert_eq!(dropped, 1);
        assert_eq!(log, vec![2, 3, 4]);
    }

    #[test]
    fn test_append_capped_under_capacity() {
        let mut log = vec![1];
        assert_eq!(append_capped(&mut log, 2, 3), 0);
        assert_eq!(log, vec![1, 2]);
    }
}
