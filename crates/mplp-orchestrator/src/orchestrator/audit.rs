//! Bounded audit trail of registry mutations.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// One audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub event: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer keeping the most recent `capacity` records.
pub(crate) struct AuditLog {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
}

impl AuditLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub(crate) fn record(&self, event: &str, details: Value) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(AuditRecord {
            event: event.to_string(),
            details,
            timestamp: Utc::now(),
        });
    }

    /// The last `limit` records (all when `None`), oldest first.
    pub(crate) fn recent(&self, limit: Option<usize>) -> Vec<AuditRecord> {
        let records = self.records.lock();
        let skip = limit.map_or(0, |limit| records.len().saturating_sub(limit));
        records.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ring_drops_oldest() {
        let log = AuditLog::new(2);
        log.record("a", json!(1));
        log.record("b", json!(2));
        log.record("c", json!(3));

        let events: Vec<String> = log.recent(None).into_iter().map(|r| r.event).collect();
        assert_eq!(events, vec!["b", "c"]);
    }

    #[test]
    fn test_recent_limit() {
        let log = AuditLog::new(10);
        for name in ["a", "b", "c"] {
            log.record(name, Value::Null);
        }
        let events: Vec<String> = log.recent(Some(2)).into_iter().map(|r| r.event).collect();
        assert_eq!(events, vec!["b", "c"]);
        assert_eq!(log.recent(Some(10)).len(), 3);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let log = AuditLog::new(0);
        log.record("a", Value::Null);
        assert!(log.recent(None).is_empty());
    }
}
