// Bounded log of routing decisions for diagnostics. Appends take a short
// mutex-guarded critical section and never allocate once the buffer is full.
use crate::metrics_defs::ROUTING_HISTORY_EVICTED;
use crate::types::{Alias, DataCategory, Operation};
use parking_lot::Mutex;
use serde::Serialize;
use shared::counter;
use std::collections::VecDeque;
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub operation: Operation,
    pub data_category: DataCategory,
    pub chosen_alias: Alias,
    /// Tenant the decision was made for. `None` for infra data.
    pub tenant: Option<String>,
    pub timestamp: SystemTime,
}

#[derive(Debug)]
pub struct RoutingHistory {
    capacity: usize,
    entries: Mutex<VecDeque<RoutingDecision>>,
}

impl RoutingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RoutingHistory {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends a decision, evicting the oldest one when full.
    pub fn record(&self, decision: RoutingDecision) {
        let evicted = {
            let mut entries = self.entries.lock();
            let evicted = entries.len() == self.capacity;
            if evicted {
                entries.pop_front();
            }
            entries.push_back(decision);
            evicted
        };

        if evicted {
            counter!(ROUTING_HISTORY_EVICTED).increment(1);
        }
    }

    /// Decisions from oldest to newest.
    pub fn snapshot(&self) -> Vec<RoutingDecision> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
