//! Bounded backlog for events that could not be written immediately
//!
//! On overflow the oldest non-critical event is evicted. Critical events are only
//! evicted when nothing else is left to sacrifice.

use crate::event::SecurityEvent;
use std::collections::VecDeque;

/// An event pushed out of a full backlog
#[derive(Debug, Clone)]
pub struct Eviction {
    pub event: SecurityEvent,
}

impl Eviction {
    pub fn is_critical(&self) -> bool {
        self.event.is_critical()
    }
}

#[derive(Debug)]
pub struct BacklogQueue {
    events: VecDeque<SecurityEvent>,
    capacity: usize,
}

impl BacklogQueue {
    /// Create a backlog holding at most `capacity` events
    ///
    /// Callers validate `capacity > 0` before construction.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "backlog capacity must be positive");
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append an event, evicting one if the backlog is full
    pub fn enqueue(&mut self, event: SecurityEvent) -> Option<Eviction> {
        let evicted = if self.events.len() >= self.capacity {
            self.evict_one()
        } else {
            None
        };

        self.events.push_back(event);
        evicted
    }

    /// Put events back at the head of the backlog, keeping their relative order
    ///
    /// Used for events taken by [`dequeue_all`](Self::dequeue_all) that were not
    /// delivered, so they stay ahead of anything queued since. Overflow follows the
    /// same eviction policy as [`enqueue`](Self::enqueue).
    pub fn requeue_front(&mut self, events: Vec<SecurityEvent>) -> Vec<Eviction> {
        let mut evicted = Vec::new();
        for event in events.into_iter().rev() {
            if self.events.len() >= self.capacity {
                evicted.extend(self.evict_one());
            }
            self.events.push_front(event);
        }
        evicted
    }

    /// Take every queued event in FIFO order, leaving the backlog empty
    pub fn dequeue_all(&mut self) -> Vec<SecurityEvent> {
        self.events.drain(..).collect()
    }

    fn evict_one(&mut self) -> Option<Eviction> {
        let index = self
            .events
            .iter()
            .position(|e| !e.is_critical())
            .unwrap_or(0);

        self.events.remove(index).map(|event| Eviction { event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SecurityLevel;
    use serde_json::json;

    fn event(level: SecurityLevel, action: &str) -> SecurityEvent {
        SecurityEvent::new(level, "test", action, json!({}), None)
    }

    fn actions(queue: &mut BacklogQueue) -> Vec<String> {
        queue.dequeue_all().into_iter().map(|e| e.action).collect()
    }

    #[test]
    fn test_fifo_drain() {
        let mut queue = BacklogQueue::new(10);
        queue.enqueue(event(SecurityLevel::Info, "a"));
        queue.enqueue(event(SecurityLevel::Warn, "b"));
        queue.enqueue(event(SecurityLevel::Critical, "c"));

        assert_eq!(queue.len(), 3);
        assert_eq!(actions(&mut queue), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut queue = BacklogQueue::new(5);
        for i in 0..50 {
            let level = if i % 3 == 0 { SecurityLevel::Critical } else { SecurityLevel::Info };
            queue.enqueue(event(level, &format!("e{}", i)));
            assert!(queue.len() <= 5);
        }
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_evicts_oldest_non_critical_first() {
        let mut queue = BacklogQueue::new(3);
        queue.enqueue(event(SecurityLevel::Critical, "crit-1"));
        queue.enqueue(event(SecurityLevel::Info, "info-1"));
        queue.enqueue(event(SecurityLevel::Warn, "warn-1"));

        let evicted = queue.enqueue(event(SecurityLevel::Info, "info-2")).unwrap();
        assert_eq!(evicted.event.action, "info-1");
        assert!(!evicted.is_critical());

        assert_eq!(actions(&mut queue), vec!["crit-1", "warn-1", "info-2"]);
    }

    #[test]
    fn test_critical_evicts_info_at_capacity_one() {
        let mut queue = BacklogQueue::new(1);
        queue.enqueue(event(SecurityLevel::Info, "info"));

        let evicted = queue.enqueue(event(SecurityLevel::Critical, "crit")).unwrap();
        assert_eq!(evicted.event.action, "info");
        assert_eq!(actions(&mut queue), vec!["crit"]);
    }

    #[test]
    fn test_all_critical_evicts_oldest_critical() {
        let mut queue = BacklogQueue::new(2);
        queue.enqueue(event(SecurityLevel::Critical, "crit-1"));
        queue.enqueue(event(SecurityLevel::Critical, "crit-2"));

        let evicted = queue.enqueue(event(SecurityLevel::Critical, "crit-3")).unwrap();
        assert!(evicted.is_critical());
        assert_eq!(evicted.event.action, "crit-1");
        assert_eq!(actions(&mut queue), vec!["crit-2", "crit-3"]);
    }

    #[test]
    fn test_requeue_front_keeps_older_events_first() {
        let mut queue = BacklogQueue::new(10);
        queue.enqueue(event(SecurityLevel::Info, "a1"));
        queue.enqueue(event(SecurityLevel::Info, "a2"));
        let drained = queue.dequeue_all();

        queue.enqueue(event(SecurityLevel::Info, "b1"));
        assert!(queue.requeue_front(drained).is_empty());

        assert_eq!(actions(&mut queue), vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_requeue_front_respects_capacity() {
        let mut queue = BacklogQueue::new(3);
        queue.enqueue(event(SecurityLevel::Critical, "a1"));
        queue.enqueue(event(SecurityLevel::Info, "a2"));
        let drained = queue.dequeue_all();

        queue.enqueue(event(SecurityLevel::Info, "b1"));
        queue.enqueue(event(SecurityLevel::Critical, "b2"));

        // a2 is the oldest non-critical event once the drained ones are back
        let evicted = queue.requeue_front(drained);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].event.action, "a2");
        assert_eq!(queue.len(), 3);
        assert_eq!(actions(&mut queue), vec!["a1", "b1", "b2"]);
    }

    #[test]
    fn test_no_eviction_below_capacity() {
        let mut queue = BacklogQueue::new(2);
        assert!(queue.enqueue(event(SecurityLevel::Info, "a")).is_none());
        assert!(queue.enqueue(event(SecurityLevel::Info, "b")).is_none());
        assert!(queue.enqueue(event(SecurityLevel::Info, "c")).is_some());
    }
}
