//! Recently seen command ids

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

/// Remembers ids for `ttl` after first sight
#[derive(Debug)]
pub struct RecentIds {
    ttl: Duration,
    seen: HashMap<String, Instant>,
    order: VecDeque<(Instant, String)>,
}

impl RecentIds {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn expire(&mut self, now: Instant) {
        while let Some((at, _)) = self.order.front() {
            if now.duration_since(*at) < self.ttl {
                break;
            }
            if let Some((at, id)) = self.order.pop_front()
                && self.seen.get(&id) == Some(&at)
            {
                self.seen.remove(&id);
            }
        }
    }

    /// Record `id`; returns `false` if it was already seen inside the window
    pub fn insert(&mut self, id: &str, now: Instant) -> bool {
        self.expire(now);
        if self.seen.contains_key(id) {
            return false;
        }
        self.seen.insert(id.to_string(), now);
        self.order.push_back((now, id.to_string()));
        true
    }

    /// Forget `id` so a redelivery is accepted
    pub fn remove(&mut self, id: &str) {
        self.seen.remove(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_inside_window_is_rejected() {
        let mut ids = RecentIds::new(Duration::from_secs(300));
        let t0 = Instant::now();

        assert!(ids.insert("a", t0));
        assert!(!ids.insert("a", t0 + Duration::from_secs(10)));
        assert!(ids.insert("b", t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_expired_ids_are_forgotten() {
        let mut ids = RecentIds::new(Duration::from_secs(300));
        let t0 = Instant::now();

        ids.insert("a", t0);
        ids.insert("b", t0 + Duration::from_secs(200));

        assert!(ids.insert("a", t0 + Duration::from_secs(301)));
        // b is still inside its window
        assert!(!ids.insert("b", t0 + Duration::from_secs(301)));
        assert_eq!(ids.len(), 2);
    }
}
