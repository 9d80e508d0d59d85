use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a peer that served corrupt data is skipped
pub const BLACKLIST_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Peers that served data failing its integrity check, with expiry
#[derive(Debug)]
pub struct Blacklist {
    until: HashMap<String, Instant>,
    cooldown: Duration,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::with_cooldown(BLACKLIST_COOLDOWN)
    }
}

impl Blacklist {
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            until: HashMap::new(),
            cooldown,
        }
    }

    /// Blacklist `peer`, dropping any entries that have already expired
    pub fn insert(&mut self, peer: &str) {
        self.prune();
        tracing::warn!(
            "Blacklist: skipping {} for {:?} after an integrity failure",
            peer,
            self.cooldown
        );
        self.until
            .insert(peer.to_string(), Instant::now() + self.cooldown);
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.until
            .get(peer)
            .is_some_and(|until| Instant::now() < *until)
    }

    /// Drop entries whose cooldown has passed
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.until.retain(|_, until| now < *until);
    }

    pub fn len(&self) -> usize {
        self.until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.until.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_expiry() {
        let mut blacklist = Blacklist::with_cooldown(Duration::from_millis(30));
        blacklist.insert("10.0.0.1:4000");
        assert!(blacklist.contains("10.0.0.1:4000"));
        assert!(!blacklist.contains("10.0.0.2:4000"));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!blacklist.contains("10.0.0.1:4000"));
        assert_eq!(blacklist.len(), 1);
        blacklist.prune();
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_default_cooldown_is_an_hour() {
        let mut blacklist = Blacklist::default();
        blacklist.insert("peer:1");
        assert!(blacklist.contains("peer:1"));
        assert_eq!(blacklist.cooldown, Duration::from_secs(3600));
    }

    #[test]
    fn test_insert_drops_expired_entries() {
        let mut blacklist = Blacklist::with_cooldown(Duration::from_millis(30));
        blacklist.insert("10.0.0.1:4000");
        blacklist.insert("10.0.0.2:4000");
        std::thread::sleep(Duration::from_millis(60));

        blacklist.insert("10.0.0.3:4000");
        assert_eq!(blacklist.len(), 1);
        assert!(blacklist.contains("10.0.0.3:4000"));
    }
}
