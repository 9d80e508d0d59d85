use std::collections::HashMap;

use serde::Serialize;

use crate::crypto::PublicKey;

use super::ManifestError;

/// How far a subscriber has processed a channel
///
/// Advances `Unknown -> Known -> Verified -> Materialized`, and only ever to a
/// strictly higher sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "sequence", rename_all = "snake_case")]
pub enum SubscriptionState {
    #[default]
    Unknown,
    /// A manifest with this sequence has been fetched
    Known(u64),
    /// Its signature checked out
    Verified(u64),
    /// Its files have been recorded locally
    Materialized(u64),
}

impl SubscriptionState {
    pub fn sequence(&self) -> Option<u64> {
        match self {
            SubscriptionState::Unknown => None,
            SubscriptionState::Known(seq)
            | SubscriptionState::Verified(seq)
            | SubscriptionState::Materialized(seq) => Some(*seq),
        }
    }

    /// Whether a manifest at `sequence` is newer than anything seen so far
    pub fn accepts(&self, sequence: u64) -> bool {
        self.sequence().map_or(true, |current| sequence > current)
    }
}

/// Per-channel subscription state for one node
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    states: HashMap<PublicKey, SubscriptionState>,
    /// last fully processed state, restored when a newer manifest fails
    committed: HashMap<PublicKey, SubscriptionState>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, public_key: PublicKey) {
        self.states.entry(public_key).or_default();
    }

    pub fn unsubscribe(&mut self, public_key: &PublicKey) {
        self.states.remove(public_key);
        self.committed.remove(public_key);
    }

    pub fn is_subscribed(&self, public_key: &PublicKey) -> bool {
        self.states.contains_key(public_key)
    }

    pub fn state(&self, public_key: &PublicKey) -> SubscriptionState {
        self.states.get(public_key).copied().unwrap_or_default()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = (&PublicKey, &SubscriptionState)> {
        self.states.iter()
    }

    /// Highest sequence seen per subscribed channel, as gossiped in HELLO
    pub fn sequences(&self) -> HashMap<PublicKey, u64> {
        self.states
            .iter()
            .filter_map(|(pk, state)| state.sequence().map(|seq| (*pk, seq)))
            .collect()
    }

    /// Record that a manifest at `sequence` was fetched
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Stale`] if `sequence` is not newer than the
    /// current state; the caller must drop the manifest unprocessed.
    pub fn observe(&mut self, public_key: PublicKey, sequence: u64) -> Result<(), ManifestError> {
        let state = self.states.entry(public_key).or_default();
        if !state.accepts(sequence) {
            return Err(ManifestError::Stale {
                current: state.sequence().unwrap_or_default(),
                offered: sequence,
            });
        }
        *state = SubscriptionState::Known(sequence);
        Ok(())
    }

    pub fn verified(&mut self, public_key: &PublicKey, sequence: u64) {
        self.advance(public_key, sequence, SubscriptionState::Verified(sequence));
    }

    pub fn materialized(&mut self, public_key: &PublicKey, sequence: u64) {
        if self.advance(public_key, sequence, SubscriptionState::Materialized(sequence)) {
            self.committed
                .insert(*public_key, SubscriptionState::Materialized(sequence));
        }
    }

    /// Abandon an in-progress sequence, restoring the last committed state
    pub fn abort(&mut self, public_key: &PublicKey, sequence: u64) {
        let restored = self.committed.get(public_key).copied().unwrap_or_default();
        if let Some(state) = self.states.get_mut(public_key) {
            if state.sequence() == Some(sequence) {
                tracing::debug!(
                    "SubscriptionTracker: abandoning sequence {} for {}, back to {:?}",
                    sequence,
                    public_key,
                    restored
                );
                *state = restored;
            }
        }
    }

    fn advance(&mut self, public_key: &PublicKey, sequence: u64, next: SubscriptionState) -> bool {
        match self.states.get_mut(public_key) {
            Some(state) if state.sequence() == Some(sequence) => {
                *state = next;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    #[test]
    fn test_full_progression() {
        let pk = SecretKey::generate().public();
        let mut tracker = SubscriptionTracker::new();
        tracker.subscribe(pk);
        assert_eq!(tracker.state(&pk), SubscriptionState::Unknown);

        tracker.observe(pk, 10).unwrap();
        assert_eq!(tracker.state(&pk), SubscriptionState::Known(10));
        tracker.verified(&pk, 10);
        assert_eq!(tracker.state(&pk), SubscriptionState::Verified(10));
        tracker.materialized(&pk, 10);
        assert_eq!(tracker.state(&pk), SubscriptionState::Materialized(10));
        assert_eq!(tracker.sequences().get(&pk), Some(&10));
    }

    #[test]
    fn test_rejects_equal_and_lower_sequences() {
        let pk = SecretKey::generate().public();
        let mut tracker = SubscriptionTracker::new();
        tracker.observe(pk, 10).unwrap();
        tracker.verified(&pk, 10);
        tracker.materialized(&pk, 10);

        for stale in [0, 9, 10] {
            assert!(matches!(
                tracker.observe(pk, stale),
                Err(ManifestError::Stale {
                    current: 10,
                    offered
                }) if offered == stale
            ));
        }
        assert_eq!(tracker.state(&pk), SubscriptionState::Materialized(10));
        tracker.observe(pk, 11).unwrap();
    }

    #[test]
    fn test_abort_restores_committed_state() {
        let pk = SecretKey::generate().public();
        let mut tracker = SubscriptionTracker::new();
        tracker.observe(pk, 5).unwrap();
        tracker.verified(&pk, 5);
        tracker.materialized(&pk, 5);

        tracker.observe(pk, 6).unwrap();
        tracker.abort(&pk, 6);
        assert_eq!(tracker.state(&pk), SubscriptionState::Materialized(5));
    }

    #[test]
    fn test_stale_stage_updates_are_ignored() {
        let pk = SecretKey::generate().public();
        let mut tracker = SubscriptionTracker::new();
        tracker.observe(pk, 5).unwrap();
        tracker.observe(pk, 6).unwrap();
        tracker.verified(&pk, 5);
        assert_eq!(tracker.state(&pk), SubscriptionState::Known(6));
    }
}
