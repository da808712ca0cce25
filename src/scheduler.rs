//! Deferred teardown of voice slots.
//!
//! A stopped voice keeps rendering its fade-out until its teardown frame is
//! reached. At most one teardown is pending per slot: scheduling again for
//! the same slot cancels the earlier entry.

use std::collections::HashMap;

/// Key of a voice slot inside the render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceKey(pub(crate) u64);

/// Cancellation handle for one scheduled teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownToken {
    key: VoiceKey,
    serial: u64,
}

impl TeardownToken {
    pub fn key(&self) -> VoiceKey {
        self.key
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    serial: u64,
    at_frame: u64,
}

#[derive(Debug, Default)]
pub struct TeardownQueue {
    pending: HashMap<VoiceKey, Pending>,
    next_serial: u64,
}

impl TeardownQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: VoiceKey, at_frame: u64) -> TeardownToken {
        self.next_serial += 1;
        let serial = self.next_serial;
        if let Some(old) = self.pending.insert(key, Pending { serial, at_frame }) {
            tracing::debug!(
                "teardown for slot {} moved from frame {} to {at_frame}",
                key.0,
                old.at_frame
            );
        }
        TeardownToken { key, serial }
    }

    /// Returns false if the token was already fired, cancelled or replaced.
    pub fn cancel(&mut self, token: TeardownToken) -> bool {
        match self.pending.get(&token.key) {
            Some(p) if p.serial == token.serial => {
                self.pending.remove(&token.key);
                true
            }
            _ => false,
        }
    }

    /// Forget whatever is pending for `key`.
    pub fn clear(&mut self, key: VoiceKey) {
        self.pending.remove(&key);
    }

    pub fn is_pending(&self, key: VoiceKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest frame at which something is due.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.values().map(|p| p.at_frame).min()
    }

    /// Remove and return every slot due at or before `frame`, in key order.
    pub fn take_due(&mut self, frame: u64) -> Vec<VoiceKey> {
        let mut due: Vec<VoiceKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.at_frame <= frame)
            .map(|(k, _)| *k)
            .collect();
        due.sort();
        for key in &due {
            self.pending.remove(key);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_replaces_the_old_timer() {
        let mut q = TeardownQueue::new();
        let first = q.schedule(VoiceKey(1), 100);
        let second = q.schedule(VoiceKey(1), 500);
        assert_eq!(q.len(), 1);
        assert!(!q.cancel(first));
        assert!(q.take_due(200).is_empty());
        assert!(q.cancel(second));
        assert!(q.is_empty());
    }

    #[test]
    fn due_entries_fire_once_in_order() {
        let mut q = TeardownQueue::new();
        q.schedule(VoiceKey(3), 50);
        q.schedule(VoiceKey(2), 10);
        q.schedule(VoiceKey(9), 80);
        assert_eq!(q.next_due(), Some(10));
        assert_eq!(q.take_due(60), vec![VoiceKey(2), VoiceKey(3)]);
        assert_eq!(q.take_due(60), vec![]);
        assert_eq!(q.next_due(), Some(80));
    }

    #[test]
    fn fired_token_cannot_be_cancelled() {
        let mut q = TeardownQueue::new();
        let token = q.schedule(VoiceKey(4), 0);
        assert_eq!(q.take_due(0), vec![VoiceKey(4)]);
        assert!(!q.cancel(token));
        assert_eq!(token.key(), VoiceKey(4));
    }
}
