//! Cancellable countdowns driven by elapsed time
//!
//! A countdown is started with a duration and advanced by `tick()`. Each
//! tick reports the remaining time of every active countdown and reports
//! completion exactly once. Cancelled countdowns produce no further events.

use std::collections::BTreeMap;
use std::time::Duration;

/// Handle to a running countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CountdownId(u64);

/// Event produced by `Countdowns::tick`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent<K> {
    /// Countdown still running
    Tick {
        id: CountdownId,
        kind: K,
        remaining: Duration,
    },
    /// Countdown reached zero and was removed
    Complete { id: CountdownId, kind: K },
}

#[derive(Debug)]
struct Entry<K> {
    kind: K,
    remaining: Duration,
}

/// Set of independent countdowns tagged with a kind
#[derive(Debug)]
pub struct Countdowns<K> {
    next_id: u64,
    active: BTreeMap<CountdownId, Entry<K>>,
}

impl<K> Default for Countdowns<K> {
    fn default() -> Self {
        Self {
            next_id: 0,
            active: BTreeMap::new(),
        }
    }
}

impl<K: Clone> Countdowns<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown; a zero duration completes on the next tick
    pub fn start(&mut self, kind: K, duration: Duration) -> CountdownId {
        let id = CountdownId(self.next_id);
        self.next_id += 1;
        self.active.insert(
            id,
            Entry {
                kind,
                remaining: duration,
            },
        );
        id
    }

    /// Cancel a countdown. Returns false if it already completed or was cancelled.
    pub fn cancel(&mut self, id: CountdownId) -> bool {
        self.active.remove(&id).is_some()
    }

    pub fn remaining(&self, id: CountdownId) -> Option<Duration> {
        self.active.get(&id).map(|e| e.remaining)
    }

    pub fn is_active(&self, id: CountdownId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Advance every active countdown by `elapsed`
    pub fn tick(&mut self, elapsed: Duration) -> Vec<CountdownEvent<K>> {
        let mut events = Vec::with_capacity(self.active.len());
        let mut completed = Vec::new();

        for (id, entry) in self.active.iter_mut() {
            entry.remaining = entry.remaining.saturating_sub(elapsed);
            if entry.remaining.is_zero() {
                completed.push(*id);
                events.push(CountdownEvent::Complete {
                    id: *id,
                    kind: entry.kind.clone(),
                });
            } else {
                events.push(CountdownEvent::Tick {
                    id: *id,
                    kind: entry.kind.clone(),
                    remaining: entry.remaining,
                });
            }
        }

        for id in completed {
            self.active.remove(&id);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Ready,
        Grace,
    }

    #[test]
    fn test_ticks_then_completes_once() {
        let mut countdowns = Countdowns::new();
        let id = countdowns.start(Kind::Ready, Duration::from_secs(3));

        let events = countdowns.tick(Duration::from_secs(1));
        assert_eq!(
            events,
            vec![CountdownEvent::Tick {
                id,
                kind: Kind::Ready,
                remaining: Duration::from_secs(2)
            }]
        );

        countdowns.tick(Duration::from_secs(1));
        let events = countdowns.tick(Duration::from_secs(5));
        assert_eq!(events, vec![CountdownEvent::Complete { id, kind: Kind::Ready }]);
        assert!(!countdowns.is_active(id));
        assert!(countdowns.tick(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_cancel_suppresses_completion() {
        let mut countdowns = Countdowns::new();
        let id = countdowns.start(Kind::Grace, Duration::from_millis(200));
        countdowns.tick(Duration::from_millis(100));
        assert!(countdowns.cancel(id));
        assert!(!countdowns.cancel(id));
        assert!(countdowns.tick(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_independent_countdowns() {
        let mut countdowns = Countdowns::new();
        let short = countdowns.start(Kind::Ready, Duration::from_millis(100));
        let long = countdowns.start(Kind::Grace, Duration::from_millis(300));

        let events = countdowns.tick(Duration::from_millis(100));
        assert!(events.contains(&CountdownEvent::Complete {
            id: short,
            kind: Kind::Ready
        }));
        assert_eq!(countdowns.remaining(long), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_zero_duration_completes_on_first_tick() {
        let mut countdowns = Countdowns::new();
        let id = countdowns.start(Kind::Ready, Duration::ZERO);
        assert_eq!(
            countdowns.tick(Duration::ZERO),
            vec![CountdownEvent::Complete { id, kind: Kind::Ready }]
        );
    }
}
