use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::event::{EventPayload, TelemetryEvent};

/// Shared append-only event log for one run.
///
/// Cloning yields another handle onto the same log. Every agent holds one and
/// calls [`TimelineStore::append`]; the timestamp is taken inside the lock, so
/// `t` never decreases in append order. Nothing orders appends from different
/// agents beyond that.
#[derive(Debug, Clone)]
pub struct TimelineStore {
    origin: Instant,
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl TimelineStore {
    /// Starts a new log whose time origin is now.
    pub fn new() -> Self {
        Self::with_origin(Instant::now())
    }

    pub fn with_origin(origin: Instant) -> Self {
        Self {
            origin,
            events: Arc::new(Mutex::new(Vec::with_capacity(256))),
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Seconds since the origin, rounded to milliseconds.
    pub fn elapsed_secs(&self) -> f64 {
        round_to(self.origin.elapsed().as_secs_f64(), 3)
    }

    pub fn append(&self, payload: EventPayload) {
        let mut events = self.lock();
        let t = self.elapsed_secs();
        events.push(TelemetryEvent { t, payload });
    }

    /// Events in append order.
    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TelemetryEvent>> {
        // A panicking agent must not take the rest of the run down with it.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_append_order() {
        let timeline = TimelineStore::new();
        timeline.append(EventPayload::DnsQuery { domain: "a.example".into() });
        timeline.append(EventPayload::RegSet { detail: "HKCU\\Run=x".into() });

        let events = timeline.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, EventPayload::DnsQuery { domain: "a.example".into() });
        assert!(events[0].t <= events[1].t);
    }

    #[test]
    fn clones_share_one_log() {
        let timeline = TimelineStore::new();
        let handle = timeline.clone();
        handle.append(EventPayload::NetConnect { dst: "10.0.0.1:443".into() });
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn round_to_millis() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(0.0, 2), 0.0);
    }
}
