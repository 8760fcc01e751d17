use std::collections::HashMap;
use std::thread;

use sunflower::telemetry::{EventKind, EventPayload, TimelineStore};

const AGENTS: usize = 8;
const APPENDS_PER_AGENT: usize = 500;

#[test]
fn concurrent_appends_are_all_kept() {
    let timeline = TimelineStore::new();

    let handles: Vec<_> = (0..AGENTS)
        .map(|agent| {
            let timeline = timeline.clone();
            thread::spawn(move || {
                for seq in 0..APPENDS_PER_AGENT {
                    timeline.append(EventPayload::NetConnect { dst: format!("{agent}:{seq}") });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = timeline.snapshot();
    assert_eq!(events.len(), AGENTS * APPENDS_PER_AGENT, "No append may be lost");

    // Each agent's own appends keep their order.
    let mut next_seq: HashMap<usize, usize> = HashMap::new();
    for event in &events {
        let EventPayload::NetConnect { dst } = &event.payload else {
            panic!("Unexpected payload {:?}", event.payload);
        };
        let (agent, seq) = dst.split_once(':').unwrap();
        let (agent, seq): (usize, usize) = (agent.parse().unwrap(), seq.parse().unwrap());
        let expected = next_seq.entry(agent).or_default();
        assert_eq!(seq, *expected, "Agent {} appended out of order", agent);
        *expected += 1;
    }
    assert!(next_seq.values().all(|&n| n == APPENDS_PER_AGENT));

    println!("Timeline kept {} concurrent appends", events.len());
}

#[test]
fn timestamps_never_decrease_in_append_order() {
    let timeline = TimelineStore::new();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let timeline = timeline.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    timeline.append(EventPayload::DnsQuery { domain: "example.com".into() });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = timeline.snapshot();
    for pair in events.windows(2) {
        assert!(pair[0].t <= pair[1].t, "t went backwards: {} then {}", pair[0].t, pair[1].t);
    }
    assert!(events.iter().all(|e| e.t >= 0.0 && e.kind() == EventKind::DnsQuery));
}

#[test]
fn snapshot_is_detached_from_later_appends() {
    let timeline = TimelineStore::new();
    timeline.append(EventPayload::FileCreate { path: "/sandbox/a.txt".into() });

    let frozen = timeline.snapshot();
    timeline.append(EventPayload::FileDelete { path: "/sandbox/a.txt".into() });

    assert_eq!(frozen.len(), 1);
    assert_eq!(timeline.len(), 2);
}
