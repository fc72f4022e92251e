//! Producer/consumer alternation across real processes

#![cfg(unix)]

use slotq::coordinator::{Collaborator, CountRequest, StatusPoint, TurnCoordinator, TurnEvent};
use slotq::spawn::{ConsumerId, ForkSpawner, Spawner, TurnOutcome};
use slotq::{Result, SegmentConfig, SharedSegment, SlotqError};
use std::collections::VecDeque;
use std::sync::Mutex;

// Forking while another test thread forks makes failures hard to read
static FORK_LOCK: Mutex<()> = Mutex::new(());

fn test_config(n: u32) -> SegmentConfig {
    SegmentConfig::with_key(0x7000_0000 | std::process::id().wrapping_mul(16).wrapping_add(n))
}

/// Answers from a script; the consumer's copy lives in the child
///
/// A forked consumer pops from its own copy, so the parent drops the
/// previous consumer answer itself when the next iteration starts.
#[derive(Default)]
struct Script {
    produce_counts: VecDeque<u32>,
    consume_counts: VecDeque<u32>,
    values: VecDeque<Vec<i32>>,
    answers: VecDeque<bool>,
    panic_on_consume: bool,
    events: Vec<TurnEvent>,
}

impl Collaborator for Script {
    fn read_count(&mut self, request: CountRequest) -> Result<u32> {
        let counts = match request {
            CountRequest::Produce { .. } => &mut self.produce_counts,
            CountRequest::Consume { .. } if self.panic_on_consume => {
                panic!("consumer collaborator failed")
            }
            CountRequest::Consume { .. } => &mut self.consume_counts,
        };
        counts
            .pop_front()
            .ok_or_else(|| SlotqError::InvalidInput("script exhausted".into()))
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<i32>> {
        let mut values = self.values.pop_front().unwrap_or_default();
        values.truncate(count);
        Ok(values)
    }

    fn read_continue(&mut self) -> bool {
        self.answers.pop_front().unwrap_or(false)
    }

    fn report(&mut self, event: TurnEvent) {
        if let TurnEvent::IterationStarted(n) = event {
            if n > 1 {
                self.consume_counts.pop_front();
            }
        }
        self.events.push(event);
    }
}

impl Script {
    fn after_consumer(&self) -> Vec<Vec<i32>> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::Status {
                    point: StatusPoint::AfterConsumer,
                    snapshot,
                } => Some(snapshot.slots.clone()),
                _ => None,
            })
            .collect()
    }

    fn outcomes(&self) -> Vec<TurnOutcome> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::ConsumerJoined { outcome, .. } => Some(*outcome),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn test_child_exit_code_is_reported() {
    let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let joined = ForkSpawner.run_turn(|| 7).unwrap();
    assert_eq!(joined.outcome, TurnOutcome::NormalExit(7));
    assert!(matches!(joined.consumer, ConsumerId::Process(pid) if pid > 0));
}

#[test]
fn test_child_sees_append_and_parent_sees_remove() {
    let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config(1);
    let _ = SharedSegment::remove_stale(&config);

    let opened = SharedSegment::create_or_open(&config).unwrap();
    let segment = opened.segment;
    let mut parent = segment.attach().unwrap();
    parent.initialize_once(opened.init.unwrap());

    // Append completes before the spawn
    assert_eq!(parent.queue_mut().append(&[5, 6, 7]), 3);

    let joined = ForkSpawner
        .run_turn(|| {
            let mut child = match segment.attach() {
                Ok(child) => child,
                Err(_) => return 100,
            };
            let seen = child.queue().len() as i32;
            child.queue_mut().remove(2);
            let _ = child.detach();
            seen
        })
        .unwrap();

    assert_eq!(joined.outcome, TurnOutcome::NormalExit(3));
    // Join returned only after the child finished its remove
    assert_eq!(parent.queue().slots(), &[0, 0, 0, 0, 0, 0, 0, 0, 0, 7]);
    assert_eq!(parent.queue().len(), 1);

    parent.detach().unwrap();
    segment.destroy().unwrap();
}

#[test]
fn test_forked_session() {
    let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config(2);
    let _ = SharedSegment::remove_stale(&config);

    let mut script = Script {
        produce_counts: VecDeque::from([3, 4]),
        consume_counts: VecDeque::from([2, 10]),
        values: VecDeque::from([vec![5, 6, 7], vec![1, 2, 3, 4]]),
        answers: VecDeque::from([true, false]),
        ..Script::default()
    };

    let coordinator = TurnCoordinator::start(&config, ForkSpawner, &mut script).unwrap();
    coordinator.run(&mut script).unwrap();

    assert_eq!(
        script.outcomes(),
        vec![TurnOutcome::NormalExit(0), TurnOutcome::NormalExit(0)]
    );

    let statuses = script.after_consumer();
    assert_eq!(statuses[0], vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 7]);
    assert_eq!(statuses[1], vec![0; 10]);

    assert!(!SharedSegment::remove_stale(&config).unwrap());
}

#[test]
fn test_panicking_consumer_is_abnormal() {
    let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config(3);
    let _ = SharedSegment::remove_stale(&config);

    let mut script = Script {
        produce_counts: VecDeque::from([2]),
        values: VecDeque::from([vec![8, 9]]),
        answers: VecDeque::from([false]),
        panic_on_consume: true,
        ..Script::default()
    };

    let coordinator = TurnCoordinator::start(&config, ForkSpawner, &mut script).unwrap();
    coordinator.run(&mut script).unwrap();

    assert_eq!(script.outcomes(), vec![TurnOutcome::AbnormalTermination]);
    // Nothing was removed, and the loop still shut down cleanly
    assert_eq!(script.after_consumer()[0], vec![0, 0, 0, 0, 0, 0, 0, 0, 9, 8]);
    assert_eq!(
        script.events.last(),
        Some(&TurnEvent::CleanupDone { clean: true })
    );
}
