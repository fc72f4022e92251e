//! Producer/consumer turn coordination
//!
//! Each iteration runs the producer turn in the calling process, hands the
//! turn to a spawned consumer which attaches the segment on its own, and
//! joins it before reporting. Turn order is the only synchronization the
//! shared queue gets.

use crate::config::SegmentConfig;
use crate::error::{Result, SlotqError};
use crate::queue::{SharedQueue, Snapshot};
use crate::segment::{Attachment, SharedSegment};
use crate::spawn::{ConsumerId, Spawner, TurnOutcome, CONSUMER_EXIT_OK};
use log::{debug, error, info, warn};

/// Exit code of a consumer that could not attach the segment
pub const CONSUMER_EXIT_ATTACH_FAILED: i32 = 1;

/// Which side of the queue is acting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// Where in the iteration a status snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPoint {
    Initialized,
    Resumed,
    AfterProducer,
    AfterConsumer,
}

/// What the collaborator is asked to count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountRequest {
    /// Items to add, with the free space left
    Produce { free: usize },
    /// Items to remove, with the number available
    Consume { available: usize },
}

impl CountRequest {
    pub fn role(&self) -> Role {
        match self {
            CountRequest::Produce { .. } => Role::Producer,
            CountRequest::Consume { .. } => Role::Consumer,
        }
    }
}

/// Progress reported to the collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Status { point: StatusPoint, snapshot: Snapshot },
    IterationStarted(usize),
    TurnStarted(Role),
    QueueFull,
    QueueEmpty,
    InvalidInput { role: Role, reason: String },
    NothingRequested(Role),
    Truncated { role: Role, requested: usize, accepted: usize },
    Appended { stored: usize },
    Removed { removed: usize },
    ConsumerJoined { parent: u32, consumer: ConsumerId, outcome: TurnOutcome },
    ShuttingDown,
    CleanupDone { clean: bool },
}

/// Source of counts and values, and sink of progress
///
/// Implemented by the command line front end; the coordinator never touches
/// the terminal itself.
pub trait Collaborator {
    /// A non-negative count, or `InvalidInput`
    fn read_count(&mut self, request: CountRequest) -> Result<u32>;

    /// Exactly `count` values, or `InvalidInput`
    fn read_values(&mut self, count: usize) -> Result<Vec<i32>>;

    /// Whether to run another iteration
    fn read_continue(&mut self) -> bool;

    fn report(&mut self, event: TurnEvent);
}

/// Read a count, turning `InvalidInput` into a skipped turn
fn read_count_or_skip<C: Collaborator>(
    collab: &mut C,
    request: CountRequest,
) -> Result<Option<usize>> {
    let role = request.role();
    match collab.read_count(request) {
        Ok(0) => {
            collab.report(TurnEvent::NothingRequested(role));
            Ok(None)
        }
        Ok(n) => Ok(Some(n as usize)),
        Err(SlotqError::InvalidInput(reason)) => {
            collab.report(TurnEvent::InvalidInput { role, reason });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Refuse a queue whose count was pushed out of range since attach
fn ensure_consistent(queue: &SharedQueue) -> Result<()> {
    if queue.is_consistent() {
        return Ok(());
    }
    Err(SlotqError::CorruptQueue {
        count: queue.raw_count(),
        capacity: queue.capacity(),
    })
}

/// Producer turn: append a batch read from the collaborator
pub fn produce<C: Collaborator>(queue: &mut SharedQueue, collab: &mut C) -> Result<usize> {
    ensure_consistent(queue)?;
    collab.report(TurnEvent::TurnStarted(Role::Producer));
    if queue.is_full() {
        collab.report(TurnEvent::QueueFull);
        return Ok(0);
    }

    let free = queue.free_space();
    let requested = match read_count_or_skip(collab, CountRequest::Produce { free })? {
        Some(n) => n,
        None => return Ok(0),
    };

    let accepted = requested.min(free);
    if accepted < requested {
        collab.report(TurnEvent::Truncated {
            role: Role::Producer,
            requested,
            accepted,
        });
    }

    let values = match collab.read_values(accepted) {
        Ok(values) => values,
        Err(SlotqError::InvalidInput(reason)) => {
            collab.report(TurnEvent::InvalidInput {
                role: Role::Producer,
                reason,
            });
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    let stored = queue.append(&values);
    debug!("Producer stored {} of {} values", stored, values.len());
    collab.report(TurnEvent::Appended { stored });
    Ok(stored)
}

/// Consumer turn: remove a batch sized by the collaborator
pub fn consume<C: Collaborator>(queue: &mut SharedQueue, collab: &mut C) -> Result<usize> {
    ensure_consistent(queue)?;
    collab.report(TurnEvent::TurnStarted(Role::Consumer));
    if queue.is_empty() {
        collab.report(TurnEvent::QueueEmpty);
        return Ok(0);
    }

    let available = queue.len();
    let requested = match read_count_or_skip(collab, CountRequest::Consume { available })? {
        Some(n) => n,
        None => return Ok(0),
    };

    if requested > available {
        collab.report(TurnEvent::Truncated {
            role: Role::Consumer,
            requested,
            accepted: available,
        });
    }

    let removed = queue.remove(requested);
    debug!("Consumer removed {} of {} requested", removed, requested);
    collab.report(TurnEvent::Removed { removed });
    Ok(removed)
}

/// Entry point of the spawned consumer
///
/// Attaches the segment independently of the parent, runs one consumer
/// turn and detaches. Detach failures are logged only.
pub fn consumer_entry<C: Collaborator>(segment: &SharedSegment, collab: &mut C) -> i32 {
    let mut attachment = match segment.attach() {
        Ok(attachment) => attachment,
        Err(e) => {
            error!("Consumer could not attach segment {}: {}", segment.key(), e);
            return CONSUMER_EXIT_ATTACH_FAILED;
        }
    };

    if let Err(e) = consume(attachment.queue_mut(), collab) {
        warn!("Consumer turn aborted: {}", e);
    }

    if let Err(e) = attachment.detach() {
        warn!("{}", e);
    }
    CONSUMER_EXIT_OK
}

/// Drives alternating producer and consumer turns over one segment
pub struct TurnCoordinator<S: Spawner> {
    segment: SharedSegment,
    attachment: Attachment,
    spawner: S,
    iteration: usize,
}

impl<S: Spawner> TurnCoordinator<S> {
    /// Create or open the segment, attach it and initialize it if new
    pub fn start<C: Collaborator>(
        config: &SegmentConfig,
        spawner: S,
        collab: &mut C,
    ) -> Result<Self> {
        let opened = SharedSegment::create_or_open(config)?;
        let segment = opened.segment;

        let mut attachment = match segment.attach() {
            Ok(attachment) => attachment,
            Err(e) => {
                if opened.init.is_some() {
                    if let Err(destroy_err) = segment.destroy() {
                        warn!("{}", destroy_err);
                    }
                }
                return Err(e);
            }
        };

        let point = match opened.init {
            Some(token) => {
                attachment.initialize_once(token);
                StatusPoint::Initialized
            }
            None => {
                info!("Resuming queue left in segment {}", segment.key());
                StatusPoint::Resumed
            }
        };
        collab.report(TurnEvent::Status {
            point,
            snapshot: attachment.queue().snapshot(),
        });

        Ok(Self {
            segment,
            attachment,
            spawner,
            iteration: 0,
        })
    }

    /// Current queue state
    pub fn snapshot(&self) -> Snapshot {
        self.attachment.queue().snapshot()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Run one producer turn and one consumer turn
    ///
    /// Returns whether the collaborator asked to continue.
    pub fn run_iteration<C>(&mut self, collab: &mut C) -> Result<bool>
    where
        C: Collaborator + Send,
    {
        self.iteration += 1;
        collab.report(TurnEvent::IterationStarted(self.iteration));

        produce(self.attachment.queue_mut(), collab)?;
        collab.report(TurnEvent::Status {
            point: StatusPoint::AfterProducer,
            snapshot: self.snapshot(),
        });

        let segment = &self.segment;
        let joined = self
            .spawner
            .run_turn(|| consumer_entry(segment, &mut *collab))?;
        match joined.outcome {
            TurnOutcome::NormalExit(code) => {
                info!("Consumer {} exited with code {}", joined.consumer, code)
            }
            TurnOutcome::AbnormalTermination => {
                warn!("Consumer {} terminated abnormally", joined.consumer)
            }
        }
        collab.report(TurnEvent::ConsumerJoined {
            parent: std::process::id(),
            consumer: joined.consumer,
            outcome: joined.outcome,
        });

        collab.report(TurnEvent::Status {
            point: StatusPoint::AfterConsumer,
            snapshot: self.snapshot(),
        });
        Ok(collab.read_continue())
    }

    /// Iterate until the collaborator stops, then tear the segment down
    ///
    /// A fatal error still detaches and destroys the segment before it is
    /// returned.
    pub fn run<C>(mut self, collab: &mut C) -> Result<()>
    where
        C: Collaborator + Send,
    {
        loop {
            match self.run_iteration(collab) {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    error!("Iteration {} failed: {}", self.iteration, e);
                    self.shutdown(collab);
                    return Err(e);
                }
            }
        }

        self.shutdown(collab);
        Ok(())
    }

    /// Detach and destroy the segment
    ///
    /// Failures are logged and do not stop the remaining steps. Returns
    /// whether every step succeeded.
    pub fn shutdown<C: Collaborator>(self, collab: &mut C) -> bool {
        collab.report(TurnEvent::ShuttingDown);
        let mut clean = true;

        if let Err(e) = self.attachment.detach() {
            warn!("{}", e);
            clean = false;
        }
        if let Err(e) = self.segment.destroy() {
            warn!("{}", e);
            clean = false;
        }

        collab.report(TurnEvent::CleanupDone { clean });
        clean
    }
}
