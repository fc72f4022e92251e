//! slotq - Right-aligned bounded queue in shared memory
//!
//! A producer process and a consumer process take strict turns on one
//! fixed-capacity queue hosted by a POSIX shared memory segment.
//!
//! # Architecture
//!
//! - **Queue**: fixed slots plus a count; batches are packed against the end
//!   of the array and removed from the right end of the occupied block
//! - **Segment**: create-once, attach-many, destroy-once lifecycle
//! - **Coordinator**: producer turn, spawned consumer turn, join, report
//!
//! Turn order is the only synchronization; the queue itself has no locks.

pub mod error;
pub mod config;
pub mod queue;
pub mod segment;
pub mod spawn;
pub mod coordinator;
pub mod bindings;

pub use error::{SlotqError, Result};
pub use config::{SegmentConfig, SegmentKey};
pub use queue::{SlotQueue, SharedQueue, Snapshot, QUEUE_CAPACITY};
pub use segment::{Attachment, InitToken, Opened, SharedSegment};
pub use spawn::{ForkSpawner, Spawner, ThreadSpawner, TurnOutcome};
pub use coordinator::{Collaborator, TurnCoordinator, TurnEvent};
