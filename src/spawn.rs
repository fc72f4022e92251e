//! Spawning the consumer turn
//!
//! A [`Spawner`] runs one consumer entry point in a separate flow of control
//! and blocks until it has finished. Spawn and join are a single call, so a
//! caller cannot start its next producer turn while a consumer is alive.

use crate::error::{Result, SlotqError};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// Exit code of a consumer that completed its turn
pub const CONSUMER_EXIT_OK: i32 = 0;

/// How a consumer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Exited on its own with this code
    NormalExit(i32),
    /// Killed by a signal, or panicked
    AbnormalTermination,
}

/// Identity of a spawned consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerId {
    Process(i32),
    Thread(u64),
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerId::Process(pid) => write!(f, "PID: {}", pid),
            ConsumerId::Thread(id) => write!(f, "thread #{}", id),
        }
    }
}

/// A consumer that has been spawned and joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    pub consumer: ConsumerId,
    pub outcome: TurnOutcome,
}

/// Capability to run a consumer turn apart from the caller
pub trait Spawner {
    /// Run `entry` in a new flow of control and wait for it to end
    ///
    /// `entry` returns the consumer's exit code.
    fn run_turn<F>(&self, entry: F) -> Result<Joined>
    where
        F: FnOnce() -> i32 + Send;
}

/// Runs the consumer in a forked child process
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkSpawner;

impl ForkSpawner {
    fn wait(child: nix::unistd::Pid) -> Result<TurnOutcome> {
        loop {
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(TurnOutcome::NormalExit(code)),
                Ok(WaitStatus::Signaled(_, signal, core_dumped)) => {
                    warn!(
                        "Consumer {} killed by {:?} (core dumped: {})",
                        child, signal, core_dumped
                    );
                    return Ok(TurnOutcome::AbnormalTermination);
                }
                Ok(other) => debug!("Ignoring wait status {:?}", other),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SlotqError::JoinFailed(e.into())),
            }
        }
    }
}

impl Spawner for ForkSpawner {
    fn run_turn<F>(&self, entry: F) -> Result<Joined>
    where
        F: FnOnce() -> i32 + Send,
    {
        // Unflushed output would be written twice
        let _ = io::stdout().flush();

        // SAFETY: the child only runs `entry` and exits without returning
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = match panic::catch_unwind(AssertUnwindSafe(entry)) {
                    Ok(code) => code,
                    Err(_) => process::abort(),
                };
                let _ = io::stdout().flush();
                process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => {
                info!("Parent {} waiting for consumer {}", process::id(), child);
                let outcome = Self::wait(child)?;
                Ok(Joined {
                    consumer: ConsumerId::Process(child.as_raw()),
                    outcome,
                })
            }
            Err(e) => Err(SlotqError::SpawnFailed(e.into())),
        }
    }
}

/// Runs the consumer on a scoped thread of the calling process
///
/// Same happens-before guarantees as [`ForkSpawner`] without a second
/// process; a panic in the consumer is reported as abnormal termination.
#[derive(Debug, Default)]
pub struct ThreadSpawner {
    next_id: AtomicU64,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Spawner for ThreadSpawner {
    fn run_turn<F>(&self, entry: F) -> Result<Joined>
    where
        F: FnOnce() -> i32 + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name(format!("slotq-consumer-{}", id))
                .spawn_scoped(scope, entry)
                .map_err(SlotqError::SpawnFailed)?;

            info!("Waiting for consumer thread #{}", id);
            let outcome = match handle.join() {
                Ok(code) => TurnOutcome::NormalExit(code),
                Err(_) => {
                    warn!("Consumer thread #{} panicked", id);
                    TurnOutcome::AbnormalTermination
                }
            };

            Ok(Joined {
                consumer: ConsumerId::Thread(id),
                outcome,
            })
        })
    }
}
