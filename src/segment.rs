//! POSIX shared memory segment hosting one queue
//!
//! Lifecycle: one process creates the segment (and alone receives the
//! [`InitToken`] that zeroes it), any number of processes attach and detach,
//! and the final owner destroys it.

use crate::config::{SegmentConfig, SegmentKey};
use crate::error::{Result, SlotqError};
use crate::queue::{SharedQueue, QUEUE_CAPACITY};
use log::{debug, info};
use rustix::fd::OwnedFd;
use rustix::fs::{fstat, ftruncate};
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::io;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// Bytes occupied by the queue at offset 0 of the segment
pub const SEGMENT_SIZE: usize = std::mem::size_of::<SharedQueue>();

/// Permission to zero a segment, handed out only to its creator
///
/// Consumed by [`Attachment::initialize_once`], so a segment is initialized
/// at most once per creation and never by processes that merely open it.
#[derive(Debug)]
pub struct InitToken {
    key: SegmentKey,
}

/// Result of [`SharedSegment::create_or_open`]
pub struct Opened {
    pub segment: SharedSegment,
    /// Present only when this call created the segment
    pub init: Option<InitToken>,
}

impl Opened {
    #[inline]
    pub fn created(&self) -> bool {
        self.init.is_some()
    }
}

/// Handle to a shared segment
pub struct SharedSegment {
    fd: OwnedFd,
    key: SegmentKey,
    name: CString,
}

// SAFETY: the handle only holds a descriptor and an immutable name
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

fn shm_c_name(key: SegmentKey) -> Result<CString> {
    CString::new(key.shm_name()).map_err(|e| SlotqError::SegmentUnavailable {
        key,
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })
}

impl SharedSegment {
    /// Create the segment for `config.key`, or open it if it already exists
    pub fn create_or_open(config: &SegmentConfig) -> Result<Opened> {
        let key = config.key;
        let name = shm_c_name(key)?;
        let unavailable = |e: Errno| SlotqError::SegmentUnavailable {
            key,
            source: e.into(),
        };

        match shm_open(
            name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::from_bits_truncate(config.mode as _),
        ) {
            Ok(fd) => {
                if let Err(e) = ftruncate(&fd, SEGMENT_SIZE as u64) {
                    let _ = shm_unlink(name.as_c_str());
                    return Err(unavailable(e));
                }
                info!("Created shared segment {} ({} bytes)", key, SEGMENT_SIZE);
                Ok(Opened {
                    segment: Self { fd, key, name },
                    init: Some(InitToken { key }),
                })
            }
            Err(Errno::EXIST) => {
                let fd = shm_open(name.as_c_str(), ShmOFlags::RDWR, Mode::empty())
                    .map_err(unavailable)?;
                let stat = fstat(&fd).map_err(unavailable)?;
                let got = stat.st_size as usize;
                if got < SEGMENT_SIZE {
                    return Err(SlotqError::LayoutMismatch {
                        expected: SEGMENT_SIZE,
                        got,
                    });
                }
                info!("Opened existing shared segment {}", key);
                Ok(Opened {
                    segment: Self { fd, key, name },
                    init: None,
                })
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    /// Map the queue into this process
    pub fn attach(&self) -> Result<Attachment> {
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                SEGMENT_SIZE,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &self.fd,
                0,
            )
            .map_err(|e| SlotqError::AttachFailed(e.into()))?
        };

        let addr = NonNull::new(addr.cast::<SharedQueue>()).ok_or_else(|| {
            SlotqError::AttachFailed(io::Error::new(io::ErrorKind::Other, "mmap returned null"))
        })?;
        let attachment = Attachment {
            addr,
            len: SEGMENT_SIZE,
            key: self.key,
        };

        let count = attachment.queue().raw_count();
        if !attachment.queue().is_consistent() {
            // Attachment's Drop unmaps
            return Err(SlotqError::CorruptQueue {
                count,
                capacity: QUEUE_CAPACITY,
            });
        }

        debug!("Attached segment {} at {:p}", self.key, addr);
        Ok(attachment)
    }

    /// Release the segment permanently
    ///
    /// Existing mappings stay valid until they are detached.
    pub fn destroy(self) -> Result<()> {
        shm_unlink(self.name.as_c_str()).map_err(|e| SlotqError::DestroyFailed {
            key: self.key,
            source: e.into(),
        })?;
        info!("Destroyed shared segment {}", self.key);
        Ok(())
    }

    /// Unlink a segment left behind by an earlier run
    ///
    /// Returns `true` if a segment existed.
    pub fn remove_stale(config: &SegmentConfig) -> Result<bool> {
        let name = shm_c_name(config.key)?;
        match shm_unlink(name.as_c_str()) {
            Ok(()) => {
                info!("Removed stale shared segment {}", config.key);
                Ok(true)
            }
            Err(Errno::NOENT) => Ok(false),
            Err(e) => Err(SlotqError::DestroyFailed {
                key: config.key,
                source: e.into(),
            }),
        }
    }

    #[inline(always)]
    pub fn key(&self) -> SegmentKey {
        self.key
    }
}

/// The queue mapped into the calling process
///
/// Queue access is not synchronized. Processes sharing a segment must take
/// strict turns: only the process holding the turn may call
/// [`queue_mut`](Self::queue_mut).
pub struct Attachment {
    addr: NonNull<SharedQueue>,
    len: usize,
    key: SegmentKey,
}

// SAFETY: the mapping is process-wide; turn-taking serializes access
unsafe impl Send for Attachment {}

impl Attachment {
    /// Zero the queue of a freshly created segment
    pub fn initialize_once(&mut self, token: InitToken) {
        debug_assert_eq!(token.key, self.key, "init token belongs to another segment");
        debug!("Initializing queue in segment {}", token.key);
        self.queue_mut().clear();
    }

    /// Key of the segment this mapping came from
    #[inline(always)]
    pub fn key(&self) -> SegmentKey {
        self.key
    }

    #[inline(always)]
    pub fn queue(&self) -> &SharedQueue {
        unsafe { self.addr.as_ref() }
    }

    #[inline(always)]
    pub fn queue_mut(&mut self) -> &mut SharedQueue {
        unsafe { self.addr.as_mut() }
    }

    /// Unmap the queue from this process
    pub fn detach(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        unsafe { munmap(this.addr.as_ptr().cast(), this.len) }
            .map_err(|e| SlotqError::DetachFailed(e.into()))
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.len);
        }
    }
}
