//! C Bindings for slotq
//!
//! Lets programs in other languages attach the same segment and take their
//! turn on the queue. Callers must follow the same turn discipline as the
//! Rust API: one process operates on the queue at a time.

use crate::config::{SegmentConfig, SegmentKey};
use crate::queue::QUEUE_CAPACITY;
use crate::segment::{Attachment, SharedSegment};
use log::warn;
use std::ptr;
use std::slice;

// Opaque handle
pub struct SlotqHandle {
    segment: SharedSegment,
    attachment: Attachment,
}

/// Capacity of the shared queue
#[no_mangle]
pub extern "C" fn slotq_capacity() -> usize {
    QUEUE_CAPACITY
}

/// Create or open the segment for `key` and attach it
///
/// A newly created segment is zeroed; an existing one is left untouched.
/// Returns null on failure.
#[no_mangle]
pub extern "C" fn slotq_open(key: u32, mode: u32) -> *mut SlotqHandle {
    let config = SegmentConfig {
        key: SegmentKey(key),
        mode,
    };

    let opened = match SharedSegment::create_or_open(&config) {
        Ok(opened) => opened,
        Err(e) => {
            warn!("slotq_open: {}", e);
            return ptr::null_mut();
        }
    };

    let mut attachment = match opened.segment.attach() {
        Ok(attachment) => attachment,
        Err(e) => {
            warn!("slotq_open: {}", e);
            return ptr::null_mut();
        }
    };
    if let Some(token) = opened.init {
        attachment.initialize_once(token);
    }

    Box::into_raw(Box::new(SlotqHandle {
        segment: opened.segment,
        attachment,
    }))
}

/// Append `len` values; returns how many were stored
///
/// # Safety
/// `handle` must come from `slotq_open`; `values` must point to `len` ints
#[no_mangle]
pub unsafe extern "C" fn slotq_append(
    handle: *mut SlotqHandle,
    values: *const i32,
    len: usize,
) -> usize {
    if handle.is_null() || (values.is_null() && len > 0) {
        return 0;
    }
    let values = if len == 0 { &[][..] } else { slice::from_raw_parts(values, len) };
    (*handle).attachment.queue_mut().append(values)
}

/// Remove up to `n` values; returns how many were removed
///
/// # Safety
/// `handle` must come from `slotq_open`
#[no_mangle]
pub unsafe extern "C" fn slotq_remove(handle: *mut SlotqHandle, n: usize) -> usize {
    if handle.is_null() {
        return 0;
    }
    (*handle).attachment.queue_mut().remove(n)
}

/// Number of occupied slots
///
/// # Safety
/// `handle` must come from `slotq_open`
#[no_mangle]
pub unsafe extern "C" fn slotq_count(handle: *const SlotqHandle) -> usize {
    if handle.is_null() {
        return 0;
    }
    (*handle).attachment.queue().len()
}

/// Copy up to `max_len` slots (sentinels included) into `out`
///
/// Returns the queue's count.
///
/// # Safety
/// `handle` must come from `slotq_open`; `out` must hold `max_len` ints
#[no_mangle]
pub unsafe extern "C" fn slotq_snapshot(
    handle: *const SlotqHandle,
    out: *mut i32,
    max_len: usize,
) -> usize {
    if handle.is_null() {
        return 0;
    }
    let queue = (*handle).attachment.queue();
    if !out.is_null() {
        let n = max_len.min(QUEUE_CAPACITY);
        let out = slice::from_raw_parts_mut(out, n);
        out.copy_from_slice(&queue.slots()[..n]);
    }
    queue.len()
}

/// Detach and free the handle, leaving the segment in place
///
/// # Safety
/// `handle` must come from `slotq_open` and is invalid afterwards
#[no_mangle]
pub unsafe extern "C" fn slotq_close(handle: *mut SlotqHandle) -> i32 {
    if handle.is_null() {
        return -1;
    }
    let SlotqHandle { segment, attachment } = *Box::from_raw(handle);
    drop(segment);
    match attachment.detach() {
        Ok(()) => 0,
        Err(e) => {
            warn!("slotq_close: {}", e);
            -1
        }
    }
}

/// Detach, destroy the segment and free the handle
///
/// Both steps run even if the first fails. Returns 0 when both succeed.
///
/// # Safety
/// `handle` must come from `slotq_open` and is invalid afterwards
#[no_mangle]
pub unsafe extern "C" fn slotq_destroy(handle: *mut SlotqHandle) -> i32 {
    if handle.is_null() {
        return -1;
    }
    let SlotqHandle { segment, attachment } = *Box::from_raw(handle);

    let mut rc = 0;
    if let Err(e) = attachment.detach() {
        warn!("slotq_destroy: {}", e);
        rc = -1;
    }
    if let Err(e) = segment.destroy() {
        warn!("slotq_destroy: {}", e);
        rc = -1;
    }
    rc
}
