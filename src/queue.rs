//! Right-aligned bounded slot queue
//!
//! The queue lives verbatim inside the shared segment, so its layout is the
//! wire format every attaching process agrees on:
//!
//! ```text
//! offset 0            : slots[0..N]  (i32 each)
//! offset 4 * N        : count        (u32)
//! ```
//!
//! Occupied slots are always the last `count` positions. Appends grow the
//! occupied block to the left; removes drop elements from its right end and
//! shift the survivors back against the end of the array. Every slot outside
//! the occupied block holds the sentinel `0`.

use std::fmt;

/// Capacity of the queue hosted by a shared segment
pub const QUEUE_CAPACITY: usize = 10;

/// Value held by every unoccupied slot
pub const SENTINEL: i32 = 0;

/// Fixed-capacity queue with right-aligned packing
#[repr(C)]
#[derive(Clone, PartialEq, Eq)]
pub struct SlotQueue<const N: usize = QUEUE_CAPACITY> {
    slots: [i32; N],
    count: u32,
}

/// The queue as laid out in shared memory
pub type SharedQueue = SlotQueue<QUEUE_CAPACITY>;

const _: () = assert!(std::mem::size_of::<SharedQueue>() == 4 * QUEUE_CAPACITY + 4);
const _: () = assert!(std::mem::align_of::<SharedQueue>() == 4);

impl<const N: usize> SlotQueue<N> {
    /// Create an empty queue with every slot at the sentinel
    pub const fn new() -> Self {
        Self {
            slots: [SENTINEL; N],
            count: 0,
        }
    }

    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of occupied slots
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    #[inline(always)]
    pub fn free_space(&self) -> usize {
        N - self.len()
    }

    /// Raw count as stored, without trusting it
    #[inline(always)]
    pub fn raw_count(&self) -> u32 {
        self.count
    }

    /// Check the count is within `[0, N]`
    ///
    /// A segment written by another program (or left behind by a crashed
    /// one) may violate this; every other method assumes it holds.
    pub fn is_consistent(&self) -> bool {
        (self.count as usize) <= N
    }

    /// Overwrite the stored count, bypassing every invariant
    #[cfg(test)]
    pub(crate) fn corrupt_count(&mut self, count: u32) {
        self.count = count;
    }

    /// The occupied block, lowest index first
    #[inline]
    pub fn occupied(&self) -> &[i32] {
        &self.slots[N - self.len()..]
    }

    /// All slots including the sentinel prefix
    #[inline]
    pub fn slots(&self) -> &[i32; N] {
        &self.slots
    }

    /// Reset to the empty state
    pub fn clear(&mut self) {
        self.slots.fill(SENTINEL);
        self.count = 0;
    }

    /// Append a batch to the left of the occupied block
    ///
    /// Values are consumed in order, each one taking the free slot directly
    /// left of the block, so the last stored value ends up at the lowest
    /// occupied index. Values that do not fit are dropped.
    ///
    /// Returns how many values were stored.
    pub fn append(&mut self, values: &[i32]) -> usize {
        let stored = values.len().min(self.free_space());
        let mut count = self.len();

        for &value in &values[..stored] {
            self.slots[N - 1 - count] = value;
            count += 1;
        }

        self.count = count as u32;
        stored
    }

    /// Remove up to `n` values from the right end of the occupied block
    ///
    /// The first `count - k` elements of the block survive in their
    /// relative order and are shifted right-aligned; every other slot is
    /// reset to the sentinel.
    ///
    /// Returns how many values were removed.
    pub fn remove(&mut self, n: usize) -> usize {
        let count = self.len();
        let removed = n.min(count);
        if removed == 0 {
            return 0;
        }

        let kept = count - removed;
        let start = N - count;

        self.slots.copy_within(start..start + kept, N - kept);
        self.slots[..N - kept].fill(SENTINEL);
        self.count = kept as u32;

        removed
    }

    /// Copy the current state for reporting
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            slots: self.slots.to_vec(),
            count: self.len(),
        }
    }
}

impl<const N: usize> Default for SlotQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for SlotQueue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotQueue")
            .field("slots", &self.slots)
            .field("count", &self.count)
            .finish()
    }
}

/// Point-in-time copy of a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub slots: Vec<i32>,
    pub count: usize,
}

impl Snapshot {
    pub fn occupied(&self) -> &[i32] {
        &self.slots[self.slots.len() - self.count..]
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue: [")?;
        for (i, value) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "] (Count: {})", self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_is_zeroed() {
        let q = SharedQueue::new();
        assert_eq!(q.len(), 0);
        assert_eq!(q.capacity(), 10);
        assert!(q.slots().iter().all(|&v| v == SENTINEL));
        assert!(q.occupied().is_empty());
    }

    #[test]
    fn test_append_right_aligned() {
        let mut q = SharedQueue::new();
        assert_eq!(q.append(&[5, 6, 7]), 3);
        assert_eq!(q.len(), 3);
        assert_eq!(q.slots(), &[0, 0, 0, 0, 0, 0, 0, 7, 6, 5]);
        assert_eq!(q.occupied(), &[7, 6, 5]);
    }

    #[test]
    fn test_second_batch_goes_left() {
        let mut q = SharedQueue::new();
        q.append(&[1, 2]);
        q.append(&[3]);
        assert_eq!(q.occupied(), &[3, 2, 1]);
    }

    #[test]
    fn test_remove_keeps_left_of_block() {
        let mut q = SharedQueue::new();
        q.append(&[5, 6, 7]);

        assert_eq!(q.remove(2), 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.slots(), &[0, 0, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_remove_shifts_survivors() {
        let mut q = SharedQueue::new();
        q.append(&[10, 20, 30, 40, 50]);
        // block is [50, 40, 30, 20, 10]
        assert_eq!(q.remove(3), 3);
        assert_eq!(q.slots(), &[0, 0, 0, 0, 0, 0, 0, 0, 50, 40]);
    }

    #[test]
    fn test_append_truncates() {
        let mut q = SharedQueue::new();
        q.append(&[1; 8]);
        assert_eq!(q.append(&[2, 3, 4, 5]), 2);
        assert!(q.is_full());
        assert_eq!(&q.slots()[..2], &[3, 2]);
    }

    #[test]
    fn test_append_when_full() {
        let mut q = SharedQueue::new();
        q.append(&[9; 10]);
        let before = q.clone();

        assert_eq!(q.append(&[1, 2, 3]), 0);
        assert_eq!(q, before);
    }

    #[test]
    fn test_remove_saturates() {
        let mut q = SharedQueue::new();
        q.append(&[1, 2]);
        assert_eq!(q.remove(99), 2);
        assert!(q.is_empty());
        assert_eq!(q, SharedQueue::new());
    }

    #[test]
    fn test_remove_from_empty() {
        let mut q = SharedQueue::new();
        assert_eq!(q.remove(3), 0);
        assert_eq!(q, SharedQueue::new());
    }

    #[test]
    fn test_noops() {
        let mut q = SharedQueue::new();
        q.append(&[4, -4, 8]);
        let before = q.clone();

        assert_eq!(q.remove(0), 0);
        assert_eq!(q.append(&[]), 0);
        assert_eq!(q, before);
    }

    #[test]
    fn test_clear() {
        let mut q = SharedQueue::new();
        q.append(&[1, 2, 3]);
        q.clear();
        assert_eq!(q, SharedQueue::new());
    }

    #[test]
    fn test_consistency() {
        let mut q = SharedQueue::new();
        assert!(q.is_consistent());
        q.count = 11;
        assert!(!q.is_consistent());
        assert_eq!(q.raw_count(), 11);
    }

    #[test]
    fn test_small_capacity() {
        let mut q = SlotQueue::<3>::new();
        assert_eq!(q.append(&[1, 2, 3, 4]), 3);
        assert_eq!(q.slots(), &[3, 2, 1]);
        assert_eq!(q.remove(1), 1);
        assert_eq!(q.slots(), &[0, 3, 2]);
    }

    #[test]
    fn test_snapshot_display() {
        let mut q = SharedQueue::new();
        q.append(&[5, 6]);
        let snap = q.snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.occupied(), &[6, 5]);
        assert_eq!(
            snap.to_string(),
            "Queue: [0, 0, 0, 0, 0, 0, 0, 0, 6, 5] (Count: 2)"
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append(Vec<i32>),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<i32>(), 0..14).prop_map(Op::Append),
            (0usize..14).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn ops_keep_layout_invariants(ops in proptest::collection::vec(op(), 0..40)) {
            let mut q = SharedQueue::new();
            // Model: the occupied block, lowest index first.
            let mut model: Vec<i32> = Vec::new();

            for op in ops {
                match op {
                    Op::Append(values) => {
                        let free = QUEUE_CAPACITY - model.len();
                        let stored = q.append(&values);
                        prop_assert_eq!(stored, values.len().min(free));
                        for &v in &values[..stored] {
                            model.insert(0, v);
                        }
                    }
                    Op::Remove(n) => {
                        let before = model.len();
                        let removed = q.remove(n);
                        prop_assert_eq!(removed, n.min(before));
                        model.truncate(before - removed);
                    }
                }

                prop_assert!(q.len() <= QUEUE_CAPACITY);
                prop_assert_eq!(q.occupied(), model.as_slice());
                let prefix = &q.slots()[..QUEUE_CAPACITY - q.len()];
                prop_assert!(prefix.iter().all(|&v| v == SENTINEL));
            }
        }

        #[test]
        fn append_then_remove_all_restores_empty(
            values in proptest::collection::vec(any::<i32>(), 0..=QUEUE_CAPACITY)
        ) {
            let mut q = SharedQueue::new();
            let stored = q.append(&values);
            prop_assert_eq!(q.remove(stored), stored);
            prop_assert_eq!(q, SharedQueue::new());
        }
    }
}
