//! Bounded lock-free sample ring
//!
//! Producers are signal handlers running on arbitrary threads, so `push` must
//! be async-signal-safe: no allocation, no lock, no syscall. Each slot carries
//! a sequence number (Vyukov bounded queue):
//!
//! ```text
//! slot.seq == pos              free, a producer at `pos` may claim it
//! slot.seq == pos + 1          published, the consumer at `pos` may take it
//! slot.seq == pos + capacity   consumed, free again for the next lap
//! ```
//!
//! A producer claims a slot by advancing `head` with a compare-and-swap,
//! stores the program counter, then publishes through `seq`. A handler that
//! interrupts another push on the same thread simply claims the next slot;
//! the consumer stops at the first unpublished slot and picks it up on its
//! next pass, so samples are never reordered or duplicated.

// Position arithmetic compares wrapping counters through signed differences
#![allow(clippy::cast_possible_wrap)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Result of handing one sample to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored, room remains.
    Stored,
    /// Stored, and the ring is now at capacity: the consumer should drain.
    Filled,
    /// Ring full, sample discarded and counted as dropped.
    Rejected,
}

impl PushOutcome {
    #[must_use]
    pub fn is_stored(self) -> bool {
        !matches!(self, PushOutcome::Rejected)
    }
}

struct Slot {
    seq: AtomicUsize,
    pc: AtomicUsize,
}

/// Fixed-capacity multi-producer ring of program counters
pub struct SampleRing {
    slots: Box<[Slot]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    captured: AtomicU64,
    dropped: AtomicU64,
}

impl SampleRing {
    /// Allocate a ring. `capacity` is rounded up to a power of two, minimum 2.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots = (0..capacity)
            .map(|i| Slot { seq: AtomicUsize::new(i), pc: AtomicUsize::new(0) })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            captured: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Store one program counter. Async-signal-safe.
    pub fn push(&self, pc: usize) -> PushOutcome {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = (seq as isize).wrapping_sub(pos as isize);

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        slot.pc.store(pc, Ordering::Relaxed);
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        self.captured.fetch_add(1, Ordering::Relaxed);

                        let tail = self.tail.load(Ordering::Acquire);
                        return if pos.wrapping_add(1).wrapping_sub(tail) >= self.capacity() {
                            PushOutcome::Filled
                        } else {
                            PushOutcome::Stored
                        };
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // Slot from the previous lap not consumed yet
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return PushOutcome::Rejected;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Take the oldest published sample.
    ///
    /// Returns `None` when empty or when the oldest claimed slot is still
    /// being written by an interrupted producer.
    pub fn pop(&self) -> Option<usize> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = (seq as isize).wrapping_sub(pos.wrapping_add(1) as isize);

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let pc = slot.pc.load(Ordering::Relaxed);
                        slot.seq.store(pos.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(pc);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Move every published sample into `out`, in order. Returns how many.
    pub fn drain_into(&self, out: &mut Vec<usize>) -> usize {
        let before = out.len();
        while let Some(pc) = self.pop() {
            out.push(pc);
        }
        out.len() - before
    }

    /// Samples claimed but not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples stored since creation.
    #[must_use]
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Samples rejected because the ring was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_pop_order() {
        let ring = SampleRing::new(8);
        for pc in [0x1000, 0x1004, 0x1008] {
            assert_eq!(ring.push(pc), PushOutcome::Stored);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop(), Some(0x1000));
        assert_eq!(ring.pop(), Some(0x1004));
        assert_eq!(ring.pop(), Some(0x1008));
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_filled_then_rejected() {
        let ring = SampleRing::new(4);
        assert_eq!(ring.push(1), PushOutcome::Stored);
        assert_eq!(ring.push(2), PushOutcome::Stored);
        assert_eq!(ring.push(3), PushOutcome::Stored);
        assert_eq!(ring.push(4), PushOutcome::Filled);
        assert_eq!(ring.push(5), PushOutcome::Rejected);
        assert_eq!(ring.captured(), 4);
        assert_eq!(ring.dropped(), 1);

        let mut out = Vec::new();
        assert_eq!(ring.drain_into(&mut out), 4);
        assert_eq!(out, vec![1, 2, 3, 4]);

        // Slots are reusable on the next lap
        assert_eq!(ring.push(6), PushOutcome::Stored);
        assert_eq!(ring.pop(), Some(6));
    }

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(SampleRing::new(0).capacity(), 2);
        assert_eq!(SampleRing::new(1000).capacity(), 1024);
        assert_eq!(SampleRing::new(1024).capacity(), 1024);
    }

    #[test]
    fn test_wraps_many_laps() {
        let ring = SampleRing::new(4);
        let mut out = Vec::new();
        for pc in 0..1000 {
            assert!(ring.push(pc).is_stored());
            ring.drain_into(&mut out);
        }
        assert_eq!(out, (0..1000).collect::<Vec<_>>());
        assert_eq!(ring.dropped(), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let ring = Arc::new(SampleRing::new(64));
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..500 {
                        while !ring.push(t * 10_000 + i).is_stored() {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut out = Vec::new();
        while out.len() < 2000 {
            if ring.drain_into(&mut out) == 0 {
                thread::yield_now();
            }
        }
        for p in producers {
            p.join().unwrap();
        }

        // Per-producer order is preserved
        for t in 0..4 {
            let mine: Vec<_> = out.iter().copied().filter(|pc| pc / 10_000 == t).collect();
            assert_eq!(mine, (0..500).map(|i| t * 10_000 + i).collect::<Vec<_>>());
        }
    }
}
