//! Bounded, always-sorted candidate lists.
//!
//! A search sees millions of trial bins but only keeps a handful of them.
//! [`RankedList`] holds those survivors in non-increasing order of a ranking
//! metric (power for plain candidates, significance for binary ones).  An
//! unfilled slot holds the candidate type's sentinel, whose metric is zero,
//! so it always sorts after every genuine entry.
//!
//! Insertion overwrites the last slot and bubbles the newcomer forward, one
//! step of insertion sort.  That is O(capacity) in the worst case but O(1)
//! for the common case of a noise candidate that barely makes the cut.
//!
//! Two lifecycles are supported:
//!
//! - **fixed**: the capacity is chosen by the caller and never changes; the
//!   admission threshold is the weakest metric currently held.
//! - **dynamic**: the list starts at [`RankedList::DEFAULT_CAPACITY`] and
//!   doubles whenever it is full of genuine entries and another one arrives.
//!   The caller decides admission (usually from a significance cutoff), and
//!   the list never evicts anything.

/// A candidate that can be ranked inside a [`RankedList`].
pub trait Ranked: Clone {
    /// The value the list is sorted by (higher is better).
    fn metric(&self) -> f64;

    /// An empty slot.  Its metric must be zero.
    fn sentinel() -> Self;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Growth {
    Fixed,
    Dynamic,
}

/// A contiguous, sorted candidate list with either fixed or doubling
/// capacity.
#[derive(Clone, Debug)]
pub struct RankedList<C> {
    slots: Vec<C>,
    /// Number of slots holding real candidates.  Saturates at the capacity
    /// in fixed mode.
    genuine: usize,
    growth: Growth,
}

impl<C: Ranked> RankedList<C> {
    /// Starting capacity of a dynamic list.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// A list of exactly `capacity` slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn fixed(capacity: usize) -> Self {
        assert!(capacity > 0, "a fixed ranked list needs at least one slot");
        Self {
            slots: vec![C::sentinel(); capacity],
            genuine: 0,
            growth: Growth::Fixed,
        }
    }

    /// A list that starts at [`Self::DEFAULT_CAPACITY`] slots and doubles on
    /// demand.
    pub fn dynamic() -> Self {
        Self {
            slots: vec![C::sentinel(); Self::DEFAULT_CAPACITY],
            genuine: 0,
            growth: Growth::Dynamic,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.growth == Growth::Dynamic
    }

    /// Number of physical slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of genuine (non-sentinel) admissions retained.
    pub fn genuine(&self) -> usize {
        self.genuine
    }

    /// Metric of the last slot; the admission threshold of a fixed list.
    pub fn min_metric(&self) -> f64 {
        self.slots.last().map_or(0.0, Ranked::metric)
    }

    pub fn as_slice(&self) -> &[C] {
        &self.slots
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, C> {
        self.slots.iter_mut()
    }

    /// Insert a candidate that has already passed the caller's threshold
    /// test and return the new minimum metric.
    ///
    /// A fixed list silently ignores a candidate that would not beat its
    /// weakest entry.  A full dynamic list doubles before inserting, so no
    /// genuine entry is ever lost.
    pub fn admit(&mut self, candidate: C) -> f64 {
        match self.growth {
            Growth::Fixed => {
                if candidate.metric() <= self.min_metric() {
                    return self.min_metric();
                }
                self.genuine = (self.genuine + 1).min(self.slots.len());
            }
            Growth::Dynamic => {
                if self.genuine == self.slots.len() {
                    let doubled = self.slots.len() * 2;
                    self.slots.resize(doubled, C::sentinel());
                }
                self.genuine += 1;
            }
        }

        if let Some(last) = self.slots.last_mut() {
            *last = candidate;
        }
        percolate(&mut self.slots)
    }

    /// Consume the list.  Dynamic lists are trimmed to their genuine
    /// entries; fixed lists keep every slot, sentinels included.
    pub fn into_candidates(mut self) -> Vec<C> {
        if self.is_dynamic() {
            self.slots.truncate(self.genuine);
        }
        self.slots
    }
}

/// Move the last element of `slots` forward until the slice is sorted in
/// non-increasing metric order again.  Returns the metric of the last slot.
///
/// Everything before the last element must already be sorted.
pub fn percolate<C: Ranked>(slots: &mut [C]) -> f64 {
    let n = slots.len();
    if n == 0 {
        return 0.0;
    }
    for ii in (0..n - 1).rev() {
        if slots[ii].metric() < slots[ii + 1].metric() {
            slots.swap(ii, ii + 1);
        } else {
            break;
        }
    }
    slots[n - 1].metric()
}
