//! Strategies for splitting a task list into bunches.
//!
//! A [`BatchSizePolicy`] only decides sizes; the dispatcher slices the input
//! accordingly. Batches that end up below the configured minimum are solved
//! one task at a time through the fast path.

/// Splits `total` items into consecutive batch sizes.
pub trait BatchSizePolicy: Send + Sync {
    /// Batch sizes in submission order. Every size is non-zero and the
    /// sizes add up to `total`; an empty plan is returned for `total == 0`.
    fn plan(&self, total: usize) -> Vec<usize>;
}

/// Greedy chunks of `size`, with whatever is left over as the last batch.
///
/// # Examples
///
/// ```
/// use taskbunch::{BatchSizePolicy, FixedBatches};
///
/// assert_eq!(FixedBatches::new(4).plan(9), vec![4, 4, 1]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBatches {
    size: usize,
}

impl FixedBatches {
    /// Chunks of `size` items; a size of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl BatchSizePolicy for FixedBatches {
    fn plan(&self, total: usize) -> Vec<usize> {
        let mut sizes = vec![self.size; total / self.size];
        if total % self.size != 0 {
            sizes.push(total % self.size);
        }
        sizes
    }
}

/// The fewest batches of at most `max` items, sized as evenly as possible.
///
/// Using `ceil(total / max)` batches whose sizes differ by at most one keeps
/// every batch at or above `min` whenever `total >= min` and
/// `max >= 2 * min - 1`, which holds for the default 2..=4 range.
///
/// # Examples
///
/// ```
/// use taskbunch::{BalancedBatches, BatchSizePolicy};
///
/// let policy = BalancedBatches::new(2, 4);
/// assert_eq!(policy.plan(5), vec![3, 2]);
/// assert_eq!(policy.plan(9), vec![3, 3, 3]);
/// assert_eq!(policy.plan(1), vec![1]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancedBatches {
    min: usize,
    max: usize,
}

impl BalancedBatches {
    /// Balanced batches within `min..=max`. `max` is raised to at least
    /// `min`, and both to at least 1.
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        Self {
            min,
            max: max.max(min),
        }
    }

    /// Lower bound the plan aims for.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Upper bound no batch exceeds.
    pub fn max(&self) -> usize {
        self.max
    }
}

impl BatchSizePolicy for BalancedBatches {
    fn plan(&self, total: usize) -> Vec<usize> {
        if total == 0 {
            return Vec::new();
        }
        let batches = total.div_ceil(self.max);
        let base = total / batches;
        let larger = total % batches;
        (0..batches)
            .map(|i| if i < larger { base + 1 } else { base })
            .collect()
    }
}
