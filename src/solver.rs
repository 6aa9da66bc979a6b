//! The computation carried by each work unit.

use async_trait::async_trait;

use crate::error::{BunchError, Result};

/// A pure computation applied to every submitted item.
///
/// The dispatcher treats inputs and outputs as opaque. Outputs must be
/// `Clone` because a computed result can be read any number of times.
#[async_trait]
pub trait Solver: Send + Sync + 'static {
    /// One submitted item.
    type Input: Send + Sync + 'static;
    /// The computed result for one item.
    type Output: Clone + Send + Sync + 'static;

    /// Compute the result for `input`.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::Solve`] if the input cannot be solved. Inside a
    /// group this fails the whole group.
    async fn solve(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// Adds the two integers of a pair.
///
/// # Examples
///
/// ```
/// use taskbunch::{Solver, SumSolver};
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// assert_eq!(rt.block_on(SumSolver.solve(&(7, 8))).unwrap(), 15);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SumSolver;

#[async_trait]
impl Solver for SumSolver {
    type Input = (i64, i64);
    type Output = i64;

    async fn solve(&self, input: &Self::Input) -> Result<Self::Output> {
        let (a, b) = *input;
        a.checked_add(b)
            .ok_or_else(|| BunchError::solve(format!("{a} + {b} overflows i64")))
    }
}
