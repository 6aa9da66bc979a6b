//! A single unit of work with a write-once result.

use std::fmt;

use tokio::sync::{Notify, OnceCell};

use crate::error::{BunchError, Result};
use crate::solver::Solver;

/// One submitted item plus the cell its result is written into.
///
/// The cell is written at most once. After that [`ready`](Self::ready) stays
/// `true` and every read returns the same value; before that,
/// [`get`](Self::get) waits and [`try_get`](Self::try_get) returns `None`.
pub struct WorkUnit<I, O> {
    index: usize,
    input: I,
    result: OnceCell<O>,
    written: Notify,
}

impl<I, O> WorkUnit<I, O>
where
    O: Clone,
{
    /// Create a pending unit with its index inside the owning group.
    pub fn new(index: usize, input: I) -> Self {
        Self {
            index,
            input,
            result: OnceCell::new(),
            written: Notify::new(),
        }
    }

    /// Index of this unit within its group.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The submitted item.
    pub fn input(&self) -> &I {
        &self.input
    }

    /// `true` once the result has been written. Never blocks.
    pub fn ready(&self) -> bool {
        self.result.initialized()
    }

    /// The result if it has been written.
    pub fn try_get(&self) -> Option<O> {
        self.result.get().cloned()
    }

    /// Wait until the result is written and return it.
    pub async fn get(&self) -> O {
        loop {
            // Register before checking so a write between the check and the
            // await still wakes us.
            let written = self.written.notified();
            if let Some(value) = self.result.get() {
                return value.clone();
            }
            written.await;
        }
    }

    /// Run `solver` on the input and write the result.
    ///
    /// # Errors
    ///
    /// - [`BunchError::DoubleCompute`] if the result was already written.
    /// - Whatever the solver returns; the cell stays empty in that case.
    pub async fn compute<S>(&self, solver: &S) -> Result<()>
    where
        S: Solver<Input = I, Output = O> + ?Sized,
    {
        if self.ready() {
            return Err(BunchError::DoubleCompute { index: self.index });
        }
        let value = solver.solve(&self.input).await?;
        self.set(value)?;
        tracing::debug!(index = self.index, "task computed");
        Ok(())
    }

    fn set(&self, value: O) -> Result<()> {
        self.result
            .set(value)
            .map_err(|_| BunchError::DoubleCompute { index: self.index })?;
        self.written.notify_waiters();
        Ok(())
    }
}

impl<I, O> fmt::Debug for WorkUnit<I, O>
where
    I: fmt::Debug,
    O: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("index", &self.index)
            .field("input", &self.input)
            .field("result", &self.result.get())
            .finish()
    }
}
