//! Opaque group handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a group registered in a [`GroupRegistry`](crate::GroupRegistry).
///
/// Handles are allocated from a per-registry counter under the registry lock,
/// so a registry never hands out the same handle twice. Any `u64` can be
/// turned into a handle; polling one that was never issued reports
/// [`UnknownHandle`](crate::BunchError::UnknownHandle).
///
/// # Examples
///
/// ```
/// use taskbunch::GroupHandle;
///
/// let handle = GroupHandle::from(42);
/// assert_eq!(handle.get(), 42);
/// assert_eq!(handle.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupHandle(u64);

impl GroupHandle {
    /// Returns the raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for GroupHandle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic handle source. Not synchronized; the registry owns it behind
/// its mutex.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    /// Next unused handle, or `None` once the counter is exhausted.
    pub(crate) fn allocate(&mut self) -> Option<GroupHandle> {
        let next = self.next.checked_add(1)?;
        let handle = GroupHandle(self.next);
        self.next = next;
        Some(handle)
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next: u64) -> Self {
        Self { next }
    }
}
