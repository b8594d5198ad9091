//! Persistence seam for recorded strips.
//!
//! The core never touches the filesystem. Callers that want strips to
//! survive a session implement [`StripStore`]; [`MemoryStripStore`] is
//! the in-process implementation used by tests.

use crate::contour::Strip;

/// Errors raised by a [`StripStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    #[error("strip store I/O failed: {0}")]
    Io(String),

    /// Stored data could not be encoded or decoded.
    #[error("strip store data is malformed: {0}")]
    Format(String),

    /// Nothing has been saved yet.
    #[error("no strips have been saved")]
    NotFound,
}

/// Loads and saves the sealed strip collection.
pub trait StripStore {
    /// Load the saved strips.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing was saved, and
    /// [`StoreError::Io`] or [`StoreError::Format`] on backend failures.
    fn load_strips(&self) -> Result<Vec<Strip>, StoreError>;

    /// Replace the saved strips.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Format`] on backend
    /// failures.
    fn save_strips(&mut self, strips: &[Strip]) -> Result<(), StoreError>;
}

/// Keeps strips in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStripStore {
    strips: Option<Vec<Strip>>,
}

impl MemoryStripStore {
    #[must_use]
    pub const fn new() -> Self {
        Self { strips: None }
    }
}

impl StripStore for MemoryStripStore {
    fn load_strips(&self) -> Result<Vec<Strip>, StoreError> {
        self.strips.clone().ok_or(StoreError::NotFound)
    }

    fn save_strips(&mut self, strips: &[Strip]) -> Result<(), StoreError> {
        self.strips = Some(strips.to_vec());
        Ok(())
    }
}
