//! Nullable cursor: an in-memory sync cursor.

use std::sync::Mutex;

use escrow_store::{CursorStore, StoreError};
use escrow_types::BlockHeight;

/// In-memory [`CursorStore`] that can be told to fail.
#[derive(Debug, Default)]
pub struct NullCursor {
    next: Mutex<Option<BlockHeight>>,
    fail_writes: Mutex<bool>,
    commits: Mutex<Vec<BlockHeight>>,
}

impl NullCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next: BlockHeight) -> Self {
        let cursor = Self::default();
        *cursor.next.lock().unwrap() = Some(next);
        cursor
    }

    /// Make every subsequent write fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    /// Heights passed to `commit_block`, in call order.
    pub fn commits(&self) -> Vec<BlockHeight> {
        self.commits.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StoreError::Backend("null cursor write failure".into()));
        }
        Ok(())
    }
}

impl CursorStore for NullCursor {
    fn next_height(&self) -> Result<Option<BlockHeight>, StoreError> {
        Ok(*self.next.lock().unwrap())
    }

    fn set_next_height(&self, height: BlockHeight) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut next = self.next.lock().unwrap();
        if next.map_or(true, |current| height > current) {
            *next = Some(height);
        }
        Ok(())
    }

    fn commit_block(&self, height: BlockHeight) -> Result<(), StoreError> {
        self.check_writable()?;
        self.commits.lock().unwrap().push(height);
        self.set_next_height(height.saturating_add(1))
    }
}
