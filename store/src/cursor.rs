//! Sync cursor storage trait.

use crate::StoreError;
use escrow_types::BlockHeight;

/// Persistent record of how far chain sync has progressed.
///
/// The cursor holds the next height to consume and never moves backwards.
pub trait CursorStore {
    /// `None` until the first block has been committed.
    fn next_height(&self) -> Result<Option<BlockHeight>, StoreError>;

    /// Advance the cursor. Values at or below the current cursor are ignored.
    fn set_next_height(&self, height: BlockHeight) -> Result<(), StoreError>;

    /// Close out `height`: reclaim the replay markers of every block up to
    /// and including it and advance the cursor to `height + 1`.
    fn commit_block(&self, height: BlockHeight) -> Result<(), StoreError>;
}
