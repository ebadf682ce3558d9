use std::ops::{Deref, DerefMut};

use tracing::debug;

/// A stack of reversible mutation layers.
///
/// Implemented by every `Table` and by aggregates that fan the calls out
/// to each of their tables, so one session can span a whole database.
pub trait UndoStack {
    /// Open a new layer; subsequent mutations are recorded in it
    fn push_layer(&mut self);

    /// Discard the top layer, replaying its deltas in reverse
    fn undo_layer(&mut self);

    /// Merge the top layer into its parent, or commit if it is the root
    fn squash_layer(&mut self);

    /// Number of open layers
    fn depth(&self) -> usize;
}

/// A nested, reversible mutation scope over an undo stack.
///
/// Mutations made through the session (it derefs to the underlying store)
/// are recorded in the layer opened at construction. `squash` keeps them,
/// `undo` reverts them; a session dropped without squashing reverts
/// automatically, which is the abort path for a failed block.
pub struct Session<'a, D: UndoStack> {
    store: &'a mut D,
    open: bool,
}

impl<'a, D: UndoStack> Session<'a, D> {
    pub fn new(store: &'a mut D) -> Self {
        store.push_layer();
        debug!(depth = store.depth(), "undo session started");
        Session { store, open: true }
    }

    /// Revert every mutation made in this session, restoring the exact
    /// prior state including id allocators
    pub fn undo(mut self) {
        self.open = false;
        self.store.undo_layer();
        debug!(depth = self.store.depth(), "undo session reverted");
    }

    /// Merge this session into its parent (or commit if it is the root)
    pub fn squash(mut self) {
        self.open = false;
        self.store.squash_layer();
        debug!(depth = self.store.depth(), "undo session squashed");
    }
}

impl<D: UndoStack> Deref for Session<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.store
    }
}

impl<D: UndoStack> DerefMut for Session<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.store
    }
}

impl<D: UndoStack> Drop for Session<'_, D> {
    fn drop(&mut self) {
        if self.open {
            self.store.undo_layer();
            debug!(depth = self.store.depth(), "undo session rolled back on drop");
        }
    }
}
