//! Shared single-slot state.
//!
//! The handler cell and the two option slots are the only mutable
//! state shared between the dispatcher and the background loops.
//! Writes are rare (once per slot per node lifetime in the common
//! case), reads are frequent, so a plain read-write lock around an
//! `Arc`/`Option` is all the atomicity this needs.

use {
  crate::{consensus::Casper, engine::ApprovedBlockWithTransforms},
  std::sync::{Arc, RwLock},
};

/// An initially empty slot that is populated at most a handful of
/// times and read concurrently. Readers get a clone of the value.
pub struct Slot<T: Clone>(Arc<RwLock<Option<T>>>);

impl<T: Clone> Slot<T> {
  pub fn empty() -> Self {
    Self(Arc::new(RwLock::new(None)))
  }

  pub fn get(&self) -> Option<T> {
    self.0.read().unwrap().clone()
  }

  pub fn set(&self, value: T) {
    *self.0.write().unwrap() = Some(value);
  }
}

impl<T: Clone> Clone for Slot<T> {
  fn clone(&self) -> Self {
    Self(Arc::clone(&self.0))
  }
}

impl<T: Clone> Default for Slot<T> {
  fn default() -> Self {
    Self::empty()
  }
}

/// An always-populated atomic reference. Readers see either the old
/// or the new value, never a mix.
pub struct Shared<T>(Arc<RwLock<Arc<T>>>);

impl<T> Shared<T> {
  pub fn new(value: T) -> Self {
    Self(Arc::new(RwLock::new(Arc::new(value))))
  }

  pub fn get(&self) -> Arc<T> {
    Arc::clone(&self.0.read().unwrap())
  }

  pub fn set(&self, value: T) {
    *self.0.write().unwrap() = Arc::new(value);
  }
}

impl<T> Clone for Shared<T> {
  fn clone(&self) -> Self {
    Self(Arc::clone(&self.0))
  }
}

/// The slot holding the approved block this shard settled on, with
/// its precomputed transforms.
pub type LastApprovedBlock = Slot<ApprovedBlockWithTransforms>;

/// The slot holding the consensus instance once constructed.
pub type CasperRef = Slot<Arc<Casper>>;

#[cfg(test)]
mod test {
  use super::{Shared, Slot};

  #[test]
  fn slot_starts_empty_and_keeps_the_value() {
    let slot: Slot<u64> = Slot::empty();
    assert_eq!(slot.get(), None);
    slot.set(42);
    assert_eq!(slot.get(), Some(42));

    // clones observe the same slot
    let alias = slot.clone();
    alias.set(43);
    assert_eq!(slot.get(), Some(43));
  }

  #[test]
  fn shared_swaps_whole_values() {
    let shared = Shared::new("bootstrap");
    let reader = shared.clone();
    assert_eq!(*reader.get(), "bootstrap");
    shared.set("approved");
    assert_eq!(*reader.get(), "approved");
  }
}
