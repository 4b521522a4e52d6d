//! Lock-free publication of persistent tree versions.
//!
//! This module provides [`ConcurrentSlot`], a shared mutable cell holding
//! the current version of an [`crate::persistent::ImmutableHashTree`].
//! Writers compute a new version with a pure insert and publish it with
//! compare-and-swap, retrying on conflict; readers take immutable snapshots
//! and never block or retry.

mod slot;

pub use slot::ConcurrentSlot;
