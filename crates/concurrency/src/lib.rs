//! Concurrency primitives for the vault store
//!
//! This crate provides the recursive, write-preferring read-write lock that
//! guards every vault and record set:
//! - Many concurrent readers XOR one writer
//! - Re-entrant per thread for both read and write
//! - Once a writer is waiting, no new reader is admitted

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod rwlock;

pub use rwlock::{ReadGuard, RecursiveRwLock, WriteGuard};
