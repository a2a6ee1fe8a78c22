//! Chat sessions: the in-memory registry, its persistence port, and the
//! retry policy wrapped around every store call.
//!
//! `ChatStore` is the trait the infrastructure layer implements; the
//! registry never talks to a database directly.

pub mod policy;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
