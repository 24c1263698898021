//! Domain rows, write payloads and the store trait for each entity.
//!
//! Every store trait is object safe and implemented twice: by the PostgreSQL
//! repositories in [`crate::postgres`] and, behind the `test-utils` feature,
//! by [`crate::memory::MemoryStore`].

pub mod attachment;
pub mod board;
pub mod column;
pub mod comment;
pub mod project;
pub mod session;
pub mod tag;
pub mod task;
pub mod time_entry;
pub mod user;
