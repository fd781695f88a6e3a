//! In-memory reference backend.
//!
//! Implements the `tp_core` backend traits entirely in process: a task
//! store with live change notifications and atomic batches, a profile
//! store, and an identity backend with injectable failures. Backs demo
//! mode and every test that would otherwise need a live remote store.

pub mod memory;

pub use memory::{MemoryIdentityBackend, MemoryProfileStore, MemoryTaskStore};
