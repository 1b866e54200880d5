pub mod document;
pub mod local;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use document::{Direction, Document, DocumentStore, DocumentWrite, Query};
pub use local::{LocalStorage, MemoryStorage, ScopedStorage};
