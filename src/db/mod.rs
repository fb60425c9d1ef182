pub mod memstore;
pub mod sessionstore;

pub use memstore::MemorySessionStore;
pub use sessionstore::{SessionStore, StoreError};
