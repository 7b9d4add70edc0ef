pub mod codec;
pub mod error;
pub mod store;

pub use codec::{PostingKind, PostingRecord, Triple};
pub use error::StorageError;
pub use store::{DupStore, MemDupStore, SqliteDupStore};
