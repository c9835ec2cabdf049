//! Concrete collaborators: filesystem byte storage and a JSON-file metadata store.

pub mod metadata;
pub mod storage;

pub use metadata::FileMetadataStore;
pub use storage::LocalByteStore;
