mod blob_store;
mod data_store;

pub use blob_store::MemoryBlobStore;
pub use data_store::MemoryDataStore;
