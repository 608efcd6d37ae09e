/// Normalized answer maps.
pub mod answers;
/// Remote document store backends.
pub mod event_store;
/// Durable local key-value cache.
pub mod local_cache;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer errors.
pub mod storage;
