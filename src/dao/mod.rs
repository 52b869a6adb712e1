/// Persisted team and clock records.
pub mod models;
/// Backend-neutral storage errors.
pub mod storage;
/// Storage traits and their MongoDB, CouchDB, and in-memory backends.
pub mod store;
