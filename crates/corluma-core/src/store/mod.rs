// In-memory record buckets and their on-disk mirror.

pub mod buckets;
pub mod persistence;

pub use buckets::{Bucket, RecordBuckets, Slot};
pub use persistence::PersistenceStore;
