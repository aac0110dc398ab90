// corluma-core: discovery engines, record persistence and state between corluma-api and the CLI.

pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DiscoveryConfig, NetworkConfig};
pub use discovery::{DiscoveryEngine, DiscoverySnapshot};
pub use error::CoreError;
pub use model::{
    reduce_state, AuthState, BucketCounts, ConnectionRecord, DiscoveryState, LightSummary,
};
pub use service::{DiscoveryHandle, DiscoveryService};
pub use store::{Bucket, PersistenceStore, RecordBuckets};

pub use corluma_api::ProtocolFamily;
