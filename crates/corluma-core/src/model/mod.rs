// Domain model: connection records and the aggregate discovery state.

pub mod record;
pub mod state;

pub use record::{AuthState, ConnectionRecord, LightSummary};
pub use state::{reduce_state, BucketCounts, DiscoveryState};
