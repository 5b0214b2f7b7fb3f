pub mod coordinator;
pub mod segments;
pub mod store;
pub mod types;
pub mod warmer;

pub use coordinator::{RefreshCoordinator, ServedSession};
pub use store::SessionStore;
pub use types::{CaptureResult, ChannelId, ChannelSession};
pub use warmer::WarmerConfig;
