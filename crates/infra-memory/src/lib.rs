// Dispatch Infrastructure - In-process Adapters
// Implements: BroadcastTransport, FeatureFlagService, DelegateCache, DelegateLifecycle, LeaderElection

pub mod broadcaster;
pub mod delegate_cache;
pub mod feature_flags;
pub mod leader;
pub mod lifecycle;

pub use broadcaster::InMemoryBroadcaster;
pub use delegate_cache::CachedDelegateLookup;
pub use feature_flags::StaticFeatureFlags;
pub use leader::AlwaysPrimary;
pub use lifecycle::{DelegateLifecycleEvent, LifecycleEventBus};
