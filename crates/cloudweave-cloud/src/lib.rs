//! cloudweave cloud layer
//!
//! Connects the pure comparison engine in `cloudweave-rules` to cloud
//! providers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   weave CLI                      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               cloudweave-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │ Reconciler: lock → list → diff → apply    │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Registry   │  │ Locks / Plan │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ SecurityGroup │ │ DnsZone /     │
//! │     Api       │ │ AccessGroupApi│
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod lock;
pub mod memory;
pub mod profile;
pub mod provider;
pub mod reconcile;
pub mod registry;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary, ResourceKind};
pub use error::{CloudError, Result};
pub use lock::{LockInfo, ResourceGuard, ResourceLocks};
pub use memory::MemoryProvider;
pub use profile::{
    AccessGroupProfile, DnsProfile, ProviderProfile, SecurityGroupProfile, builtin_profiles,
};
pub use provider::{AccessGroupApi, CloudProvider, DnsZoneApi, RetryConfig, SecurityGroupApi};
pub use reconcile::{Reconciler, SyncReport};
pub use registry::ProviderRegistry;
