//! fleetroll-fleet: handles over a cloud provider's auto scaling groups.
//!
//! The provider itself sits behind the [`FleetApi`] and [`ImagePublisher`]
//! traits; deployment commands run through a [`DeployRunner`]. On top of
//! those the crate provides:
//!
//! - **`group`**: [`Group`] handle: memoized lookups, instance refresh
//!   start/query, standby transitions
//! - **`instance`**: [`Instance`] handle with a by-name back-reference
//! - **`refresh`**: instance refresh status classification
//! - **`poll`**: fixed-interval polling with an optional deadline
//! - **`simulated`**: in-memory fleet used by tests and `fleetroll simulate`
//!
//! # Architecture
//!
//! ```text
//! Group ──► Arc<dyn FleetApi>
//!   ├── launch_template()        (memoized)
//!   ├── start_instance_refresh() ──► refresh id (set once)
//!   ├── latest_instance_refresh() ──► RefreshSnapshot ──► classify()
//!   └── enter_standby() ──► Poller (lifecycle state == Standby)
//! ```

pub mod api;
pub mod error;
pub mod group;
pub mod instance;
pub mod poll;
pub mod refresh;
pub mod simulated;

pub use api::{
    DeployRunner, FleetApi, GroupDescriptor, GroupMember, ImagePublisher, InstanceDetails,
    LaunchTemplate, LifecycleState, RefreshPreferences,
};
pub use error::{FleetError, FleetResult};
pub use group::Group;
pub use instance::Instance;
pub use poll::Poller;
pub use refresh::{RefreshOutcome, RefreshSnapshot, RefreshStatus, classify};
pub use simulated::{FleetFixture, SimulatedFleet};
