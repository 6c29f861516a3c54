//! In-process test doubles
//!
//! - [`MockCluster`]: scripted control plane. Each job follows a list of
//!   application states, one per status query, repeating the last one.
//!   Pods, services, secrets and port-forwards are configured up front and
//!   every call is recorded for assertions.
//! - [`MockStore`]: result store returning canned artifacts per job.

mod cluster;
mod store;

pub use cluster::{MockCluster, MockTunnel};
pub use store::{MockStore, RecordedQuery};
