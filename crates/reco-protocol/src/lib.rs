//! Spark Operator Resource Types
//!
//! Wire shapes of the `SparkApplication` custom resource as accepted and
//! reflected by the cluster control plane, plus the closed set of
//! application states the lifecycle engine reacts to.

pub mod application;
pub mod state;

pub use application::{
    ApplicationStateInfo, DriverSpec, ExecutorSpec, NameKey, ObjectMeta, SparkApplication,
    SparkApplicationSpec, SparkApplicationStatus,
};
pub use state::{ApplicationState, StateOutcome};

/// API group/version of the Spark operator resources.
pub const API_VERSION: &str = "sparkoperator.k8s.io/v1beta2";

/// Kind of the submitted resource.
pub const KIND: &str = "SparkApplication";

/// Plural resource name, fully qualified for `kubectl`.
pub const RESOURCE: &str = "sparkapplications.sparkoperator.k8s.io";
