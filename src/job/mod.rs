//! Job specification builder
//!
//! Turns a validated [`JobRequest`] into a [`JobSpec`]: a fresh [`JobId`],
//! the job's argument list and the `SparkApplication` manifest that carries
//! it. Everything except the id is a pure function of the request and the
//! job settings.

mod args;

pub use args::{ArgsError, JobArguments};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use reco_params::JobRequest;
use reco_protocol::{
    DriverSpec, ExecutorSpec, NameKey, ObjectMeta, SparkApplication, SparkApplicationSpec,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{JobSettings, StoreSettings};

/// Prefix of every SparkApplication name created by this tool.
pub const APPLICATION_NAME_PREFIX: &str = "policy-reco-";

/// Environment variables through which the job reads store credentials.
pub const ENV_STORE_USERNAME: &str = "CH_USERNAME";
pub const ENV_STORE_PASSWORD: &str = "CH_PASSWORD";

/// Identifier of one recommendation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Name of the SparkApplication carrying this job.
    pub fn application_name(&self) -> String {
        format!("{}{}", APPLICATION_NAME_PREFIX, self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Everything the submitter needs, derived from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job_id: JobId,
    pub request: JobRequest,
    pub arguments: JobArguments,
    pub application: SparkApplication,
}

impl JobSpec {
    pub fn name(&self) -> &str {
        &self.application.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.application.metadata.namespace
    }
}

/// Builds [`JobSpec`]s for one namespace and set of job settings.
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    namespace: String,
    job: JobSettings,
    credentials_secret: String,
    username_key: String,
    password_key: String,
}

impl JobSpecBuilder {
    pub fn new(namespace: impl Into<String>, job: &JobSettings, store: &StoreSettings) -> Self {
        Self {
            namespace: namespace.into(),
            job: job.clone(),
            credentials_secret: store.credentials_secret.clone(),
            username_key: store.username_key.clone(),
            password_key: store.password_key.clone(),
        }
    }

    /// Build a `JobSpec` with a newly generated id.
    pub fn build(&self, request: &JobRequest) -> JobSpec {
        self.build_with_id(request, JobId::new())
    }

    /// Build a `JobSpec` for a given id.
    pub fn build_with_id(&self, request: &JobRequest, job_id: JobId) -> JobSpec {
        let arguments = JobArguments::from_request(request, job_id);
        let application = self.application(request, job_id, arguments.to_argv());
        JobSpec {
            job_id,
            request: request.clone(),
            arguments,
            application,
        }
    }

    fn application(&self, request: &JobRequest, job_id: JobId, argv: Vec<String>) -> SparkApplication {
        let labels: BTreeMap<String, String> =
            [("version".to_string(), self.job.spark_version.clone())].into();
        let secrets = self.secret_refs();
        let resources = &request.resources;

        let spec = SparkApplicationSpec {
            app_type: "Python".to_string(),
            spark_version: self.job.spark_version.clone(),
            mode: "cluster".to_string(),
            image: Some(self.job.image.clone()),
            image_pull_policy: Some(self.job.image_pull_policy.clone()),
            main_application_file: Some(self.job.main_application_file.clone()),
            arguments: argv,
            driver: DriverSpec {
                core_request: Some(resources.driver_core_request.as_str().to_string()),
                memory: Some(resources.driver_memory.as_str().to_string()),
                labels: labels.clone(),
                env_secret_key_refs: secrets.clone(),
                service_account: Some(self.job.service_account.clone()),
            },
            executor: ExecutorSpec {
                core_request: Some(resources.executor_core_request.as_str().to_string()),
                memory: Some(resources.executor_memory.as_str().to_string()),
                labels,
                env_secret_key_refs: secrets,
                instances: Some(resources.executor_instances),
            },
        };

        let metadata = ObjectMeta {
            name: job_id.application_name(),
            namespace: self.namespace.clone(),
            ..Default::default()
        };

        SparkApplication::new(metadata, spec)
    }

    fn secret_refs(&self) -> BTreeMap<String, NameKey> {
        let key_ref = |key: &str| NameKey {
            name: self.credentials_secret.clone(),
            key: key.to_string(),
        };
        [
            (ENV_STORE_USERNAME.to_string(), key_ref(&self.username_key)),
            (ENV_STORE_PASSWORD.to_string(), key_ref(&self.password_key)),
        ]
        .into()
    }
}
