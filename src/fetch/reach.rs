//! Routes to the result store.
//!
//! A [`Reachability`] strategy opens a [`StoreRoute`]: a base URL plus,
//! for tunneled access, the guard keeping the port-forward alive.

use reqwest::Url;
use tracing::debug;

use crate::cluster::{Cluster, Tunnel};
use crate::config::StoreSettings;
use crate::job::JobId;

use super::FetchError;

/// Base URL of the store, valid while the value is alive.
pub struct StoreRoute {
    pub base_url: Url,
    guard: Option<Box<dyn Tunnel>>,
}

impl StoreRoute {
    pub fn new(base_url: Url) -> Self {
        Self { base_url, guard: None }
    }

    pub fn tunneled(base_url: Url, guard: Box<dyn Tunnel>) -> Self {
        Self {
            base_url,
            guard: Some(guard),
        }
    }

    pub fn is_tunneled(&self) -> bool {
        self.guard.is_some()
    }
}

impl std::fmt::Debug for StoreRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRoute")
            .field("base_url", &self.base_url.as_str())
            .field("tunneled", &self.is_tunneled())
            .finish()
    }
}

/// What a retrieval talks to: the job and an open route.
///
/// Dropping the target releases any tunnel.
#[derive(Debug)]
pub struct RetrievalTarget {
    pub job_id: JobId,
    pub route: StoreRoute,
}

impl RetrievalTarget {
    pub fn base_url(&self) -> &Url {
        &self.route.base_url
    }
}

/// Strategy for reaching the store's HTTP interface.
pub trait Reachability {
    fn open(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        store: &StoreSettings,
    ) -> Result<StoreRoute, FetchError>;

    fn describe(&self) -> String;
}

/// A caller-supplied endpoint, used as is.
#[derive(Debug, Clone)]
pub struct FixedEndpoint {
    url: Url,
}

impl FixedEndpoint {
    /// Parse and require an absolute URL.
    pub fn parse(endpoint: &str) -> Result<Self, FetchError> {
        let url = Url::parse(endpoint).map_err(|e| FetchError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(FetchError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "not a base URL".to_string(),
            });
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Reachability for FixedEndpoint {
    fn open(&self, _: &dyn Cluster, _: &str, _: &StoreSettings) -> Result<StoreRoute, FetchError> {
        Ok(StoreRoute::new(self.url.clone()))
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.url)
    }
}

/// The store service's cluster IP; only works from inside the cluster network.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl Reachability for Direct {
    fn open(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        store: &StoreSettings,
    ) -> Result<StoreRoute, FetchError> {
        let ip = cluster
            .service_cluster_ip(namespace, &store.service)
            .map_err(FetchError::Route)?;
        let url = http_url(&ip, store.http_port)?;
        debug!(%url, "using store cluster IP");
        Ok(StoreRoute::new(url))
    }

    fn describe(&self) -> String {
        "cluster IP".to_string()
    }
}

/// A `kubectl port-forward` to the store service on a local port.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tunneled;

impl Reachability for Tunneled {
    fn open(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        store: &StoreSettings,
    ) -> Result<StoreRoute, FetchError> {
        let guard = cluster
            .port_forward(namespace, &store.service, store.http_port)
            .map_err(FetchError::Route)?;
        let url = http_url("127.0.0.1", guard.local_port())?;
        debug!(%url, "using port-forward to store");
        Ok(StoreRoute::tunneled(url, guard))
    }

    fn describe(&self) -> String {
        "port-forward".to_string()
    }
}

/// Pick the strategy from the retrieval flags; an endpoint wins over both modes.
pub fn select(endpoint: Option<&str>, use_cluster_ip: bool) -> Result<Box<dyn Reachability>, FetchError> {
    match endpoint.filter(|e| !e.is_empty()) {
        Some(endpoint) => Ok(Box::new(FixedEndpoint::parse(endpoint)?)),
        None if use_cluster_ip => Ok(Box::new(Direct)),
        None => Ok(Box::new(Tunneled)),
    }
}

fn http_url(host: &str, port: u16) -> Result<Url, FetchError> {
    let raw = if host.contains(':') {
        format!("http://[{}]:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    };
    Url::parse(&raw).map_err(|e| FetchError::InvalidEndpoint {
        endpoint: raw,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    #[test]
    fn test_fixed_endpoint_requires_absolute_url() {
        assert!(FixedEndpoint::parse("http://127.0.0.1:8123").is_ok());
        assert!(FixedEndpoint::parse("https://clickhouse.example.com/").is_ok());
        for bad in ["127.0.0.1:8123", "clickhouse", "/relative/path", "mailto:x@y"] {
            assert!(
                matches!(FixedEndpoint::parse(bad), Err(FetchError::InvalidEndpoint { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_select_prefers_endpoint() {
        let r = select(Some("http://10.0.0.1:8123"), true).unwrap();
        assert!(r.describe().starts_with("endpoint"));
        assert_eq!(select(None, true).unwrap().describe(), "cluster IP");
        assert_eq!(select(None, false).unwrap().describe(), "port-forward");
        assert_eq!(select(Some(""), false).unwrap().describe(), "port-forward");
    }

    #[test]
    fn test_direct_uses_cluster_ip() {
        let store = StoreSettings::default();
        let cluster = MockCluster::new().with_service_ip(&store.service, "10.96.0.15");
        let route = Direct.open(&cluster, "flow-visibility", &store).unwrap();
        assert_eq!(route.base_url.as_str(), "http://10.96.0.15:8123/");
        assert!(!route.is_tunneled());
    }

    #[test]
    fn test_direct_ipv6_cluster_ip() {
        let store = StoreSettings::default();
        let cluster = MockCluster::new().with_service_ip(&store.service, "fd00::10");
        let route = Direct.open(&cluster, "flow-visibility", &store).unwrap();
        assert_eq!(route.base_url.as_str(), "http://[fd00::10]:8123/");
    }

    #[test]
    fn test_direct_missing_service() {
        let store = StoreSettings::default();
        let cluster = MockCluster::new();
        assert!(matches!(
            Direct.open(&cluster, "flow-visibility", &store),
            Err(FetchError::Route(_))
        ));
    }

    #[test]
    fn test_tunnel_released_on_drop() {
        let store = StoreSettings::default();
        let cluster = MockCluster::new().with_forward_port(41234);
        let route = Tunneled.open(&cluster, "flow-visibility", &store).unwrap();

        assert_eq!(route.base_url.as_str(), "http://127.0.0.1:41234/");
        assert!(route.is_tunneled());
        assert_eq!(cluster.open_tunnels(), 1);

        drop(route);
        assert_eq!(cluster.open_tunnels(), 0);
        assert_eq!(cluster.tunnels_opened(), 1);
    }
}
