use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;
use tracing::{debug, warn};

/// `DnsResolve` — the narrow capability the domain manager and lifecycle
/// validation need: resolve a hostname's A records.
#[async_trait]
pub trait DnsResolve: Send + Sync {
    async fn lookup_a(&self, domain: &str) -> anyhow::Result<Vec<Ipv4Addr>>;
}

/// Real resolver, backed by the system's configured DNS servers.
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> anyhow::Result<Self> {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolve for SystemResolver {
    async fn lookup_a(&self, domain: &str) -> anyhow::Result<Vec<Ipv4Addr>> {
        debug!(domain, "resolving A records");
        match self.resolver.ipv4_lookup(domain).await {
            Ok(lookup) => Ok(lookup.iter().map(|r| r.0).collect()),
            Err(e) => {
                warn!(domain, error = %e, "A record lookup failed");
                Ok(Vec::new())
            }
        }
    }
}

/// In-memory resolver for tests: a fixed map of domain -> A records.
#[derive(Default)]
pub struct FakeResolver {
    records: RwLock<HashMap<String, Vec<Ipv4Addr>>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, domain: &str, ips: Vec<Ipv4Addr>) {
        self.records.write().unwrap().insert(domain.to_string(), ips);
    }
}

#[async_trait]
impl DnsResolve for FakeResolver {
    async fn lookup_a(&self, domain: &str) -> anyhow::Result<Vec<Ipv4Addr>> {
        Ok(self.records.read().unwrap().get(domain).cloned().unwrap_or_default())
    }
}
