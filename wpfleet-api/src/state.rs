//! Shared, cloneable application state injected into every axum handler.

use crate::adapters::{AppDbOps, ArchiveOps, ContainerOps, EdgeConfigOps};
use crate::config::Config;
use crate::orchestrate::DomainManager;
use crate::store::Store;
use std::sync::Arc;
use wpfleet_network::dns::DnsResolve;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    pub container: Arc<dyn ContainerOps>,
    pub edge: Arc<dyn EdgeConfigOps>,
    pub appdb: Arc<dyn AppDbOps>,
    pub archive: Arc<dyn ArchiveOps>,
    pub dns: Arc<dyn DnsResolve>,
    pub domain_manager: Arc<DomainManager>,
}
