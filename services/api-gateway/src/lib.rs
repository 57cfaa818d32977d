//! Edge gateway for the IP inventory suite
//!
//! Every admin UI request enters here and is forwarded to one of three
//! upstreams: the auth service (which also owns user records), the IP
//! inventory service, or the audit query service. Handlers stay thin —
//! build the upstream path, call the shared [`ServiceClient`], normalize
//! the outcome.

use ipledger::prelude::*;

pub mod handlers;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Client for the authentication service
    pub auth: ServiceClient,

    /// Client for the IP inventory service
    pub inventory: ServiceClient,

    /// Client for the audit query service
    pub audit: ServiceClient,

    /// Expose internal error detail in 500 responses
    pub debug: bool,
}

impl AppState {
    /// Build one client per upstream from the gateway configuration
    pub fn from_config(gateway: &GatewayConfig, debug: bool) -> Result<Self> {
        let timeout = gateway.timeout();

        Ok(Self {
            auth: ServiceClient::new(gateway.auth_url.clone(), timeout)?,
            inventory: ServiceClient::new(gateway.inventory_url.clone(), timeout)?,
            audit: ServiceClient::new(gateway.audit_url.clone(), timeout)?,
            debug,
        })
    }
}
