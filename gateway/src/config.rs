use serde::Deserialize;
use thiserror::Error;

fn default_tenant_header() -> String {
    "x-tenant-id".into()
}

fn default_cache_size() -> u64 {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Invalid tenant header name: {0}")]
    InvalidTenantHeader(String),

    #[error("Hostname cache size cannot be 0")]
    EmptyHostnameCache,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Caching of hostname -> tenant resolutions done by the HTTP adapter.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HostnameCache {
    #[serde(default = "default_cache_size")]
    pub size: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for HostnameCache {
    fn default() -> Self {
        HostnameCache {
            size: default_cache_size(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for tenant-scoped requests
    pub listener: Listener,
    /// Listener for health, readiness and routing diagnostics
    pub admin_listener: Listener,
    /// Request header carrying the tenant id. Takes precedence over the
    /// request hostname.
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,
    #[serde(default)]
    pub hostname_cache: HostnameCache,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if http::HeaderName::from_bytes(self.tenant_header.as_bytes()).is_err() {
            return Err(ValidationError::InvalidTenantHeader(
                self.tenant_header.clone(),
            ));
        }

        if self.hostname_cache.size == 0 {
            return Err(ValidationError::EmptyHostnameCache);
        }

        Ok(())
    }
}
