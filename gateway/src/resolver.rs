//! Tenant resolution for inbound HTTP requests.
//!
//! A request names its tenant either explicitly through the tenant header or
//! implicitly through the hostname it was sent to. The header wins when both
//! are present. Unknown tenants are an error, never a silent fallback to the
//! default tenant.

use crate::config::{Config, ValidationError};
use crate::errors::GatewayError;
use crate::hostname_cache::HostnameCache;
use http::{HeaderName, Request};
use std::sync::Arc;
use std::time::Duration;
use tenancy::{NotFoundError, TenantDescriptor, TenantRegistry, normalize_hostname};

pub struct TenantResolver {
    registry: Arc<TenantRegistry>,
    header: HeaderName,
    hostnames: HostnameCache,
}

impl TenantResolver {
    pub fn new(registry: Arc<TenantRegistry>, config: &Config) -> Result<Self, ValidationError> {
        let header = HeaderName::from_bytes(config.tenant_header.as_bytes())
            .map_err(|_| ValidationError::InvalidTenantHeader(config.tenant_header.clone()))?;
        let hostnames = HostnameCache::new(
            config.hostname_cache.size,
            Duration::from_secs(config.hostname_cache.ttl_secs),
        );

        Ok(TenantResolver {
            registry,
            header,
            hostnames,
        })
    }

    pub fn resolve<B>(&self, request: &Request<B>) -> Result<Arc<TenantDescriptor>, GatewayError> {
        if let Some(value) = request.headers().get(&self.header) {
            let id = value
                .to_str()
                .map_err(|_| GatewayError::InvalidTenantHeader)?;
            return Ok(self.registry.get_by_id(id.trim())?);
        }

        let host = request_host(request).ok_or(GatewayError::MissingTenant)?;
        self.resolve_hostname(host)
    }

    pub fn resolve_hostname(&self, host: &str) -> Result<Arc<TenantDescriptor>, GatewayError> {
        let key = normalize_hostname(host);

        let cached = match self.hostnames.get(&key) {
            Some(cached) => cached,
            None => {
                let resolved = self.registry.get_by_alt_hostname(&key).ok();
                self.hostnames.insert(key.clone(), resolved.clone());
                resolved
            }
        };

        cached.ok_or_else(|| NotFoundError::Hostname(key).into())
    }
}

/// Hostname the request was addressed to, without the port.
fn request_host<B>(request: &Request<B>) -> Option<&str> {
    let host = request
        .headers()
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())?;

    let host = strip_port(host);
    (!host.is_empty()).then_some(host)
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        // Bare IPv6 addresses have colons but no port
        Some((name, port))
            if port.bytes().all(|b| b.is_ascii_digit())
                && (!name.contains(':') || name.ends_with(']')) =>
        {
            name
        }
        _ => host,
    }
}
