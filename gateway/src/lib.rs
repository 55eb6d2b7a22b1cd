//! Boundary adapters that carry the active tenant into and across units of
//! work: an HTTP middleware resolving the tenant of every request, and an
//! interceptor pair propagating it through the task queue.

pub mod admin_service;
pub mod config;
pub mod errors;
mod hostname_cache;
pub mod metrics_defs;
pub mod middleware;
pub mod probe_service;
pub mod resolver;
pub mod tasks;

#[cfg(test)]
mod testutils;

use admin_service::AdminService;
use errors::GatewayError;
use middleware::TenantService;
use probe_service::ProbeService;
use resolver::TenantResolver;
use shared::http::run_http_service;
use std::sync::Arc;
use tenancy::Tenancy;

/// Serves the tenant listener and the admin listener until either fails.
pub async fn run(config: config::Config, tenancy: Arc<Tenancy>) -> Result<(), GatewayError> {
    config.validate()?;

    let resolver = Arc::new(TenantResolver::new(tenancy.registry().clone(), &config)?);
    let tenant_service = TenantService::new(
        ProbeService::new(tenancy.router().clone()),
        resolver,
        tenancy.context().clone(),
    );
    // Bootstrap has completed by the time a Tenancy exists
    let admin_service = AdminService::new(tenancy, || true);

    let tenant_task = run_http_service(&config.listener.host, config.listener.port, tenant_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(tenant_task, admin_task)?;
    Ok(())
}
