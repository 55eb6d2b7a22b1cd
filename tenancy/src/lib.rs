//! Multi-tenant execution context propagation and database routing.
//!
//! A [`Tenancy`] is bootstrapped once from [`config::Config`]. Boundary
//! adapters resolve a tenant through its [`TenantRegistry`] and push it with
//! [`TenantContext::scope`], and code further down the call chain asks the
//! [`DatabaseRouter`] which connection alias to use.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod errors;
pub mod history;
mod merge;
pub mod metrics_defs;
pub mod registrar;
pub mod registry;
pub mod router;
pub mod schedule;
pub mod types;

#[cfg(test)]
mod testutils;

pub use bootstrap::{Initializer, MigrationTarget, Stage, Tenancy};
pub use context::{ContextStack, StackToken, TenantContext, TenantGuard};
pub use errors::{
    BootstrapError, ConfigurationError, ContextError, DuplicateAliasError, NotFoundError,
};
pub use history::{RoutingDecision, RoutingHistory};
pub use registrar::ConnectionRegistrar;
pub use registry::{TenantRegistry, normalize_alias, normalize_hostname};
pub use router::{DatabaseRouter, ModelCategories};
pub use types::{
    Alias, ConnectionDefinition, ConnectionParams, ConnectionRole, DataCategory, Operation,
    TenantDescriptor,
};
