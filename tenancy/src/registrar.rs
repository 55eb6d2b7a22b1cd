//! Connection Registrar
//!
//! Owns the `alias -> connection definition` map. Every tenant gets one
//! primary built from the template and its own overrides, plus one replica per
//! entry in its `replicas` list built from the primary and that entry:
//!
//! ```text
//! template ⊕ tenant fields           -> "acme"              (primary)
//!   primary ⊕ replicas[0]            -> "acme_replica_1"    (replica of "acme")
//!   primary ⊕ replicas[1]            -> "acme_replica_2"    (replica of "acme")
//! ```
//!
//! Reserved aliases belong to infrastructure stores and can never be taken by
//! a tenant. The registrar is immutable once registration returns.

use crate::config::TenantConfig;
use crate::errors::DuplicateAliasError;
use crate::merge::deep_merge;
use crate::registry::normalize_alias;
use crate::types::{Alias, ConnectionDefinition, ConnectionParams, ConnectionRole};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

pub fn replica_alias(primary_alias: &str, index: usize) -> Alias {
    format!("{primary_alias}_replica_{}", index + 1)
}

#[derive(Debug)]
pub struct ConnectionRegistrar {
    infra_alias: Alias,
    reserved: HashSet<Alias>,
    connections: IndexMap<Alias, ConnectionDefinition>,
    // tenant id -> replica aliases, in configuration order
    replicas: HashMap<String, Vec<Alias>>,
}

impl ConnectionRegistrar {
    /// Creates an empty registrar. `infra_alias` is always reserved, together
    /// with any extra `reserved` aliases.
    pub fn new<A, R>(infra_alias: A, reserved: R) -> Self
    where
        A: Into<Alias>,
        R: IntoIterator<Item = Alias>,
    {
        let infra_alias = infra_alias.into();
        let mut reserved: HashSet<Alias> = reserved.into_iter().collect();
        reserved.insert(infra_alias.clone());

        ConnectionRegistrar {
            infra_alias,
            reserved,
            connections: IndexMap::new(),
            replicas: HashMap::new(),
        }
    }

    /// Registers a definition for the infrastructure store itself.
    pub fn with_infra_params(mut self, params: ConnectionParams) -> Self {
        self.connections.insert(
            self.infra_alias.clone(),
            ConnectionDefinition {
                alias: self.infra_alias.clone(),
                role: ConnectionRole::Primary,
                parent_alias: None,
                tenant: None,
                params,
            },
        );
        self
    }

    /// Registers a primary and its replicas for every tenant.
    ///
    /// Consumes the registrar so that a failed registration leaves nothing
    /// behind to be used.
    pub fn register(
        mut self,
        tenants: &IndexMap<String, TenantConfig>,
        template: &ConnectionParams,
    ) -> Result<Self, DuplicateAliasError> {
        for (tenant_id, config) in tenants {
            let primary_alias = normalize_alias(tenant_id);
            let primary_params = deep_merge(template, &config.params);

            let replica_aliases: Vec<Alias> = (0..config.replicas.len())
                .map(|index| replica_alias(&primary_alias, index))
                .collect();

            let mut definitions = Vec::with_capacity(1 + config.replicas.len());
            for (alias, overrides) in replica_aliases.iter().zip(&config.replicas) {
                definitions.push(ConnectionDefinition {
                    alias: alias.clone(),
                    role: ConnectionRole::Replica,
                    parent_alias: Some(primary_alias.clone()),
                    tenant: Some(tenant_id.clone()),
                    params: deep_merge(&primary_params, overrides),
                });
            }
            definitions.insert(
                0,
                ConnectionDefinition {
                    alias: primary_alias,
                    role: ConnectionRole::Primary,
                    parent_alias: None,
                    tenant: Some(tenant_id.clone()),
                    params: primary_params,
                },
            );

            for definition in definitions {
                self.insert(definition)?;
            }

            tracing::debug!(
                tenant = %tenant_id,
                replicas = replica_aliases.len(),
                "registered tenant connections"
            );
            self.replicas.insert(tenant_id.clone(), replica_aliases);
        }

        Ok(self)
    }

    fn insert(&mut self, definition: ConnectionDefinition) -> Result<(), DuplicateAliasError> {
        let tenant = definition.tenant.clone().unwrap_or_default();

        if self.reserved.contains(&definition.alias) {
            return Err(DuplicateAliasError::Reserved {
                alias: definition.alias,
                tenant,
            });
        }

        if self.connections.contains_key(&definition.alias) {
            return Err(DuplicateAliasError::Registered {
                alias: definition.alias,
                tenant,
            });
        }

        self.connections.insert(definition.alias.clone(), definition);
        Ok(())
    }

    /// Replica aliases of a tenant, empty if it has none or is unknown.
    pub fn get_replica_aliases(&self, tenant_id: &str) -> &[Alias] {
        self.replicas
            .get(tenant_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The owning primary alias if `alias` is a replica.
    pub fn get_parent(&self, alias: &str) -> Option<&str> {
        self.connections
            .get(alias)
            .and_then(|definition| definition.parent_alias.as_deref())
    }

    pub fn is_reserved_alias(&self, alias: &str) -> bool {
        self.reserved.contains(alias)
    }

    /// True for primaries and replicas owned by a tenant.
    pub fn is_tenant_alias(&self, alias: &str) -> bool {
        self.connections
            .get(alias)
            .is_some_and(|definition| definition.tenant.is_some())
    }

    pub fn infra_alias(&self) -> &str {
        &self.infra_alias
    }

    pub fn get(&self, alias: &str) -> Option<&ConnectionDefinition> {
        self.connections.get(alias)
    }

    /// Every registered alias, in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Reserved aliases, sorted.
    pub fn reserved_aliases(&self) -> Vec<&str> {
        let mut reserved: Vec<&str> = self.reserved.iter().map(String::as_str).collect();
        reserved.sort_unstable();
        reserved
    }
}
