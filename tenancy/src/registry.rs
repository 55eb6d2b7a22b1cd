//! Tenant Registry
//!
//! Authoritative mapping from external tenant ids (and alternate hostnames) to
//! immutable [`TenantDescriptor`]s.
//!
//! The registry is built once during bootstrap and never mutated afterwards, so
//! lookups take no locks. Building happens in two steps because replica aliases
//! are only known once the [`ConnectionRegistrar`] has run:
//!
//! ```text
//! TenantRegistry::build(tenants)          ids, primary aliases, hostnames
//!     -> ConnectionRegistrar::register    replica aliases
//!     -> TenantRegistry::attach_replicas  descriptors complete
//! ```

use crate::config::TenantConfig;
use crate::errors::{ConfigurationError, NotFoundError};
use crate::registrar::ConnectionRegistrar;
use crate::types::TenantDescriptor;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

const ALIAS_SEPARATOR: char = '_';

/// Derives the primary connection alias for a tenant id. Every character that
/// is not ASCII alphanumeric becomes `_`.
pub fn normalize_alias(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ALIAS_SEPARATOR {
                c
            } else {
                ALIAS_SEPARATOR
            }
        })
        .collect()
}

/// Canonical form of a hostname: trimmed, lowercased, no trailing dot.
pub fn normalize_hostname(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Debug)]
pub struct TenantRegistry {
    tenants: IndexMap<String, Arc<TenantDescriptor>>,
    hostnames: HashMap<String, String>,
    // Replica counts from configuration, checked against the registrar.
    replica_counts: HashMap<String, usize>,
}

impl TenantRegistry {
    pub fn build(configs: &IndexMap<String, TenantConfig>) -> Result<Self, ConfigurationError> {
        let mut tenants = IndexMap::with_capacity(configs.len());
        let mut by_alias: HashMap<String, &str> = HashMap::with_capacity(configs.len());
        let mut hostnames: HashMap<String, String> = HashMap::new();
        let mut replica_counts = HashMap::with_capacity(configs.len());

        for (id, config) in configs {
            if id.is_empty() {
                return Err(ConfigurationError::EmptyTenantId);
            }

            let alias = normalize_alias(id);
            if let Some(first) = by_alias.insert(alias.clone(), id) {
                return Err(ConfigurationError::AliasCollision {
                    alias,
                    first: first.to_string(),
                    second: id.clone(),
                });
            }

            let mut own_hostnames = Vec::with_capacity(config.aliases.len());
            for hostname in config.aliases.iter().map(|h| normalize_hostname(h)) {
                match hostnames.get(&hostname) {
                    Some(owner) if owner != id => {
                        return Err(ConfigurationError::HostnameConflict {
                            hostname,
                            first: owner.clone(),
                            second: id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        hostnames.insert(hostname.clone(), id.clone());
                        own_hostnames.push(hostname);
                    }
                }
            }

            let descriptor =
                TenantDescriptor::new(id.clone(), alias).with_alt_hostnames(own_hostnames);
            replica_counts.insert(id.clone(), config.replicas.len());
            tenants.insert(id.clone(), Arc::new(descriptor));
        }

        tracing::debug!(
            tenants = tenants.len(),
            hostnames = hostnames.len(),
            "tenant registry built"
        );

        Ok(TenantRegistry {
            tenants,
            hostnames,
            replica_counts,
        })
    }

    /// Completes every descriptor with the replica aliases computed by the
    /// registrar. Must run before the registry is shared.
    pub fn attach_replicas(
        mut self,
        registrar: &ConnectionRegistrar,
    ) -> Result<Self, ConfigurationError> {
        for (id, descriptor) in self.tenants.iter_mut() {
            let replicas = registrar.get_replica_aliases(id).to_vec();
            let expected = self.replica_counts.get(id).copied().unwrap_or_default();
            if replicas.len() != expected {
                return Err(ConfigurationError::ReplicaCountMismatch {
                    tenant: id.clone(),
                    expected,
                    actual: replicas.len(),
                });
            }

            let completed = (**descriptor).clone().with_replica_aliases(replicas);
            *descriptor = Arc::new(completed);
        }

        Ok(self)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Arc<TenantDescriptor>, NotFoundError> {
        self.tenants
            .get(id)
            .cloned()
            .ok_or_else(|| NotFoundError::TenantId(id.to_string()))
    }

    /// Resolves an alternate hostname to its tenant's descriptor. Matching
    /// ignores ASCII case and a trailing dot.
    pub fn get_by_alt_hostname(&self, name: &str) -> Result<Arc<TenantDescriptor>, NotFoundError> {
        self.hostnames
            .get(&normalize_hostname(name))
            .and_then(|id| self.tenants.get(id))
            .cloned()
            .ok_or_else(|| NotFoundError::Hostname(name.to_string()))
    }

    /// Tenant ids in configuration order.
    pub fn tenant_ids(&self) -> impl Iterator<Item = &str> {
        self.tenants.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<TenantDescriptor>> {
        self.tenants.values()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{tenant, tenants};

    #[test]
    fn test_normalize_alias() {
        assert_eq!(normalize_alias("tenant.a-b"), "tenant_a_b");
        assert_eq!(normalize_alias("acme"), "acme");
        assert_eq!(normalize_alias("a b/c"), "a_b_c");
        assert_eq!(normalize_alias("already_ok_1"), "already_ok_1");
    }

    #[test]
    fn test_lookup_by_id_matches_direct_construction() {
        let registry = TenantRegistry::build(&tenants([("tenant.a-b", tenant(0, &[]))])).unwrap();

        let resolved = registry.get_by_id("tenant.a-b").unwrap();
        assert_eq!(*resolved, TenantDescriptor::new("tenant.a-b", "tenant_a_b"));
        assert_eq!(resolved.primary_alias(), "tenant_a_b");
    }

    #[test]
    fn test_unknown_id_leaves_registry_unchanged() {
        let registry = TenantRegistry::build(&tenants([
            ("t1", tenant(0, &["brand.com"])),
            ("t2", tenant(0, &[])),
        ]))
        .unwrap();

        assert_eq!(
            registry.get_by_id("ghost"),
            Err(NotFoundError::TenantId("ghost".into()))
        );

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tenant_ids().collect::<Vec<_>>(), vec!["t1", "t2"]);
        assert!(registry.get_by_id("t1").is_ok());
        assert!(registry.get_by_alt_hostname("brand.com").is_ok());
    }

    #[test]
    fn test_alt_hostname_resolves_to_same_descriptor() {
        let registry = TenantRegistry::build(&tenants([
            ("t1", tenant(0, &["brand.com", "Shop.Brand.com"])),
            ("t2", tenant(0, &[])),
        ]))
        .unwrap();

        let by_host = registry.get_by_alt_hostname("brand.com").unwrap();
        let by_id = registry.get_by_id("t1").unwrap();
        assert!(Arc::ptr_eq(&by_host, &by_id));
        assert_eq!(by_host, by_id);

        // Hostnames are case-insensitive
        let upper = registry.get_by_alt_hostname("SHOP.brand.com.").unwrap();
        assert!(Arc::ptr_eq(&upper, &by_id));

        assert_eq!(
            registry.get_by_alt_hostname("other.com"),
            Err(NotFoundError::Hostname("other.com".into()))
        );
        // Tenant ids are not hostnames
        assert!(registry.get_by_alt_hostname("t2").is_err());
    }

    #[test]
    fn test_build_errors() {
        // Two ids normalizing to the same alias
        assert_eq!(
            TenantRegistry::build(&tenants([("a.b", tenant(0, &[])), ("a-b", tenant(0, &[]))]))
                .unwrap_err(),
            ConfigurationError::AliasCollision {
                alias: "a_b".into(),
                first: "a.b".into(),
                second: "a-b".into(),
            }
        );

        // A hostname claimed by two tenants
        assert_eq!(
            TenantRegistry::build(&tenants([
                ("t1", tenant(0, &["brand.com"])),
                ("t2", tenant(0, &["BRAND.com"])),
            ]))
            .unwrap_err(),
            ConfigurationError::HostnameConflict {
                hostname: "brand.com".into(),
                first: "t1".into(),
                second: "t2".into(),
            }
        );

        // Repeating a hostname within one tenant is harmless
        let registry =
            TenantRegistry::build(&tenants([("t1", tenant(0, &["brand.com", "brand.com"]))]))
                .unwrap();
        assert_eq!(registry.get_by_id("t1").unwrap().alt_hostnames().len(), 1);

        assert_eq!(
            TenantRegistry::build(&tenants([("", tenant(0, &[]))])).unwrap_err(),
            ConfigurationError::EmptyTenantId
        );
    }

    #[test]
    fn test_attach_replicas() {
        let configs = tenants([("t1", tenant(2, &[])), ("t2", tenant(0, &[]))]);
        let registrar = ConnectionRegistrar::new("infra", [])
            .register(&configs, &Default::default())
            .unwrap();

        let registry = TenantRegistry::build(&configs)
            .unwrap()
            .attach_replicas(&registrar)
            .unwrap();

        assert_eq!(
            registry.get_by_id("t1").unwrap().replica_aliases(),
            ["t1_replica_1", "t1_replica_2"]
        );
        assert!(registry.get_by_id("t2").unwrap().replica_aliases().is_empty());

        // A registrar built from different configuration is rejected
        let other = tenants([("t1", tenant(1, &[])), ("t2", tenant(0, &[]))]);
        let mismatched = ConnectionRegistrar::new("infra", [])
            .register(&other, &Default::default())
            .unwrap();
        assert_eq!(
            TenantRegistry::build(&configs)
                .unwrap()
                .attach_replicas(&mismatched)
                .unwrap_err(),
            ConfigurationError::ReplicaCountMismatch {
                tenant: "t1".into(),
                expected: 2,
                actual: 1,
            }
        );
    }
}
