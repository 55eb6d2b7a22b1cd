use crate::errors::ConfigurationError;
use crate::types::ConnectionParams;
use indexmap::IndexMap;
use serde::Deserialize;

fn default_infra_alias() -> String {
    "infra".into()
}

fn default_history_capacity() -> usize {
    1024
}

fn default_per_tenant() -> bool {
    true
}

/// Per-tenant connection record.
///
/// Every key other than `replicas` and `aliases` is a connection field that
/// overrides the template.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TenantConfig {
    /// Override records, one per read replica. Each one is merged on top of
    /// the tenant's primary definition.
    #[serde(default)]
    pub replicas: Vec<ConnectionParams>,
    /// Alternate hostnames that resolve to this tenant.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub params: ConnectionParams,
}

/// The infrastructure store, used for data that is not owned by any tenant.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct InfraConfig {
    #[serde(default = "default_infra_alias")]
    pub alias: String,
    pub params: Option<ConnectionParams>,
}

impl Default for InfraConfig {
    fn default() -> Self {
        InfraConfig {
            alias: default_infra_alias(),
            params: None,
        }
    }
}

/// Periodic task template. Per-tenant schedules are duplicated once for every
/// registered tenant at boot.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    pub name: String,
    pub task: String,
    pub every_secs: u64,
    #[serde(default = "default_per_tenant")]
    pub per_tenant: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Tenant used when nothing has been pushed for the current unit.
    pub default_tenant: String,
    /// Fail instead of falling back to `default_tenant`.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub infra: InfraConfig,
    /// Connection fields shared by every tenant primary.
    #[serde(default)]
    pub template: ConnectionParams,
    pub tenants: IndexMap<String, TenantConfig>,
    /// Aliases that never receive migrations.
    #[serde(default)]
    pub skip_migrate: Vec<String>,
    /// Model labels whose data lives on the infrastructure store.
    #[serde(default)]
    pub infra_models: Vec<String>,
    /// Infrastructure aliases besides `infra.alias` that tenants may not use.
    #[serde(default)]
    pub reserved_aliases: Vec<String>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

impl Config {
    /// Structural checks that do not need the registry. Collisions between
    /// tenants are detected while the registry is built.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.tenants.is_empty() {
            return Err(ConfigurationError::NoTenants);
        }

        if self.tenants.keys().any(|id| id.is_empty()) {
            return Err(ConfigurationError::EmptyTenantId);
        }

        if !self.tenants.contains_key(&self.default_tenant) {
            return Err(ConfigurationError::UnknownDefaultTenant(
                self.default_tenant.clone(),
            ));
        }

        if self.infra.alias.is_empty() {
            return Err(ConfigurationError::EmptyInfraAlias);
        }

        if self.history_capacity == 0 {
            return Err(ConfigurationError::ZeroHistoryCapacity);
        }

        if let Some(schedule) = self.schedules.iter().find(|s| s.every_secs == 0) {
            return Err(ConfigurationError::ZeroScheduleInterval(
                schedule.name.clone(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
default_tenant: t1
template:
    ENGINE: postgresql
    HOST: db.internal
    PORT: 5432
    OPTIONS:
        sslmode: require
infra:
    alias: scheduler
    params:
        HOST: infra.internal
tenants:
    t1:
        NAME: t1_db
        replicas:
            - HOST: r1
            - HOST: r2
        aliases:
            - brand.com
    t2:
        NAME: t2_db
skip_migrate:
    - t2
infra_models:
    - beat.periodic_task
schedules:
    - name: cleanup
      task: tasks.cleanup
      every_secs: 60
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = serde_yaml::from_str(YAML).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.default_tenant, "t1");
        assert!(!config.strict);
        assert_eq!(config.infra.alias, "scheduler");
        assert_eq!(config.history_capacity, 1024);
        assert_eq!(config.template.get("PORT"), Some(&json!(5432)));

        // Tenant order follows the file
        let ids: Vec<_> = config.tenants.keys().cloned().collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let t1 = &config.tenants["t1"];
        assert_eq!(t1.replicas.len(), 2);
        assert_eq!(t1.replicas[1].get("HOST"), Some(&json!("r2")));
        assert_eq!(t1.aliases, vec!["brand.com"]);
        // replicas and aliases are not connection fields
        assert_eq!(t1.params.len(), 1);
        assert_eq!(t1.params.get("NAME"), Some(&json!("t1_db")));

        let t2 = &config.tenants["t2"];
        assert!(t2.replicas.is_empty());
        assert!(t2.aliases.is_empty());

        assert!(config.schedules[0].per_tenant);
    }

    #[test]
    fn test_validation_errors() {
        let base: Config = serde_yaml::from_str(YAML).unwrap();

        let mut config = base.clone();
        config.tenants.clear();
        assert_eq!(config.validate(), Err(ConfigurationError::NoTenants));

        let mut config = base.clone();
        config.default_tenant = "ghost".into();
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::UnknownDefaultTenant("ghost".into()))
        );

        let mut config = base.clone();
        config.tenants.insert("".into(), TenantConfig::default());
        assert_eq!(config.validate(), Err(ConfigurationError::EmptyTenantId));

        let mut config = base.clone();
        config.history_capacity = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroHistoryCapacity)
        );

        let mut config = base.clone();
        config.infra.alias = "".into();
        assert_eq!(config.validate(), Err(ConfigurationError::EmptyInfraAlias));

        let mut config = base;
        config.schedules[0].every_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroScheduleInterval("cleanup".into()))
        );
    }

    #[test]
    fn test_deserialization_errors() {
        // Missing tenants
        assert!(serde_yaml::from_str::<Config>("default_tenant: t1").is_err());

        // Replicas must be a list of records
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
default_tenant: t1
tenants:
    t1:
        replicas: r1
"#
            )
            .is_err()
        );
    }
}
