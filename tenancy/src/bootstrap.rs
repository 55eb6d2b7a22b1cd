//! Bootstrap Sequencer
//!
//! Builds a ready [`Tenancy`] from configuration. Stages run strictly in
//! order, each one completing before the next starts:
//!
//! 1. `RegistryBuild` discovers the tenant set.
//! 2. `ConnectionRegistrarRegister` registers one primary and its replicas per
//!    tenant, then completes the registry descriptors with replica aliases.
//! 3. `ScheduleFanOut` duplicates per-tenant schedules over the registered
//!    tenants.
//! 4. Any extra [`Initializer`]s, in the order given.
//!
//! The first failing stage aborts the sequence. A `Tenancy` value only exists
//! once every stage has succeeded, so partially initialized state is never
//! observable.

use crate::config::Config;
use crate::context::TenantContext;
use crate::errors::{BootstrapError, ConfigurationError};
use crate::history::RoutingDecision;
use crate::metrics_defs::{BOOTSTRAP_DURATION, CONNECTIONS_REGISTERED, TENANTS_REGISTERED};
use crate::registrar::ConnectionRegistrar;
use crate::registry::TenantRegistry;
use crate::router::{DatabaseRouter, ModelCategories};
use crate::schedule::{Schedule, fan_out};
use crate::types::{Alias, ConnectionRole, DataCategory};
use serde::Serialize;
use shared::{gauge, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    RegistryBuild,
    ConnectionRegistrarRegister,
    ScheduleFanOut,
    Initializer(&'static str),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::RegistryBuild => write!(f, "registry_build"),
            Stage::ConnectionRegistrarRegister => write!(f, "connection_registrar_register"),
            Stage::ScheduleFanOut => write!(f, "schedule_fan_out"),
            Stage::Initializer(name) => write!(f, "initializer:{name}"),
        }
    }
}

/// A downstream bootstrap stage. Runs after every connection is registered
/// and before the tenancy is handed out.
pub trait Initializer: Send {
    fn name(&self) -> &'static str;

    fn run(&mut self, tenancy: &Tenancy) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// One line of a migration plan.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MigrationTarget {
    pub alias: Alias,
    pub tenant: Option<String>,
    pub role: Option<ConnectionRole>,
    pub allowed: bool,
}

/// Fully bootstrapped tenancy state. Shared read-only for the rest of the
/// process lifetime.
pub struct Tenancy {
    registry: Arc<TenantRegistry>,
    registrar: Arc<ConnectionRegistrar>,
    router: Arc<DatabaseRouter>,
    schedules: Vec<Schedule>,
}

impl Tenancy {
    pub fn bootstrap(
        config: &Config,
        initializers: Vec<Box<dyn Initializer>>,
    ) -> Result<Self, BootstrapError> {
        let started = Instant::now();
        config.validate()?;

        let registry = run_stage(Stage::RegistryBuild, || {
            TenantRegistry::build(&config.tenants).map_err(BootstrapError::from)
        })?;

        let (registry, registrar) = run_stage(Stage::ConnectionRegistrarRegister, || {
            let mut registrar = ConnectionRegistrar::new(
                config.infra.alias.clone(),
                config.reserved_aliases.clone(),
            );
            if let Some(params) = &config.infra.params {
                registrar = registrar.with_infra_params(params.clone());
            }
            let registrar = registrar.register(&config.tenants, &config.template)?;
            let registry = registry.attach_replicas(&registrar)?;
            Ok::<_, BootstrapError>((registry, registrar))
        })?;

        let schedules = run_stage(Stage::ScheduleFanOut, || {
            fan_out(&config.schedules, &registry, &registrar).map_err(|err| {
                BootstrapError::Initializer {
                    stage: "schedule_fan_out",
                    source: Box::new(err),
                }
            })
        })?;

        let base = registry
            .get_by_id(&config.default_tenant)
            .map_err(|_| ConfigurationError::UnknownDefaultTenant(config.default_tenant.clone()))?;

        let registrar = Arc::new(registrar);
        let router = DatabaseRouter::new(
            registrar.clone(),
            TenantContext::new(base, config.strict),
            ModelCategories::new(config.infra_models.iter().cloned()),
            config.skip_migrate.iter().cloned(),
            config.history_capacity,
        );

        let tenancy = Tenancy {
            registry: Arc::new(registry),
            registrar,
            router: Arc::new(router),
            schedules,
        };

        for mut initializer in initializers {
            let name = initializer.name();
            run_stage(Stage::Initializer(name), || {
                initializer
                    .run(&tenancy)
                    .map_err(|source| BootstrapError::Initializer {
                        stage: name,
                        source,
                    })
            })?;
        }

        gauge!(TENANTS_REGISTERED).set(tenancy.registry.len() as f64);
        gauge!(CONNECTIONS_REGISTERED).set(tenancy.registrar.aliases().count() as f64);
        histogram!(BOOTSTRAP_DURATION).record(started.elapsed().as_secs_f64());

        tracing::info!(
            tenants = tenancy.registry.len(),
            connections = tenancy.registrar.aliases().count(),
            schedules = tenancy.schedules.len(),
            default_tenant = %config.default_tenant,
            strict = config.strict,
            "tenancy ready"
        );

        Ok(tenancy)
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn registrar(&self) -> &Arc<ConnectionRegistrar> {
        &self.registrar
    }

    pub fn router(&self) -> &Arc<DatabaseRouter> {
        &self.router
    }

    pub fn context(&self) -> &TenantContext {
        self.router.context()
    }

    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    pub fn list_tenant_ids(&self) -> Vec<String> {
        self.registry.tenant_ids().map(String::from).collect()
    }

    pub fn get_replica_aliases(&self, tenant_id: &str) -> &[Alias] {
        self.registrar.get_replica_aliases(tenant_id)
    }

    pub fn is_reserved_alias(&self, alias: &str) -> bool {
        self.registrar.is_reserved_alias(alias)
    }

    pub fn routing_history(&self) -> Vec<RoutingDecision> {
        self.router.history().snapshot()
    }

    pub fn clear_routing_history(&self) {
        self.router.history().clear()
    }

    /// Every known alias, registered ones first in registration order, then
    /// reserved aliases without a definition, with whether data of `category`
    /// may be migrated onto it.
    pub fn migration_plan(&self, category: DataCategory) -> Vec<MigrationTarget> {
        let registered = self.registrar.aliases().filter_map(|alias| {
            let definition = self.registrar.get(alias)?;
            Some(MigrationTarget {
                alias: alias.to_string(),
                tenant: definition.tenant.clone(),
                role: Some(definition.role),
                allowed: self.router.allow_migrate(alias, category),
            })
        });

        let reserved = self
            .registrar
            .reserved_aliases()
            .into_iter()
            .filter(|alias| self.registrar.get(alias).is_none())
            .map(|alias| MigrationTarget {
                alias: alias.to_string(),
                tenant: None,
                role: None,
                allowed: self.router.allow_migrate(alias, category),
            });

        registered.chain(reserved).collect()
    }
}

fn run_stage<T, F>(stage: Stage, f: F) -> Result<T, BootstrapError>
where
    F: FnOnce() -> Result<T, BootstrapError>,
{
    let started = Instant::now();
    match f() {
        Ok(value) => {
            tracing::debug!(%stage, elapsed = ?started.elapsed(), "bootstrap stage complete");
            Ok(value)
        }
        Err(err) => {
            tracing::error!(%stage, error = %err, "bootstrap stage failed, aborting");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DuplicateAliasError;
    use crate::testutils::{params, tenant, tenants};
    use serde_json::json;
    use std::sync::Mutex;

    fn config() -> Config {
        serde_yaml::from_str(
            r#"
default_tenant: t2
template:
    ENGINE: postgresql
    HOST: db
infra:
    alias: scheduler
tenants:
    t1:
        NAME: t1
        replicas:
            - HOST: r1
            - HOST: r2
        aliases:
            - brand.com
    t2:
        NAME: t2
schedules:
    - name: cleanup
      task: tasks.cleanup
      every_secs: 60
    - name: beat
      task: tasks.beat
      every_secs: 5
      per_tenant: false
"#,
        )
        .unwrap()
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Initializer for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(
            &mut self,
            tenancy: &Tenancy,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            // Registration is complete by the time initializers run
            assert_eq!(tenancy.get_replica_aliases("t1").len(), 2);
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err("initializer failed".into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_bootstrap_scenario() {
        let tenancy = Tenancy::bootstrap(&config(), Vec::new()).unwrap();

        assert_eq!(tenancy.list_tenant_ids(), vec!["t1", "t2"]);
        assert_eq!(
            tenancy.get_replica_aliases("t1"),
            ["t1_replica_1", "t1_replica_2"]
        );
        assert!(tenancy.get_replica_aliases("t2").is_empty());
        assert!(tenancy.is_reserved_alias("scheduler"));
        assert!(!tenancy.is_reserved_alias("t1"));

        // Descriptors carry the registrar's replica aliases
        let t1 = tenancy.registry().get_by_id("t1").unwrap();
        assert_eq!(t1.replica_aliases(), tenancy.get_replica_aliases("t1"));
        assert_eq!(tenancy.registry().get_by_alt_hostname("brand.com").unwrap(), t1);

        assert_eq!(tenancy.context().base().id(), "t2");

        let names: Vec<_> = tenancy.schedules().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["t1:cleanup", "t2:cleanup", "beat"]);
    }

    #[test]
    fn test_scenario_routing() {
        let tenancy = Tenancy::bootstrap(&config(), Vec::new()).unwrap();
        let router = tenancy.router();
        let t1 = tenancy.registry().get_by_id("t1").unwrap();

        router.context().run_unit_sync(|| {
            let _guard = router.context().enter(t1).unwrap();

            let mut r1 = 0;
            let mut r2 = 0;
            for _ in 0..1000 {
                match router.choose_read(DataCategory::Tenant, None).unwrap().as_str() {
                    "t1_replica_1" => r1 += 1,
                    "t1_replica_2" => r2 += 1,
                    other => panic!("unexpected read alias {other}"),
                }
            }
            assert!((450..=550).contains(&r1), "r1 chosen {r1} times");
            assert!((450..=550).contains(&r2), "r2 chosen {r2} times");

            let writes = (0..1000)
                .filter(|_| router.choose_write(DataCategory::Tenant).unwrap() == "t1")
                .count();
            assert_eq!(writes, 1000);
        });

        tenancy.clear_routing_history();
        assert!(tenancy.routing_history().is_empty());
    }

    #[test]
    fn test_initializers_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let initializers: Vec<Box<dyn Initializer>> = vec![
            Box::new(Recorder {
                name: "first",
                log: log.clone(),
                fail: false,
            }),
            Box::new(Recorder {
                name: "second",
                log: log.clone(),
                fail: false,
            }),
        ];

        Tenancy::bootstrap(&config(), initializers).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_failing_initializer_aborts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let initializers: Vec<Box<dyn Initializer>> = vec![
            Box::new(Recorder {
                name: "broken",
                log: log.clone(),
                fail: true,
            }),
            Box::new(Recorder {
                name: "never",
                log: log.clone(),
                fail: false,
            }),
        ];

        let err = Tenancy::bootstrap(&config(), initializers).err().unwrap();
        assert!(matches!(err, BootstrapError::Initializer { stage: "broken", .. }));
        assert_eq!(*log.lock().unwrap(), vec!["broken"]);
    }

    #[test]
    fn test_configuration_errors_abort() {
        let mut config = config();
        config.tenants.insert("t.1".into(), tenant(0, &["brand.com"]));
        let err = Tenancy::bootstrap(&config, Vec::new()).err().unwrap();
        assert!(matches!(
            err,
            BootstrapError::Configuration(ConfigurationError::HostnameConflict { .. })
        ));

        let mut config = self::config();
        config.default_tenant = "ghost".into();
        let err = Tenancy::bootstrap(&config, Vec::new()).err().unwrap();
        assert!(matches!(
            err,
            BootstrapError::Configuration(ConfigurationError::UnknownDefaultTenant(_))
        ));
    }

    #[test]
    fn test_duplicate_alias_aborts() {
        let mut config = config();
        config.tenants.insert("scheduler".into(), tenant(0, &[]));
        let err = Tenancy::bootstrap(&config, Vec::new()).err().unwrap();
        assert!(matches!(
            err,
            BootstrapError::DuplicateAlias(DuplicateAliasError::Reserved { .. })
        ));
    }

    #[test]
    fn test_migration_plan() {
        let mut config = config();
        config.infra.params = Some(params(json!({"HOST": "infra-db"})));
        config.reserved_aliases = vec!["audit".into()];
        config.skip_migrate = vec!["t1_replica_2".into()];
        config.tenants = tenants([
            ("t1", {
                let mut t1 = tenant(2, &[]);
                t1.params = params(json!({"NAME": "t1"}));
                t1
            }),
            ("t2", tenant(0, &[])),
        ]);
        let tenancy = Tenancy::bootstrap(&config, Vec::new()).unwrap();

        let plan = tenancy.migration_plan(DataCategory::Infra);
        let summary: Vec<_> = plan.iter().map(|t| (t.alias.as_str(), t.allowed)).collect();
        assert_eq!(
            summary,
            vec![
                ("scheduler", true),
                ("t1", false),
                ("t1_replica_1", false),
                ("t1_replica_2", false),
                ("t2", false),
                ("audit", true),
            ]
        );
        assert_eq!(plan[1].tenant.as_deref(), Some("t1"));
        assert_eq!(plan[2].role, Some(ConnectionRole::Replica));
        assert_eq!(plan[5].role, None);

        let plan = tenancy.migration_plan(DataCategory::Tenant);
        let allowed: Vec<_> = plan
            .iter()
            .filter(|t| t.allowed)
            .map(|t| t.alias.as_str())
            .collect();
        assert_eq!(allowed, vec!["scheduler", "t1", "t1_replica_1", "t2", "audit"]);
    }
}
