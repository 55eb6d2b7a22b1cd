//! Database Router
//!
//! Decides which connection alias an operation runs against:
//!
//! | data   | read                                 | write          |
//! |--------|--------------------------------------|----------------|
//! | infra  | infrastructure alias                 | infra alias    |
//! | tenant | random replica, or primary when none | primary alias  |
//!
//! The tenant is taken from the current execution unit's context. Writes
//! never target a replica, and infra data never targets a tenant alias.

use crate::context::TenantContext;
use crate::errors::ContextError;
use crate::history::{RoutingDecision, RoutingHistory};
use crate::metrics_defs::ROUTING_DECISION;
use crate::registrar::ConnectionRegistrar;
use crate::types::{Alias, DataCategory, Operation, TenantDescriptor};
use rand::Rng;
use shared::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

/// Maps model labels to the category of data they hold. Everything not
/// listed as infra is tenant data.
#[derive(Clone, Debug, Default)]
pub struct ModelCategories {
    infra_models: HashSet<String>,
}

impl ModelCategories {
    pub fn new<I>(infra_models: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        ModelCategories {
            infra_models: infra_models.into_iter().collect(),
        }
    }

    /// Looks up `model` (e.g. `"beat.periodic_task"`), falling back to its
    /// app label (`"beat"`) so a whole app can be declared infra.
    pub fn category_for(&self, model: &str) -> DataCategory {
        let app_label = model.split_once('.').map(|(app, _)| app);
        let is_infra = self.infra_models.contains(model)
            || app_label.is_some_and(|app| self.infra_models.contains(app));

        if is_infra {
            DataCategory::Infra
        } else {
            DataCategory::Tenant
        }
    }
}

fn pick_replica(replicas: &[Alias]) -> Option<&Alias> {
    if replicas.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..replicas.len());
    replicas.get(index)
}

pub struct DatabaseRouter {
    registrar: Arc<ConnectionRegistrar>,
    context: TenantContext,
    models: ModelCategories,
    skip_migrate: HashSet<Alias>,
    history: RoutingHistory,
}

impl DatabaseRouter {
    pub fn new<S>(
        registrar: Arc<ConnectionRegistrar>,
        context: TenantContext,
        models: ModelCategories,
        skip_migrate: S,
        history_capacity: usize,
    ) -> Self
    where
        S: IntoIterator<Item = Alias>,
    {
        DatabaseRouter {
            registrar,
            context,
            models,
            skip_migrate: skip_migrate.into_iter().collect(),
            history: RoutingHistory::new(history_capacity),
        }
    }

    /// Alias to read `category` data from.
    ///
    /// `tenant_override` routes this one read for another tenant without
    /// touching the context stack.
    pub fn choose_read(
        &self,
        category: DataCategory,
        tenant_override: Option<&TenantDescriptor>,
    ) -> Result<Alias, ContextError> {
        if category == DataCategory::Infra {
            return Ok(self.record_infra(Operation::Read));
        }

        let current;
        let tenant: &TenantDescriptor = match tenant_override {
            Some(tenant) => tenant,
            None => {
                current = self.context.current()?;
                &current
            }
        };

        let alias = match pick_replica(tenant.replica_aliases()) {
            Some(replica) => replica.clone(),
            None => tenant.primary_alias().to_string(),
        };
        Ok(self.record(Operation::Read, category, alias, Some(tenant)))
    }

    /// Alias to write `category` data to. Always a primary.
    pub fn choose_write(&self, category: DataCategory) -> Result<Alias, ContextError> {
        if category == DataCategory::Infra {
            return Ok(self.record_infra(Operation::Write));
        }

        let tenant = self.context.current()?;
        let alias = tenant.primary_alias().to_string();
        Ok(self.record(Operation::Write, category, alias, Some(&*tenant)))
    }

    pub fn db_for_read(&self, model: &str) -> Result<Alias, ContextError> {
        self.choose_read(self.models.category_for(model), None)
    }

    pub fn db_for_write(&self, model: &str) -> Result<Alias, ContextError> {
        self.choose_write(self.models.category_for(model))
    }

    /// Whether data of `category` may be migrated onto `alias`. Depends only
    /// on its arguments and the configuration fixed at boot.
    pub fn allow_migrate(&self, alias: &str, category: DataCategory) -> bool {
        if self.skip_migrate.contains(alias) {
            return false;
        }
        !(category == DataCategory::Infra && self.registrar.is_tenant_alias(alias))
    }

    pub fn allow_migrate_model(&self, alias: &str, model: &str) -> bool {
        self.allow_migrate(alias, self.models.category_for(model))
    }

    pub fn category_for(&self, model: &str) -> DataCategory {
        self.models.category_for(model)
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn history(&self) -> &RoutingHistory {
        &self.history
    }

    fn record_infra(&self, operation: Operation) -> Alias {
        let alias = self.registrar.infra_alias().to_string();
        self.record(operation, DataCategory::Infra, alias, None)
    }

    fn record(
        &self,
        operation: Operation,
        data_category: DataCategory,
        chosen_alias: Alias,
        tenant: Option<&TenantDescriptor>,
    ) -> Alias {
        counter!(
            ROUTING_DECISION,
            "operation" => operation.as_str(),
            "category" => data_category.as_str()
        )
        .increment(1);

        self.history.record(RoutingDecision {
            operation,
            data_category,
            chosen_alias: chosen_alias.clone(),
            tenant: tenant.map(|t| t.id().to_string()),
            timestamp: SystemTime::now(),
        });
        chosen_alias
    }
}
