// Per-tenant duplication of periodic task templates. Runs as a bootstrap
// stage after connection registration, since every copy targets a registered
// tenant.
use crate::config::ScheduleConfig;
use crate::registrar::ConnectionRegistrar;
use crate::registry::TenantRegistry;
use serde::Serialize;
use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ScheduleError {
    #[error("schedule `{schedule}` targets tenant `{tenant}` which has no registered primary")]
    UnregisteredTenant { schedule: String, tenant: String },

    #[error("duplicate schedule name `{0}`")]
    DuplicateName(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schedule {
    pub name: String,
    pub task: String,
    pub every: Duration,
    /// Tenant id attached to every run as task metadata. `None` for
    /// schedules that only touch infra data.
    pub tenant: Option<String>,
}

/// Expands `templates` into concrete schedules. Per-tenant templates yield
/// one copy per tenant named `<tenant_id>:<name>`, others are kept once.
pub fn fan_out(
    templates: &[ScheduleConfig],
    registry: &TenantRegistry,
    registrar: &ConnectionRegistrar,
) -> Result<Vec<Schedule>, ScheduleError> {
    let mut schedules = Vec::new();
    let mut names = std::collections::HashSet::new();

    for template in templates {
        let every = Duration::from_secs(template.every_secs);

        if !template.per_tenant {
            if !names.insert(template.name.clone()) {
                return Err(ScheduleError::DuplicateName(template.name.clone()));
            }
            schedules.push(Schedule {
                name: template.name.clone(),
                task: template.task.clone(),
                every,
                tenant: None,
            });
            continue;
        }

        for descriptor in registry.descriptors() {
            if registrar.get(descriptor.primary_alias()).is_none() {
                return Err(ScheduleError::UnregisteredTenant {
                    schedule: template.name.clone(),
                    tenant: descriptor.id().to_string(),
                });
            }

            let name = format!("{}:{}", descriptor.id(), template.name);
            if !names.insert(name.clone()) {
                return Err(ScheduleError::DuplicateName(name));
            }
            schedules.push(Schedule {
                name,
                task: template.task.clone(),
                every,
                tenant: Some(descriptor.id().to_string()),
            });
        }
    }

    Ok(schedules)
}
