//! Tenant propagation across the task queue boundary.
//!
//! Producers stamp the active tenant id onto every outgoing
//! [`TaskEnvelope`]. Consumers read it back and run the task body as a fresh
//! execution unit with that tenant pushed, so tasks handled back to back on
//! one worker never inherit each other's tenant.

use crate::errors::GatewayError;
use crate::metrics_defs::TASK_CONSUMED;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tenancy::schedule::Schedule;
use tenancy::{Tenancy, TenantContext, TenantDescriptor, TenantRegistry};

/// Metadata key carrying the tenant id.
pub const TENANT_METADATA_KEY: &str = "tenant_id";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope<T> {
    pub task: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payload: T,
}

impl<T> TaskEnvelope<T> {
    pub fn new(task: impl Into<String>, payload: T) -> Self {
        TaskEnvelope {
            task: task.into(),
            metadata: HashMap::new(),
            payload,
        }
    }

    /// Envelope for one run of a fanned-out schedule. Per-tenant schedules
    /// carry their tenant id without needing an active context.
    pub fn for_schedule(schedule: &Schedule, payload: T) -> Self {
        let mut envelope = TaskEnvelope::new(schedule.task.clone(), payload);
        if let Some(tenant) = &schedule.tenant {
            envelope
                .metadata
                .insert(TENANT_METADATA_KEY.to_string(), tenant.clone());
        }
        envelope
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.metadata.get(TENANT_METADATA_KEY).map(String::as_str)
    }
}

#[derive(Clone)]
pub struct OutboundInterceptor {
    context: TenantContext,
}

impl OutboundInterceptor {
    pub fn new(context: TenantContext) -> Self {
        OutboundInterceptor { context }
    }

    /// Attaches the active tenant id to `envelope`.
    pub fn attach<T>(&self, envelope: &mut TaskEnvelope<T>) -> Result<(), GatewayError> {
        let tenant = self.context.current()?;
        envelope
            .metadata
            .insert(TENANT_METADATA_KEY.to_string(), tenant.id().to_string());
        Ok(())
    }
}

#[derive(Clone)]
pub struct InboundInterceptor {
    registry: Arc<TenantRegistry>,
    context: TenantContext,
}

impl InboundInterceptor {
    pub fn new(tenancy: &Tenancy) -> Self {
        InboundInterceptor {
            registry: tenancy.registry().clone(),
            context: tenancy.context().clone(),
        }
    }

    fn resolve<T>(
        &self,
        envelope: &TaskEnvelope<T>,
    ) -> Result<Arc<TenantDescriptor>, GatewayError> {
        let resolved = envelope
            .tenant_id()
            .ok_or_else(|| GatewayError::MissingTaskTenant(envelope.task.clone()))
            .and_then(|id| self.registry.get_by_id(id).map_err(GatewayError::from));

        if let Err(err) = &resolved {
            counter!(TASK_CONSUMED, "outcome" => "rejected").increment(1);
            tracing::warn!(task = %envelope.task, error = %err, "rejected task");
        }
        resolved
    }

    /// Runs `handler` on the payload with the envelope's tenant active.
    pub async fn run<T, F, Fut>(
        &self,
        envelope: TaskEnvelope<T>,
        handler: F,
    ) -> Result<Fut::Output, GatewayError>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future,
    {
        let descriptor = self.resolve(&envelope)?;
        tracing::debug!(task = %envelope.task, tenant = %descriptor.id(), "running task");

        let payload = envelope.payload;
        let output = self
            .context
            .run_unit(self.context.scope(descriptor, async move { handler(payload).await }))
            .await?;

        counter!(TASK_CONSUMED, "outcome" => "ok").increment(1);
        Ok(output)
    }

    /// Blocking counterpart of [`InboundInterceptor::run`].
    pub fn run_sync<T, R, F>(
        &self,
        envelope: TaskEnvelope<T>,
        handler: F,
    ) -> Result<R, GatewayError>
    where
        F: FnOnce(T) -> R,
    {
        let descriptor = self.resolve(&envelope)?;
        tracing::debug!(task = %envelope.task, tenant = %descriptor.id(), "running task");

        let payload = envelope.payload;
        let output = self.context.run_unit_sync(|| {
            let _guard = self.context.enter(descriptor)?;
            Ok::<_, GatewayError>(handler(payload))
        })?;

        counter!(TASK_CONSUMED, "outcome" => "ok").increment(1);
        Ok(output)
    }
}
