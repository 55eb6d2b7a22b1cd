use crate::context::StackToken;

/// Malformed or colliding tenant configuration. Always fatal at boot.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigurationError {
    #[error("no tenants configured")]
    NoTenants,

    #[error("tenant id cannot be empty")]
    EmptyTenantId,

    #[error("tenants `{first}` and `{second}` both normalize to alias `{alias}`")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },

    #[error("hostname `{hostname}` is claimed by both `{first}` and `{second}`")]
    HostnameConflict {
        hostname: String,
        first: String,
        second: String,
    },

    #[error("tenant `{tenant}` expects {expected} replicas but {actual} were registered")]
    ReplicaCountMismatch {
        tenant: String,
        expected: usize,
        actual: usize,
    },

    #[error("default tenant `{0}` is not configured")]
    UnknownDefaultTenant(String),

    #[error("routing history capacity must be greater than 0")]
    ZeroHistoryCapacity,

    #[error("schedule `{0}` must run at an interval greater than 0")]
    ZeroScheduleInterval(String),

    #[error("infrastructure alias cannot be empty")]
    EmptyInfraAlias,
}

/// A computed alias collides with a reserved or already registered alias.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DuplicateAliasError {
    #[error("alias `{alias}` of tenant `{tenant}` collides with a reserved infrastructure alias")]
    Reserved { alias: String, tenant: String },

    #[error("alias `{alias}` of tenant `{tenant}` is already registered")]
    Registered { alias: String, tenant: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NotFoundError {
    #[error("unknown tenant id `{0}`")]
    TenantId(String),

    #[error("unknown tenant hostname `{0}`")]
    Hostname(String),
}

/// Misuse of the per-unit context stack. These always indicate a bug in a
/// boundary adapter and are logged at error level where they are raised.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("pop called with only the base tenant on the stack")]
    PopBeyondBase,

    #[error("pop for {expected:?} does not match the top of the stack {actual:?}")]
    UnbalancedPop {
        expected: StackToken,
        actual: Option<StackToken>,
    },

    #[error("no execution unit is active for this task")]
    NoExecutionUnit,

    #[error("no tenant has been pushed and strict mode is enabled")]
    NoActiveTenant,
}

impl ContextError {
    /// True for errors that mean push and pop were not paired.
    pub fn is_stack_misuse(&self) -> bool {
        matches!(
            self,
            ContextError::PopBeyondBase
                | ContextError::UnbalancedPop { .. }
                | ContextError::NoExecutionUnit
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("duplicate alias: {0}")]
    DuplicateAlias(#[from] DuplicateAliasError),

    #[error("initializer `{stage}` failed: {source}")]
    Initializer {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
