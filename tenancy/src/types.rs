use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Opaque connection parameters (host, port, credentials, engine...).
pub type ConnectionParams = Map<String, Value>;

pub type Alias = String;

/// Immutable description of one tenant, created at boot and shared for the
/// lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TenantDescriptor {
    id: String,
    primary_alias: Alias,
    replica_aliases: Vec<Alias>,
    alt_hostnames: BTreeSet<String>,
}

impl TenantDescriptor {
    pub fn new<I, A>(id: I, primary_alias: A) -> Self
    where
        I: Into<String>,
        A: Into<Alias>,
    {
        TenantDescriptor {
            id: id.into(),
            primary_alias: primary_alias.into(),
            replica_aliases: Vec::new(),
            alt_hostnames: BTreeSet::new(),
        }
    }

    pub fn with_replica_aliases(mut self, replica_aliases: Vec<Alias>) -> Self {
        self.replica_aliases = replica_aliases;
        self
    }

    pub fn with_alt_hostnames<I>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.alt_hostnames = hostnames.into_iter().collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn primary_alias(&self) -> &str {
        &self.primary_alias
    }

    /// Replica aliases in registration order, possibly empty.
    pub fn replica_aliases(&self) -> &[Alias] {
        &self.replica_aliases
    }

    pub fn alt_hostnames(&self) -> &BTreeSet<String> {
        &self.alt_hostnames
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Primary,
    Replica,
}

/// A single physical connection target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionDefinition {
    pub alias: Alias,
    pub role: ConnectionRole,
    /// Set only for replicas, always names a registered primary.
    pub parent_alias: Option<Alias>,
    /// Owning tenant id. `None` for infrastructure connections.
    pub tenant: Option<String>,
    pub params: ConnectionParams,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }
}

/// Which kind of data a query touches. Infra data is owned by the
/// infrastructure store and never lives on a tenant connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCategory {
    Tenant,
    Infra,
}

impl DataCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Tenant => "tenant",
            DataCategory::Infra => "infra",
        }
    }
}

impl FromStr for DataCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant" => Ok(DataCategory::Tenant),
            "infra" => Ok(DataCategory::Infra),
            other => Err(format!("unknown data category `{other}`")),
        }
    }
}
