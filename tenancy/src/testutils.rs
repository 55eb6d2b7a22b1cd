use crate::config::TenantConfig;
use crate::types::ConnectionParams;
use indexmap::IndexMap;
use serde_json::Value;

pub fn params(value: Value) -> ConnectionParams {
    match value {
        Value::Object(map) => map,
        other => panic!("connection params must be an object, got {other}"),
    }
}

/// A tenant with `replicas` empty override records and the given hostnames.
pub fn tenant(replicas: usize, hostnames: &[&str]) -> TenantConfig {
    TenantConfig {
        replicas: vec![ConnectionParams::new(); replicas],
        aliases: hostnames.iter().map(|h| h.to_string()).collect(),
        params: ConnectionParams::new(),
    }
}

pub fn tenants<const N: usize>(
    entries: [(&str, TenantConfig); N],
) -> IndexMap<String, TenantConfig> {
    entries
        .into_iter()
        .map(|(id, config)| (id.to_string(), config))
        .collect()
}
