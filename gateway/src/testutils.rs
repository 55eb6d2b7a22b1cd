use std::sync::Arc;
use tenancy::Tenancy;

const TENANCY: &str = r#"
default_tenant: t2
template:
    ENGINE: postgresql
    HOST: db.internal
tenants:
    t1:
        NAME: t1
        aliases: [brand.com, Shop.Brand.com]
        replicas:
            - HOST: replica-1.internal
            - HOST: replica-2.internal
    t2:
        NAME: t2
infra_models: [auth]
history_capacity: 64
"#;

pub fn test_tenancy() -> Arc<Tenancy> {
    let config: tenancy::config::Config = serde_yaml::from_str(TENANCY).unwrap();
    Arc::new(Tenancy::bootstrap(&config, Vec::new()).unwrap())
}

pub fn gateway_config() -> crate::config::Config {
    serde_yaml::from_str(
        r#"
listener: {host: "127.0.0.1", port: 8080}
admin_listener: {host: "127.0.0.1", port: 8081}
"#,
    )
    .unwrap()
}
