use gateway::config::{Config as GatewayConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;
use tenancy::ConfigurationError;
use tenancy::config::Config as TenancyConfig;

fn default_metrics_prefix() -> String {
    "tenantd".into()
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub tenancy: TenancyConfig,
    /// Only needed by `serve`.
    pub gateway: Option<GatewayConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tenancy.validate()?;
        if let Some(gateway) = &self.gateway {
            gateway.validate()?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid tenancy config: {0}")]
    Tenancy(#[from] ConfigurationError),
    #[error("invalid gateway config: {0}")]
    Gateway(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example.com/1
            tenancy:
                default_tenant: t1
                template:
                    ENGINE: postgresql
                tenants:
                    t1:
                        NAME: t1
                        aliases: [brand.com]
                        replicas:
                            - HOST: replica-1
                    t2:
                        NAME: t2
                schedules:
                    - name: cleanup
                      task: tasks.cleanup
                      every_secs: 300
            gateway:
                listener:
                    host: 0.0.0.0
                    port: 8080
                admin_listener:
                    host: 127.0.0.1
                    port: 8081
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        config.validate().expect("valid config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_port, 8125);
        assert_eq!(metrics.prefix, "tenantd");
        assert_eq!(config.tenancy.tenants.len(), 2);
        assert_eq!(config.tenancy.schedules[0].name, "cleanup");
        assert_eq!(config.gateway.expect("gateway config").listener.port, 8080);
    }

    #[test]
    fn tenancy_only() {
        let yaml = r#"
            tenancy:
                default_tenant: t1
                tenants:
                    t1: {NAME: t1}
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(config.gateway.is_none());
        assert!(config.common.logging.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_config() {
        let tmp = write_tmp_file(
            r#"
            tenancy:
                default_tenant: ghost
                tenants:
                    t1: {NAME: t1}
            "#,
        );
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Tenancy(ConfigurationError::UnknownDefaultTenant(_)))
        ));

        let tmp = write_tmp_file("tenancy: [");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/tenantd.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
