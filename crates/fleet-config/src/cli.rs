//! CLI override definitions and application logic.

use clap::Parser;

use crate::Config;

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override ledger database URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
    /// Override node API bearer token
    #[arg(long, env = "NODE_API_TOKEN", hide_env_values = true)]
    pub node_token: Option<String>,
    /// Override metrics listen address
    #[arg(long)]
    pub metrics_listen: Option<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Skip the startup restart of every enabled node
    #[arg(long)]
    pub no_cold_start: bool,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(v) = &overrides.database_url {
        config.ledger.database_url = v.clone();
    }
    if let Some(v) = &overrides.node_token {
        config.node_api.token = Some(v.clone());
    }
    if let Some(v) = &overrides.metrics_listen {
        config.metrics.listen = Some(v.clone());
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    if overrides.no_cold_start {
        config.schedule.cold_start_restart = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        toml::from_str(
            r#"
[ledger]
database_url = "sqlite::memory:"
"#,
        )
        .unwrap()
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = base();
        let overrides = CliOverrides {
            database_url: Some("postgres://db/fleet".into()),
            node_token: Some("t0ken".into()),
            log_level: Some("trace".into()),
            no_cold_start: true,
            ..Default::default()
        };
        apply_overrides(&mut config, &overrides);
        assert_eq!(config.ledger.database_url, "postgres://db/fleet");
        assert_eq!(config.node_api.token.as_deref(), Some("t0ken"));
        assert_eq!(config.logging.level.as_deref(), Some("trace"));
        assert!(!config.schedule.cold_start_restart);
    }

    #[test]
    fn empty_overrides_keep_file_values() {
        let mut config = base();
        apply_overrides(&mut config, &CliOverrides::default());
        assert_eq!(config.ledger.database_url, "sqlite::memory:");
        assert!(config.schedule.cold_start_restart);
    }
}
