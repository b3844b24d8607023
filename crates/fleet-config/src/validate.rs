//! Configuration validation logic.

use crate::Config;
use crate::loader::ConfigError;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.ledger.database_url.trim().is_empty() {
        return Err(ConfigError::Validation("ledger.database_url is empty".into()));
    }
    if config.ledger.max_connections == 0 {
        return Err(ConfigError::Validation(
            "ledger.max_connections must be > 0".into(),
        ));
    }
    if config.ledger.min_connections > config.ledger.max_connections {
        return Err(ConfigError::Validation(
            "ledger.min_connections cannot exceed max_connections".into(),
        ));
    }
    if config.node_api.scheme != "http" && config.node_api.scheme != "https" {
        return Err(ConfigError::Validation(
            "node_api.scheme must be 'http' or 'https'".into(),
        ));
    }
    if config.node_api.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "node_api.request_timeout_secs must be > 0".into(),
        ));
    }

    let queues = &config.queues;
    for (name, value) in [
        ("user_concurrency", queues.user_concurrency),
        ("fanout_concurrency", queues.fanout_concurrency),
        ("control_concurrency", queues.control_concurrency),
        ("notify_concurrency", queues.notify_concurrency),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "queues.{name} must be > 0"
            )));
        }
    }
    if queues.notify_max_per_window == 0 || queues.notify_window_secs == 0 {
        return Err(ConfigError::Validation(
            "queues.notify_max_per_window and notify_window_secs must be > 0".into(),
        ));
    }

    let schedule = &config.schedule;
    for (name, value) in [
        ("health_check_secs", schedule.health_check_secs),
        ("usage_record_secs", schedule.usage_record_secs),
        ("threshold_secs", schedule.threshold_secs),
        ("expiry_scan_secs", schedule.expiry_scan_secs),
        ("reset_check_secs", schedule.reset_check_secs),
        ("history_cleanup_secs", schedule.history_cleanup_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "schedule.{name} must be > 0"
            )));
        }
    }
    if schedule.history_retention_days == 0 {
        return Err(ConfigError::Validation(
            "schedule.history_retention_days must be > 0".into(),
        ));
    }

    let percentages = &config.thresholds.percentages;
    if percentages.iter().any(|p| *p == 0 || *p > 100) {
        return Err(ConfigError::Validation(
            "thresholds.percentages must be within 1..=100".into(),
        ));
    }
    if percentages.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ConfigError::Validation(
            "thresholds.percentages must be strictly ascending".into(),
        ));
    }
    if config.thresholds.batch_limit == 0 {
        return Err(ConfigError::Validation(
            "thresholds.batch_limit must be > 0".into(),
        ));
    }
    Ok(())
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
    fn defaults_are_valid() {
        validate_config(&base()).unwrap();
    }

    #[test]
    fn rejects_empty_database_url() {
        let mut config = base();
        config.ledger.database_url = "  ".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = base();
        config.queues.fanout_concurrency = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("fanout_concurrency"), "{err}");
    }

    #[test]
    fn rejects_unsorted_percentages() {
        let mut config = base();
        config.thresholds.percentages = vec![90, 50];
        assert!(validate_config(&config).is_err());
        config.thresholds.percentages = vec![50, 50];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_out_of_range_percentages() {
        let mut config = base();
        config.thresholds.percentages = vec![0, 50];
        assert!(validate_config(&config).is_err());
        config.thresholds.percentages = vec![50, 101];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_unknown_scheme() {
        let mut config = base();
        config.node_api.scheme = "grpc".into();
        assert!(validate_config(&config).is_err());
    }
}
