//! Configuration validation logic.

use crate::Config;
use crate::loader::ConfigError;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.paths.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("paths.data_dir is empty".into()));
    }
    if config.server.listen.trim().is_empty() {
        return Err(ConfigError::Invalid("server.listen is empty".into()));
    }
    if config.collector.interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "collector.interval_secs must be > 0".into(),
        ));
    }
    if config.collector.sync_window_hours == 0 {
        return Err(ConfigError::Invalid(
            "collector.sync_window_hours must be > 0".into(),
        ));
    }
    if config.quota.daily_gb == 0 || config.quota.weekly_gb == 0 || config.quota.monthly_gb == 0 {
        return Err(ConfigError::Invalid(
            "quota ceilings must all be > 0".into(),
        ));
    }
    if config.quota.device_alert_gb <= 0.0 {
        return Err(ConfigError::Invalid(
            "quota.device_alert_gb must be > 0".into(),
        ));
    }
    if config.report.anomaly_threshold_percent <= 0.0 {
        return Err(ConfigError::Invalid(
            "report.anomaly_threshold_percent must be > 0".into(),
        ));
    }
    if config.report.top_apps == 0 || config.report.device_top_apps == 0 {
        return Err(ConfigError::Invalid(
            "report.top_apps and report.device_top_apps must be > 0".into(),
        ));
    }
    if config.report.lookback_days < 1 {
        return Err(ConfigError::Invalid(
            "report.lookback_days must be >= 1".into(),
        ));
    }
    if config.report.job_poll_secs == 0 {
        return Err(ConfigError::Invalid(
            "report.job_poll_secs must be > 0".into(),
        ));
    }
    if config.report.job_wait_secs < config.report.job_poll_secs {
        return Err(ConfigError::Invalid(
            "report.job_wait_secs must be >= report.job_poll_secs".into(),
        ));
    }
    if config.backup.interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "backup.interval_secs must be > 0".into(),
        ));
    }
    if config.backup.retention == 0 {
        return Err(ConfigError::Invalid(
            "backup.retention must be > 0".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_config() -> Config {
        Config {
            paths: crate::PathsConfig {
                data_dir: PathBuf::from("/tmp/netmeter"),
                database: None,
                report_dir: None,
                backup_dir: None,
                archive_dir: None,
            },
            collector: Default::default(),
            quota: Default::default(),
            report: Default::default(),
            backup: Default::default(),
            server: Default::default(),
            logging: Default::default(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = base_config();
        config.collector.interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_wait_shorter_than_poll() {
        let mut config = base_config();
        config.report.job_poll_secs = 10;
        config.report.job_wait_secs = 5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn derived_paths_follow_data_dir() {
        let config = base_config();
        assert_eq!(
            config.paths.database(),
            PathBuf::from("/tmp/netmeter/counters.db")
        );
        assert_eq!(
            config.paths.report_dir(),
            PathBuf::from("/tmp/netmeter/reports")
        );
    }
}
