use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tracing::{debug, info};

use crate::aggregate::SuccessVocabulary;
use crate::duration::DateWindow;
use crate::rank::RankingSettings;

/// A century of history; longer spans should leave `LOG_TIME_MONTHS` unset.
pub const MAX_LOG_TIME_MONTHS: u32 = 1200;

pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub ranking: RankingSettings,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let timeout_ms: u64 = try_load(&lookup, "RANK_QUERY_TIMEOUT_MS", "5000")?;
        if timeout_ms == 0 {
            return Err(anyhow!("RANK_QUERY_TIMEOUT_MS must be positive"));
        }

        let success_vocabulary: SuccessVocabulary =
            load_with(&lookup, "PROJECT_SUCCESS_STATUSES", "success", |raw| {
                raw.parse::<SuccessVocabulary>().map_err(|e| anyhow!(e))
            })?;

        let log_time_window = match lookup("LOG_TIME_MONTHS").filter(|v| !v.trim().is_empty()) {
            None => DateWindow::all(),
            Some(raw) => {
                let months: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid LOG_TIME_MONTHS value `{raw}`"))?;
                if !(1..=MAX_LOG_TIME_MONTHS).contains(&months) {
                    return Err(anyhow!(
                        "LOG_TIME_MONTHS must be between 1 and {MAX_LOG_TIME_MONTHS}"
                    ));
                }
                DateWindow::recent_months(Utc::now().date_naive(), months)
            }
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            ranking: RankingSettings {
                success_vocabulary,
                log_time_window,
                query_timeout: Duration::from_millis(timeout_ms),
            },
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    load_with(lookup, key, default, |raw| {
        raw.parse::<T>().map_err(|e| anyhow!("{e}"))
    })
}

fn load_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
    parse: impl Fn(&str) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    debug!(key, value = %raw, "config loaded");
    parse(raw.trim()).with_context(|| format!("invalid {key} value `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.ranking, RankingSettings::default());
        assert!(config.database_url().is_err());
    }

    #[test]
    fn explicit_values_are_parsed() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/campus"),
            ("RANK_QUERY_TIMEOUT_MS", "250"),
            ("PROJECT_SUCCESS_STATUSES", "success,finished"),
            ("LOG_TIME_MONTHS", "3"),
        ])
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/campus");
        assert_eq!(config.ranking.query_timeout, Duration::from_millis(250));
        assert_eq!(
            config.ranking.success_vocabulary,
            SuccessVocabulary::Statuses(vec!["success".into(), "finished".into()])
        );
        assert!(config.ranking.log_time_window.start.is_some());
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("RANK_QUERY_TIMEOUT_MS", "soon")]).is_err());
        assert!(config(&[("RANK_QUERY_TIMEOUT_MS", "0")]).is_err());
        assert!(config(&[("LOG_TIME_MONTHS", "0")]).is_err());
        assert!(config(&[("LOG_TIME_MONTHS", "1201")]).is_err());
        assert!(config(&[("LOG_TIME_MONTHS", "4294967295")]).is_err());
        assert!(config(&[("LOG_TIME_MONTHS", "1200")]).is_ok());
        assert!(config(&[("PROJECT_SUCCESS_STATUSES", ",")]).is_err());
    }
}
