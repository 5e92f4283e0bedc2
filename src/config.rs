use crate::types::{PipelineError, Result};
use std::env;
use std::time::Duration;

/// Runtime settings, read once at startup and passed explicitly to the
/// components that need them.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Default polling interval for the collection job, in seconds.
    pub collection_interval_secs: u64,
    /// Interval for the background processing job, in seconds.
    pub processing_interval_secs: u64,
    /// Default batch size for `process_pending`.
    pub processing_batch_size: usize,
    /// Default batch size for `reevaluate`.
    pub reevaluation_batch_size: usize,
    /// Most-recent entry cap applied per fetch, bounding work per cycle.
    pub max_entries_per_fetch: usize,
    /// Assumed per-keyword occurrence cap in the relevance divisor.
    pub occurrence_cap: u32,
    /// Consumed downstream to classify items; the pipeline itself does
    /// not enforce it.
    pub relevance_threshold: f64,
    /// HTTP timeout for feed fetches, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection_interval_secs: 86_400,
            processing_interval_secs: 86_400,
            processing_batch_size: 20,
            reevaluation_batch_size: 500,
            max_entries_per_fetch: 10,
            occurrence_cap: 3,
            relevance_threshold: 0.1,
            fetch_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Reads settings from the environment, falling back to defaults for
    /// unset variables. A variable that is set but unparsable is a
    /// configuration error, fatal at startup.
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();
        Ok(Self {
            collection_interval_secs: parse_var(
                "COLLECTION_INTERVAL_SECS",
                defaults.collection_interval_secs,
            )?,
            processing_interval_secs: parse_var(
                "PROCESSING_INTERVAL_SECS",
                defaults.processing_interval_secs,
            )?,
            processing_batch_size: parse_var("PROCESSING_BATCH_SIZE", defaults.processing_batch_size)?,
            reevaluation_batch_size: parse_var(
                "REEVALUATION_BATCH_SIZE",
                defaults.reevaluation_batch_size,
            )?,
            max_entries_per_fetch: parse_var("MAX_ENTRIES_PER_FETCH", defaults.max_entries_per_fetch)?,
            occurrence_cap: parse_var("OCCURRENCE_CAP", defaults.occurrence_cap)?,
            relevance_threshold: parse_var("RELEVANCE_THRESHOLD", defaults.relevance_threshold)?,
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?,
        })
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_secs(self.processing_interval_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| PipelineError::Config(format!("invalid value for {name}: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.max_entries_per_fetch, 10);
        assert_eq!(settings.occurrence_cap, 3);
        assert_eq!(settings.collection_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn malformed_env_value_is_a_config_error() {
        env::set_var("OCCURRENCE_CAP_TEST_ONLY", "three");
        let result: Result<u32> = parse_var("OCCURRENCE_CAP_TEST_ONLY", 3);
        env::remove_var("OCCURRENCE_CAP_TEST_ONLY");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
