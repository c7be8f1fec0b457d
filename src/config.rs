//! Engine configuration
//!
//! The CLI flags are the only configuration surface; `EngineConfig` carries
//! them into the service.

use tracing::warn;

use crate::core::matcher::{MatchConfig, DEFAULT_DATE_TOLERANCE_DAYS};

/// Tunables for matching and batch work
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Matching window, in days either side of a statement line's date
    pub date_tolerance_days: i64,
    /// Maximum number of accounts matched concurrently
    pub max_concurrent_accounts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: DEFAULT_DATE_TOLERANCE_DAYS,
            max_concurrent_accounts: num_cpus::get(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with custom values
    ///
    /// Invalid values (a negative tolerance, zero workers) are replaced with
    /// the defaults and a warning is logged.
    pub fn new(date_tolerance_days: i64, max_concurrent_accounts: usize) -> Self {
        let default = Self::default();

        let date_tolerance_days = if date_tolerance_days < 0 {
            warn!(
                requested = date_tolerance_days,
                default = default.date_tolerance_days,
                "invalid date tolerance, using default"
            );
            default.date_tolerance_days
        } else {
            date_tolerance_days
        };

        let max_concurrent_accounts = if max_concurrent_accounts == 0 {
            warn!(
                requested = max_concurrent_accounts,
                default = default.max_concurrent_accounts,
                "invalid max_concurrent_accounts, using default"
            );
            default.max_concurrent_accounts
        } else {
            max_concurrent_accounts
        };

        Self {
            date_tolerance_days,
            max_concurrent_accounts,
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            date_tolerance_days: self.date_tolerance_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_window_is_five_days() {
        let config = EngineConfig::default();
        assert_eq!(config.date_tolerance_days, 5);
        assert_eq!(config.max_concurrent_accounts, num_cpus::get());
    }

    #[rstest]
    #[case::valid(3, 4, 3, 4)]
    #[case::zero_tolerance_is_valid(0, 2, 0, 2)]
    #[case::negative_tolerance(-1, 2, 5, 2)]
    #[case::zero_workers(7, 0, 7, num_cpus::get())]
    fn test_invalid_values_fall_back_to_defaults(
        #[case] tolerance: i64,
        #[case] workers: usize,
        #[case] expected_tolerance: i64,
        #[case] expected_workers: usize,
    ) {
        let config = EngineConfig::new(tolerance, workers);
        assert_eq!(config.date_tolerance_days, expected_tolerance);
        assert_eq!(config.max_concurrent_accounts, expected_workers);
        assert_eq!(config.match_config().date_tolerance_days, expected_tolerance);
    }
}
