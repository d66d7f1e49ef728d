use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::{SaftError, Severity};
use crate::schema::SchemaVersion;

/// Options accepted by the parser and the audit engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaftConfig {
    /// Validate against this schema version regardless of the declared tag.
    pub version_override: Option<SchemaVersion>,
    /// Report unknown elements as errors instead of informational findings.
    pub strict_unknown_elements: bool,
    /// Reference date for the aging report. No report is produced when unset.
    pub aging_as_of: Option<NaiveDate>,
    /// Strictly increasing day thresholds, e.g. `[30, 60, 90]`.
    pub aging_bucket_boundaries: Vec<u32>,
    /// Severity of declared-balance reconciliation mismatches.
    pub reconciliation_severity: Severity,
    /// Abort decoding once this many bytes have been read.
    pub max_input_bytes: Option<u64>,
    /// Maximum element nesting depth accepted by the decoder.
    pub max_depth: usize,
    /// Cooperative cancellation, checked while decoding.
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for SaftConfig {
    fn default() -> Self {
        Self {
            version_override: None,
            strict_unknown_elements: false,
            aging_as_of: None,
            aging_bucket_boundaries: vec![30, 60, 90],
            reconciliation_severity: Severity::Warning,
            max_input_bytes: None,
            max_depth: 32,
            cancel: None,
        }
    }
}

impl SaftConfig {
    /// Reject option combinations that cannot be honoured.
    pub fn check(&self) -> Result<(), SaftError> {
        check_boundaries(&self.aging_bucket_boundaries)?;
        if self.max_depth < 8 {
            return Err(SaftError::Config(format!(
                "max_depth {} is below the depth of the SAF-T ledger hierarchy",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Severity for unknown elements under the current strictness.
    pub fn unknown_element_severity(&self) -> Severity {
        if self.strict_unknown_elements {
            Severity::Error
        } else {
            Severity::Info
        }
    }
}

/// Bucket thresholds must be non-empty and strictly increasing.
pub fn check_boundaries(boundaries: &[u32]) -> Result<(), SaftError> {
    if boundaries.is_empty() {
        return Err(SaftError::Config("aging bucket boundaries must not be empty".into()));
    }
    if boundaries.windows(2).any(|w| w[0] >= w[1]) {
        return Err(SaftError::Config(format!(
            "aging bucket boundaries must be strictly increasing, got {boundaries:?}"
        )));
    }
    Ok(())
}

/// Shared flag used to cancel one file's pipeline from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SaftConfig::default().check().is_ok());
    }

    #[test]
    fn boundaries_must_increase() {
        assert!(check_boundaries(&[30, 30, 90]).is_err());
        assert!(check_boundaries(&[60, 30]).is_err());
        assert!(check_boundaries(&[]).is_err());
        assert!(check_boundaries(&[15]).is_ok());
    }

    #[test]
    fn strict_mode_escalates_unknown_elements() {
        let config = SaftConfig {
            strict_unknown_elements: true,
            ..Default::default()
        };
        assert_eq!(config.unknown_element_severity(), Severity::Error);
        assert_eq!(SaftConfig::default().unknown_element_severity(), Severity::Info);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
