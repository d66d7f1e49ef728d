//! One-call entry points: decode, build, validate and compute.
//!
//! ```no_run
//! use saft::SaftConfig;
//! use saft::pipeline;
//!
//! let xml = std::fs::read_to_string("SAF-T Financial_999999999_20250301.xml").unwrap();
//! let analysis = pipeline::analyze_str(&xml, &SaftConfig::default()).unwrap();
//! for finding in &analysis.findings {
//!     println!("{finding}");
//! }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

#[cfg(feature = "aging")]
use crate::aging::{self, AgingReport};
use crate::balance::{self, Balances};
use crate::core::{Finding, SaftConfig, SaftError};
use crate::model::{self, AuditFile};
use crate::validate::{referential, structural};

/// The model with its build-time findings.
#[derive(Debug)]
pub struct Parsed {
    pub file: AuditFile,
    /// Decode and structural findings, sorted.
    pub findings: Vec<Finding>,
}

/// Everything the audit produces for one file.
#[derive(Debug)]
pub struct Analysis {
    pub file: AuditFile,
    /// All findings, sorted.
    pub findings: Vec<Finding>,
    pub balances: Balances,
    /// Present when `SaftConfig::aging_as_of` is set.
    #[cfg(feature = "aging")]
    pub aging: Option<AgingReport>,
}

impl Analysis {
    /// No finding of severity Error.
    pub fn is_valid(&self) -> bool {
        !self.findings.iter().any(Finding::is_error)
    }
}

/// Decode and build, with structural checks run as entities complete.
pub fn parse<R: BufRead>(reader: R, config: &SaftConfig) -> Result<Parsed, SaftError> {
    let built = model::build(reader, config)?;
    let mut findings = built.file.decode_findings.clone();
    findings.extend(built.structural);
    findings.sort();
    Ok(Parsed {
        file: built.file,
        findings,
    })
}

pub fn parse_str(xml: &str, config: &SaftConfig) -> Result<Parsed, SaftError> {
    parse(xml.as_bytes(), config)
}

/// Full audit of one document.
pub fn analyze<R: BufRead>(reader: R, config: &SaftConfig) -> Result<Analysis, SaftError> {
    let Parsed { file, mut findings } = parse(reader, config)?;
    #[cfg_attr(not(feature = "aging"), allow(unused_variables))]
    let (referential, (balances, balance_findings), aging) = run_stages(&file, config)?;
    findings.extend(referential);
    findings.extend(balance_findings);
    findings.sort();
    info!(
        findings = findings.len(),
        errors = findings.iter().filter(|f| f.is_error()).count(),
        "analysis finished"
    );
    Ok(Analysis {
        file,
        findings,
        balances,
        #[cfg(feature = "aging")]
        aging,
    })
}

pub fn analyze_str(xml: &str, config: &SaftConfig) -> Result<Analysis, SaftError> {
    analyze(xml.as_bytes(), config)
}

pub fn analyze_path(path: &Path, config: &SaftConfig) -> Result<Analysis, SaftError> {
    let file = File::open(path)?;
    info!(path = %path.display(), "analyzing file");
    analyze(BufReader::new(file), config)
}

/// Analyze independent files. With the `parallel` feature each file runs
/// on its own rayon worker; results keep the input order.
pub fn analyze_files(
    paths: &[PathBuf],
    config: &SaftConfig,
) -> Vec<(PathBuf, Result<Analysis, SaftError>)> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|p| (p.clone(), analyze_path(p, config)))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        paths
            .iter()
            .map(|p| (p.clone(), analyze_path(p, config)))
            .collect()
    }
}

/// Derive the complete finding set again from a frozen model.
///
/// Equal to [`Analysis::findings`] of the run that built `file`.
pub fn derive_findings(file: &AuditFile, config: &SaftConfig) -> Vec<Finding> {
    let mut findings = file.decode_findings.clone();
    findings.extend(structural::validate(file));
    findings.extend(referential::validate(file));
    findings.extend(balance::check(file, config));
    findings.sort();
    findings
}

#[cfg(feature = "aging")]
type AgingOutput = Option<AgingReport>;
#[cfg(not(feature = "aging"))]
type AgingOutput = ();

type StageOutput = (Vec<Finding>, (Balances, Vec<Finding>), AgingOutput);

#[cfg(feature = "aging")]
fn aging_stage(file: &AuditFile, config: &SaftConfig) -> Result<AgingOutput, SaftError> {
    config
        .aging_as_of
        .map(|as_of| aging::age(file, as_of, &config.aging_bucket_boundaries))
        .transpose()
}

#[cfg(not(feature = "aging"))]
fn aging_stage(_file: &AuditFile, _config: &SaftConfig) -> Result<AgingOutput, SaftError> {
    Ok(())
}

/// Referential, balance and aging stages over the frozen model.
#[cfg(feature = "parallel")]
fn run_stages(file: &AuditFile, config: &SaftConfig) -> Result<StageOutput, SaftError> {
    let (referential, (balances, aging)) = rayon::join(
        || referential::validate(file),
        || {
            rayon::join(
                || balance::compute(file, config),
                || aging_stage(file, config),
            )
        },
    );
    Ok((referential, balances, aging?))
}

#[cfg(not(feature = "parallel"))]
fn run_stages(file: &AuditFile, config: &SaftConfig) -> Result<StageOutput, SaftError> {
    Ok((
        referential::validate(file),
        balance::compute(file, config),
        aging_stage(file, config)?,
    ))
}

/// Render any report as pretty JSON.
#[cfg(feature = "json")]
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, SaftError> {
    serde_json::to_string_pretty(value).map_err(|e| SaftError::Serialization(e.to_string()))
}
