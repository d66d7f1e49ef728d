//! # saft
//!
//! Streaming parser, version-aware validator and audit engine for Norwegian
//! SAF-T Financial files (`urn:StandardAuditFile-Taxation-Financial:NO`,
//! versions 1.2 and 1.3).
//!
//! Files are decoded in a single pass without building a document tree.
//! The result is an immutable ledger model plus every finding the audit
//! produced: missing or misplaced fields, dangling account, party, tax and
//! analysis references, unbalanced transactions and control totals.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use saft::{SaftConfig, Severity};
//!
//! let xml = r#"<AuditFile xmlns="urn:StandardAuditFile-Taxation-Financial:NO">
//!   <Header><AuditFileVersion>1.30</AuditFileVersion></Header>
//!   <MasterFiles/>
//!   <GeneralLedgerEntries/>
//! </AuditFile>"#;
//!
//! let analysis = saft::pipeline::analyze_str(xml, &SaftConfig::default()).unwrap();
//! assert!(!analysis.is_valid());
//! assert!(analysis.findings.iter().any(|f| f.severity == Severity::Error));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Decoder, model, structural/referential validation, balances |
//! | `aging` (default) | Aging of open customer/supplier lines |
//! | `parallel` | Concurrent audit stages and batch processing with rayon |
//! | `json` | JSON rendering of findings and reports |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod schema;

#[cfg(feature = "core")]
pub mod decode;

#[cfg(feature = "core")]
pub mod model;

#[cfg(feature = "core")]
pub mod validate;

#[cfg(feature = "core")]
pub mod balance;

#[cfg(feature = "aging")]
pub mod aging;

#[cfg(feature = "core")]
pub mod pipeline;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
