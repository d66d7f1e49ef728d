//! Structural and referential validation of the built model.
//!
//! Both validators are pure functions of a frozen
//! [`AuditFile`](crate::model::AuditFile), so they can run again at any time
//! and yield the same findings.

pub mod referential;
pub mod structural;

pub use structural::Observed;
