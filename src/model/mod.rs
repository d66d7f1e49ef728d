//! Typed ledger model and the builder that assembles it from decoder events.
//!
//! Lines reference master data by key only. Lookups go through indices
//! owned by [`AuditFile`], so a dangling reference is an ordinary `None`.

mod builder;
mod types;

pub use builder::{Built, ModelBuilder, build};
pub use types::*;

/// Document paths of the entity elements, without the `AuditFile` root.
pub(crate) mod paths {
    pub const HEADER: &str = "Header";
    pub const ACCOUNT: &str = "MasterFiles/GeneralLedgerAccounts/Account";
    pub const CUSTOMER: &str = "MasterFiles/Customers/Customer";
    pub const SUPPLIER: &str = "MasterFiles/Suppliers/Supplier";
    pub const TAX_TABLE_ENTRY: &str = "MasterFiles/TaxTable/TaxTableEntry";
    pub const TAX_CODE: &str = "MasterFiles/TaxTable/TaxTableEntry/TaxCodeDetails";
    pub const ANALYSIS_ENTRY: &str = "MasterFiles/AnalysisTypeTable/AnalysisTypeTableEntry";
    pub const ENTRIES: &str = "GeneralLedgerEntries";
    pub const JOURNAL: &str = "GeneralLedgerEntries/Journal";
    pub const TRANSACTION: &str = "GeneralLedgerEntries/Journal/Transaction";
    pub const LINE: &str = "GeneralLedgerEntries/Journal/Transaction/Line";
}
