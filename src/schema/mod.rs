//! Schema registry for SAF-T Financial NO v1.2 and v1.3.
//!
//! All lookups are pure functions over static tables, so the registry is
//! shared by every worker without synchronization.
//!
//! Paths are slash-separated and start at the entity element, e.g.
//! `Line/AccountID` or `Header/SelectionCriteria`. A choice group is written
//! with `|` between the alternatives: `Line/DebitAmount|CreditAmount` counts
//! how many of the alternatives are populated.

mod tables;

use serde::{Deserialize, Serialize};

use crate::core::SaftError;

/// Namespace of the Norwegian SAF-T Financial dialect.
pub const SAFT_NAMESPACE: &str = "urn:StandardAuditFile-Taxation-Financial:NO";

/// A supported schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// `AuditFileVersion` 1.20: party balances inline, single tax amount.
    V1_2,
    /// `AuditFileVersion` 1.30: balance accounts, debit/credit tax amounts.
    V1_3,
}

impl SchemaVersion {
    /// Parse the `AuditFileVersion` tag. Both `1.3` and `1.30` spellings are accepted.
    pub fn from_tag(tag: &str) -> Result<Self, SaftError> {
        match tag.trim() {
            "1.2" | "1.20" => Ok(Self::V1_2),
            "1.3" | "1.30" => Ok(Self::V1_3),
            other => Err(SaftError::UnsupportedVersion(other.to_string())),
        }
    }

    /// Short form used in messages, e.g. `1.3`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a field must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// Absence is a `MissingField` error.
    Mandatory,
    Optional,
}

/// Presence and cardinality of one field in one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub requirement: Requirement,
    pub min_occurs: u32,
    /// `None` means unbounded.
    pub max_occurs: Option<u32>,
}

impl Obligation {
    pub const fn new(requirement: Requirement, min_occurs: u32, max_occurs: Option<u32>) -> Self {
        Self {
            requirement,
            min_occurs,
            max_occurs,
        }
    }

    /// Whether `occurrences` lies within the cardinality bounds.
    pub fn admits(&self, occurrences: usize) -> bool {
        let n = occurrences as u64;
        n >= u64::from(self.min_occurs) && self.max_occurs.is_none_or(|max| n <= u64::from(max))
    }
}

/// One row of the obligation table.
#[derive(Debug)]
pub struct FieldRule {
    pub path: &'static str,
    pub v1_2: Option<Obligation>,
    pub v1_3: Option<Obligation>,
}

impl FieldRule {
    /// Obligation in `version`, or `None` when the field does not exist there.
    pub fn obligation(&self, version: SchemaVersion) -> Option<Obligation> {
        match version {
            SchemaVersion::V1_2 => self.v1_2,
            SchemaVersion::V1_3 => self.v1_3,
        }
    }

    /// The field part of the path, without the entity prefix.
    pub fn field(&self) -> &'static str {
        self.path.split_once('/').map_or(self.path, |(_, field)| field)
    }

    pub fn is_choice(&self) -> bool {
        self.path.contains('|')
    }
}

/// A field replaced by other fields from a given version on.
#[derive(Debug)]
pub struct Rename {
    pub path: &'static str,
    pub replaced_by: &'static [&'static str],
    pub since: SchemaVersion,
}

/// Obligation of `element_path` under `version`.
///
/// Returns `None` when the path is unknown to the registry or when the field
/// does not exist in that version.
pub fn obligation(version: SchemaVersion, element_path: &str) -> Option<Obligation> {
    tables::FIELD_RULES
        .iter()
        .find(|r| r.path == element_path)
        .and_then(|r| r.obligation(version))
}

/// All rules of one entity element, in table order.
pub fn rules_for(entity: &str) -> impl Iterator<Item = &'static FieldRule> + '_ {
    tables::FIELD_RULES.iter().filter(move |r| {
        r.path
            .strip_prefix(entity)
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// The rename in effect for `element_path` under `version`, if any.
///
/// A trailing sub-path matches too: `TaxInformation/TaxAmount` finds the
/// rename registered for `Line/TaxInformation/TaxAmount`.
pub fn renamed(version: SchemaVersion, element_path: &str) -> Option<&'static Rename> {
    tables::RENAMES.iter().find(|r| {
        version >= r.since
            && r.path
                .strip_suffix(element_path)
                .is_some_and(|head| head.is_empty() || head.ends_with('/'))
    })
}

/// Whether the element exists in the standard but is not used in the Norwegian profile.
///
/// Accepts a bare element name or a path; only the last two segments are
/// significant, so `AuditFile/MasterFiles/Products` and `Products` both match.
pub fn is_known_but_unused(element_path: &str) -> bool {
    let mut segments = element_path.rsplit('/');
    let Some(last) = segments.next() else {
        return false;
    };
    let parent = segments.next();
    tables::UNUSED.iter().any(|(p, c)| {
        *c == last
            && match parent {
                Some(parent) => *p == parent,
                // Bare names are unambiguous only for whole sections.
                None => *p != "Transaction",
            }
    })
}

/// Name of the child vocabulary an element opens.
///
/// Customers and suppliers share the party vocabulary, the sender shares
/// the company one, and every debit, credit, tax or analysis amount
/// shares the amount structure.
pub fn vocabulary(element: &str) -> &str {
    match element {
        "Customer" | "Supplier" => "Party",
        "AuditFileSender" => "Company",
        "DebitAmount" | "CreditAmount" | "TaxAmount" | "DebitTaxAmount" | "CreditTaxAmount"
        | "AnalysisAmount" | "DebitAnalysisAmount" | "CreditAnalysisAmount" => "AmountStructure",
        other => other,
    }
}

/// Whether `child` is a known child element of `parent`.
///
/// Returns `None` when the registry does not track the vocabulary of
/// `parent`. Pass the name returned by [`vocabulary`].
pub fn is_known_child(parent: &str, child: &str) -> Option<bool> {
    tables::CHILDREN
        .iter()
        .find(|(p, _)| *p == parent)
        .map(|(_, children)| children.contains(&child))
}

/// Required direct parent of a ledger section, if the nesting is fixed.
pub fn required_parent(section: &str) -> Option<&'static str> {
    match section {
        "Journal" => Some("GeneralLedgerEntries"),
        "Transaction" => Some("Journal"),
        "Line" => Some("Transaction"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tags() {
        assert_eq!(SchemaVersion::from_tag("1.30").unwrap(), SchemaVersion::V1_3);
        assert_eq!(SchemaVersion::from_tag(" 1.2 ").unwrap(), SchemaVersion::V1_2);
        let err = SchemaVersion::from_tag("1.10").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_VERSION");
    }

    #[test]
    fn selection_criteria_becomes_mandatory_in_1_3() {
        let v12 = obligation(SchemaVersion::V1_2, "Header/SelectionCriteria").unwrap();
        let v13 = obligation(SchemaVersion::V1_3, "Header/SelectionCriteria").unwrap();
        assert_eq!(v12.requirement, Requirement::Optional);
        assert_eq!(v13.requirement, Requirement::Mandatory);
        assert_eq!(v13.min_occurs, 1);
    }

    #[test]
    fn standard_tax_code_mandatory_in_1_3() {
        let v13 = obligation(SchemaVersion::V1_3, "TaxCodeDetails/StandardTaxCode").unwrap();
        assert_eq!(v13.requirement, Requirement::Mandatory);
    }

    #[test]
    fn grouping_fields_do_not_exist_in_1_2() {
        assert!(obligation(SchemaVersion::V1_2, "Account/GroupingCode").is_none());
        assert!(obligation(SchemaVersion::V1_3, "Account/GroupingCode").is_some());
    }

    #[test]
    fn tax_amount_renamed_in_1_3() {
        assert!(renamed(SchemaVersion::V1_2, "TaxInformation/TaxAmount").is_none());
        let r = renamed(SchemaVersion::V1_3, "TaxInformation/TaxAmount").unwrap();
        assert_eq!(r.replaced_by, &["DebitTaxAmount", "CreditTaxAmount"]);
        assert!(renamed(SchemaVersion::V1_3, "Analysis/AnalysisAmount").is_some());
    }

    #[test]
    fn unused_elements() {
        assert!(is_known_but_unused("Products"));
        assert!(is_known_but_unused("AuditFile/SourceDocuments"));
        assert!(is_known_but_unused("Journal/Transaction/CustomerID"));
        assert!(!is_known_but_unused("Line/CustomerID"));
        assert!(!is_known_but_unused("CustomerID"));
    }

    #[test]
    fn known_children() {
        assert_eq!(is_known_child("Line", "ReferenceNumber"), Some(true));
        assert_eq!(is_known_child("Line", "Frobnicate"), Some(false));
        assert_eq!(is_known_child("Address", "City"), Some(true));
        assert_eq!(is_known_child("Company", "Frobnicate"), Some(false));
        assert_eq!(is_known_child(vocabulary("AuditFileSender"), "Contact"), Some(true));
        assert_eq!(is_known_child(vocabulary("CreditTaxAmount"), "Amount"), Some(true));
        assert_eq!(is_known_child(vocabulary("DebitAmount"), "Quantity"), Some(false));
        assert_eq!(is_known_child("Owner", "OwnerID"), None);
    }

    #[test]
    fn choice_rules_are_admitted_by_count() {
        let exclusive = obligation(SchemaVersion::V1_3, "Line/CustomerID|SupplierID").unwrap();
        assert!(exclusive.admits(0));
        assert!(exclusive.admits(1));
        assert!(!exclusive.admits(2));
    }

    #[test]
    fn rules_for_entity_do_not_leak_prefixes() {
        assert!(rules_for("Line").all(|r| r.path.starts_with("Line/")));
        assert!(rules_for("Transaction").any(|r| r.field() == "GLPostingDate"));
    }

    #[test]
    fn nesting() {
        assert_eq!(required_parent("Line"), Some("Transaction"));
        assert_eq!(required_parent("Account"), None);
    }
}
