use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal conditions that abort processing of a whole file.
///
/// Everything that still lets the model be built is reported as a
/// [`Finding`] instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaftError {
    /// Malformed markup. Decoding stops at the offending byte.
    #[error("malformed XML at byte {offset} (line {line}, column {column}): {message}")]
    Decode {
        offset: u64,
        line: u64,
        /// Zero when the column could not be determined.
        column: u64,
        message: String,
    },

    /// A ledger section appears outside its required parent.
    #[error("<{element}> must be nested in <{expected}>, found inside <{found}>")]
    Nesting {
        element: String,
        expected: String,
        found: String,
    },

    /// Top-level sections out of order, so index-based checks are impossible.
    #[error("document order violated: {0}")]
    DocumentOrder(String),

    /// `Header/AuditFileVersion` names a version this crate does not know.
    #[error("unsupported AuditFileVersion {0:?}")]
    UnsupportedVersion(String),

    /// Input grew past the caller's size ceiling.
    #[error("input exceeds the configured limit of {limit} bytes")]
    SizeLimit { limit: u64 },

    /// The caller's cancellation token fired.
    #[error("processing cancelled")]
    Cancelled,

    /// Invalid [`SaftConfig`](super::SaftConfig) values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Reading the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SaftError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "DECODE_ERROR",
            Self::Nesting { .. } => "NESTING_ERROR",
            Self::DocumentOrder(_) => "DOCUMENT_ORDER",
            Self::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            Self::SizeLimit { .. } => "SIZE_LIMIT",
            Self::Cancelled => "CANCELLED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

/// How serious a finding is.
///
/// Ordered so that sorting puts errors first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Marks the file invalid. Processing continues.
    Error,
    /// Suspicious but does not make the file invalid.
    Warning,
    /// Visibility only, e.g. a known element that is not in use.
    Info,
}

impl Severity {
    /// Upper-case label used in rendered findings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

/// The stage of the audit that a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Presence, cardinality, value shape and key uniqueness.
    Structural,
    /// Dangling cross-reference from the ledger into MasterFiles.
    Referential,
    /// Debit/credit equality and declared control totals.
    Balance,
    /// Declared opening/closing balances versus posted movements.
    Reconciliation,
    /// Elements that are unknown or explicitly not in use.
    Usage,
    /// Balances on the unexpected side and months without postings.
    Plausibility,
}

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FindingCode {
    /// A mandatory element is absent.
    MissingField,
    /// An element occurs more or fewer times than allowed.
    Cardinality,
    /// More than one alternative of an exclusive choice is populated.
    ChoiceConflict,
    /// An element replaced in a later version is still used.
    DeprecatedField,
    /// An element that does not exist in the file's version.
    FieldNotInVersion,
    /// A value could not be parsed; the enclosing entity was skipped.
    InvalidValue,
    /// A value was accepted only after normalization (e.g. `1 000,50`).
    NonCanonicalNumber,
    /// A value parsed but is implausible (e.g. a tax percentage above 100).
    ImplausibleValue,
    /// A master data key or RecordID occurs more than once.
    DuplicateKey,
    /// The root element declares a foreign namespace.
    NamespaceMismatch,
    /// A line names an AccountID missing from GeneralLedgerAccounts.
    UnknownAccount,
    /// A line names a CustomerID missing from Customers.
    UnknownCustomer,
    /// A line names a SupplierID missing from Suppliers.
    UnknownSupplier,
    /// An `(AnalysisType, AnalysisID)` pair missing from AnalysisTypeTable.
    UnknownAnalysis,
    /// A `(TaxType, TaxCode)` pair missing from TaxTable.
    UnknownTaxCode,
    /// Debit and credit of a transaction differ.
    UnbalancedTransaction,
    /// A declared count or total differs from the entries.
    ControlTotalMismatch,
    /// Opening balance plus movements differs from the declared closing balance.
    ReconciliationMismatch,
    /// A control account differs from the sum of its party balances.
    SubLedgerMismatch,
    /// A customer with a credit balance or a supplier with a debit balance.
    OppositeBalance,
    /// A month of the selection has no transactions.
    PeriodWithoutPostings,
    /// A known element that is not used in the Norwegian profile.
    UnusedElement,
    /// An element outside the vocabulary of its parent.
    UnknownElement,
}

impl FindingCode {
    /// Stable upper-case code used in rendered findings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::Cardinality => "CARDINALITY",
            Self::ChoiceConflict => "CHOICE_CONFLICT",
            Self::DeprecatedField => "DEPRECATED_FIELD",
            Self::FieldNotInVersion => "FIELD_NOT_IN_VERSION",
            Self::InvalidValue => "INVALID_VALUE",
            Self::NonCanonicalNumber => "NON_CANONICAL_NUMBER",
            Self::ImplausibleValue => "IMPLAUSIBLE_VALUE",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::NamespaceMismatch => "NAMESPACE_MISMATCH",
            Self::UnknownAccount => "UNKNOWN_ACCOUNT",
            Self::UnknownCustomer => "UNKNOWN_CUSTOMER",
            Self::UnknownSupplier => "UNKNOWN_SUPPLIER",
            Self::UnknownAnalysis => "UNKNOWN_ANALYSIS",
            Self::UnknownTaxCode => "UNKNOWN_TAX_CODE",
            Self::UnbalancedTransaction => "UNBALANCED_TRANSACTION",
            Self::ControlTotalMismatch => "CONTROL_TOTAL_MISMATCH",
            Self::ReconciliationMismatch => "RECONCILIATION_MISMATCH",
            Self::SubLedgerMismatch => "SUB_LEDGER_MISMATCH",
            Self::OppositeBalance => "OPPOSITE_BALANCE",
            Self::PeriodWithoutPostings => "PERIOD_WITHOUT_POSTINGS",
            Self::UnusedElement => "UNUSED_ELEMENT",
            Self::UnknownElement => "UNKNOWN_ELEMENT",
        }
    }

    /// The audit stage this code belongs to.
    pub fn category(&self) -> Category {
        match self {
            Self::MissingField
            | Self::Cardinality
            | Self::ChoiceConflict
            | Self::DeprecatedField
            | Self::FieldNotInVersion
            | Self::InvalidValue
            | Self::NonCanonicalNumber
            | Self::ImplausibleValue
            | Self::DuplicateKey
            | Self::NamespaceMismatch => Category::Structural,
            Self::UnknownAccount
            | Self::UnknownCustomer
            | Self::UnknownSupplier
            | Self::UnknownAnalysis
            | Self::UnknownTaxCode => Category::Referential,
            Self::UnbalancedTransaction | Self::ControlTotalMismatch => Category::Balance,
            Self::ReconciliationMismatch | Self::SubLedgerMismatch => Category::Reconciliation,
            Self::OppositeBalance | Self::PeriodWithoutPostings => Category::Plausibility,
            Self::UnusedElement | Self::UnknownElement => Category::Usage,
        }
    }
}

/// A single audit finding with element path, owning entity and message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: FindingCode,
    /// Slash-separated document path (e.g. "GeneralLedgerEntries/Journal/Transaction/Line/AccountID").
    pub element_path: String,
    /// Key of the entity the finding belongs to (AccountID, RecordID, ...).
    pub owner_key: Option<String>,
    pub message: String,
    /// Amount involved, e.g. the imbalance of an unbalanced transaction.
    pub amount: Option<Decimal>,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} {}] {}", self.severity.as_str(), self.code.as_str(), self.element_path)?;
        if let Some(owner) = &self.owner_key {
            write!(f, " ({owner})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl Finding {
    /// A finding without owner or amount.
    pub fn new(
        severity: Severity,
        code: FindingCode,
        element_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            element_path: element_path.into(),
            owner_key: None,
            message: message.into(),
            amount: None,
        }
    }

    /// Shorthand for [`Finding::new`] with [`Severity::Error`].
    pub fn error(code: FindingCode, element_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, element_path, message)
    }

    /// Shorthand for [`Finding::new`] with [`Severity::Warning`].
    pub fn warning(
        code: FindingCode,
        element_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, code, element_path, message)
    }

    /// Shorthand for [`Finding::new`] with [`Severity::Info`].
    pub fn info(code: FindingCode, element_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, element_path, message)
    }

    /// Attach the key of the owning entity.
    pub fn owned_by(mut self, owner: Option<String>) -> Self {
        self.owner_key = owner;
        self
    }

    /// Attach the amount involved.
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn category(&self) -> Category {
        self.code.category()
    }
}
