//! Static obligation, rename and vocabulary tables.

use super::{FieldRule, Obligation, Rename, Requirement, SchemaVersion};

const M1: Option<Obligation> = Some(Obligation::new(Requirement::Mandatory, 1, Some(1)));
const MN: Option<Obligation> = Some(Obligation::new(Requirement::Mandatory, 1, None));
const O1: Option<Obligation> = Some(Obligation::new(Requirement::Optional, 0, Some(1)));
const ON: Option<Obligation> = Some(Obligation::new(Requirement::Optional, 0, None));
const NA: Option<Obligation> = None;

const fn rule(path: &'static str, v1_2: Option<Obligation>, v1_3: Option<Obligation>) -> FieldRule {
    FieldRule { path, v1_2, v1_3 }
}

pub(super) static FIELD_RULES: &[FieldRule] = &[
    // Header
    rule("Header/AuditFileVersion", M1, M1),
    rule("Header/AuditFileCountry", M1, M1),
    rule("Header/AuditFileDateCreated", M1, M1),
    rule("Header/SoftwareCompanyName", M1, M1),
    rule("Header/SoftwareID", M1, M1),
    rule("Header/SoftwareVersion", M1, M1),
    rule("Header/Company", M1, M1),
    rule("Header/Company/RegistrationNumber", M1, M1),
    rule("Header/Company/Name", M1, M1),
    rule("Header/DefaultCurrencyCode", M1, M1),
    rule("Header/SelectionCriteria", O1, M1),
    rule("Header/SelectionCriteria/SelectionStartDate|PeriodStart", M1, M1),
    rule("Header/TaxAccountingBasis", M1, M1),
    // GeneralLedgerAccounts/Account
    rule("Account/AccountDescription", M1, M1),
    rule("Account/StandardAccountID", M1, O1),
    rule("Account/GroupingCategory", NA, M1),
    rule("Account/GroupingCode", NA, M1),
    rule("Account/AccountType", M1, M1),
    rule("Account/OpeningDebitBalance|OpeningCreditBalance", M1, M1),
    rule("Account/ClosingDebitBalance|ClosingCreditBalance", M1, M1),
    // Customers/Customer and Suppliers/Supplier
    rule("Party/Name", M1, M1),
    rule("Party/Address", MN, MN),
    rule("Party/AccountID", M1, NA),
    rule("Party/OpeningDebitBalance|OpeningCreditBalance", M1, NA),
    rule("Party/ClosingDebitBalance|ClosingCreditBalance", M1, NA),
    rule("Party/BalanceAccount", NA, ON),
    rule("Party/BalanceAccount/AccountID", NA, M1),
    rule("Party/PartyInfo/PaymentTerms", NA, O1),
    // TaxTable/TaxTableEntry/TaxCodeDetails
    rule("TaxCodeDetails/Description", M1, M1),
    rule("TaxCodeDetails/TaxPercentage|FlatTaxRate", M1, M1),
    rule("TaxCodeDetails/Country", M1, M1),
    rule("TaxCodeDetails/StandardTaxCode", O1, M1),
    rule("TaxCodeDetails/BaseRate", NA, ON),
    rule("TaxCodeDetails/Compensation", NA, O1),
    // AnalysisTypeTable/AnalysisTypeTableEntry
    rule("AnalysisTypeTableEntry/AnalysisTypeDescription", M1, M1),
    rule("AnalysisTypeTableEntry/AnalysisIDDescription", M1, M1),
    // GeneralLedgerEntries
    rule("GeneralLedgerEntries/NumberOfEntries", M1, M1),
    rule("GeneralLedgerEntries/TotalDebit", M1, M1),
    rule("GeneralLedgerEntries/TotalCredit", M1, M1),
    rule("Journal/Description", M1, M1),
    rule("Journal/Type", M1, M1),
    rule("Transaction/Period", M1, M1),
    rule("Transaction/PeriodYear", M1, M1),
    rule("Transaction/TransactionDate", M1, M1),
    rule("Transaction/Description", M1, M1),
    rule("Transaction/SystemEntryDate", M1, M1),
    rule("Transaction/GLPostingDate", M1, M1),
    rule("Transaction/VoucherType", NA, O1),
    rule("Transaction/VoucherDescription", NA, O1),
    rule("Transaction/ModificationDate", NA, O1),
    rule("Transaction/Line", MN, MN),
    rule("Line/AccountID", M1, M1),
    rule("Line/Description", M1, M1),
    rule("Line/DebitAmount|CreditAmount", M1, M1),
    rule("Line/CustomerID|SupplierID", O1, O1),
    rule("Line/ValueDate", O1, O1),
    rule("Line/DueDate", O1, O1),
    rule("Line/ReferenceNumber", O1, O1),
    rule("Line/Analysis", ON, ON),
    rule("Line/TaxInformation", O1, O1),
    rule("Line/TaxInformation/TaxType", M1, M1),
    rule("Line/TaxInformation/TaxCode", M1, M1),
    rule("Line/TaxInformation/TaxAmount", M1, NA),
    rule("Line/TaxInformation/DebitTaxAmount|CreditTaxAmount", NA, M1),
    rule("Line/Analysis/AnalysisType", M1, M1),
    rule("Line/Analysis/AnalysisID", M1, M1),
    rule("Line/Analysis/AnalysisAmount", O1, NA),
    rule("Line/Analysis/DebitAnalysisAmount|CreditAnalysisAmount", NA, O1),
];

pub(super) static RENAMES: &[Rename] = &[
    Rename {
        path: "Line/TaxInformation/TaxAmount",
        replaced_by: &["DebitTaxAmount", "CreditTaxAmount"],
        since: SchemaVersion::V1_3,
    },
    Rename {
        path: "Line/Analysis/AnalysisAmount",
        replaced_by: &["DebitAnalysisAmount", "CreditAnalysisAmount"],
        since: SchemaVersion::V1_3,
    },
    Rename {
        path: "Party/AccountID",
        replaced_by: &["BalanceAccount"],
        since: SchemaVersion::V1_3,
    },
    Rename {
        path: "Party/OpeningDebitBalance|OpeningCreditBalance",
        replaced_by: &["BalanceAccount"],
        since: SchemaVersion::V1_3,
    },
    Rename {
        path: "Party/ClosingDebitBalance|ClosingCreditBalance",
        replaced_by: &["BalanceAccount"],
        since: SchemaVersion::V1_3,
    },
];

/// (parent, element) pairs present in the standard but not used in Norway.
pub(super) static UNUSED: &[(&str, &str)] = &[
    ("MasterFiles", "Products"),
    ("MasterFiles", "Assets"),
    ("MasterFiles", "UOMTable"),
    ("MasterFiles", "PhysicalStock"),
    ("MasterFiles", "MovementTypeTable"),
    ("AuditFile", "SourceDocuments"),
    ("Transaction", "CustomerID"),
    ("Transaction", "SupplierID"),
];

pub(super) static CHILDREN: &[(&str, &[&str])] = &[
    (
        "AuditFile",
        &["Header", "MasterFiles", "GeneralLedgerEntries", "SourceDocuments"],
    ),
    (
        "Header",
        &[
            "AuditFileVersion",
            "AuditFileCountry",
            "AuditFileRegion",
            "AuditFileDateCreated",
            "SoftwareCompanyName",
            "SoftwareID",
            "SoftwareVersion",
            "Company",
            "DefaultCurrencyCode",
            "SelectionCriteria",
            "HeaderComment",
            "SegmentIndex",
            "TotalSegmentsInsequence",
            "TaxAccountingBasis",
            "TaxEntity",
            "UserID",
            "AuditFileSender",
        ],
    ),
    (
        "MasterFiles",
        &[
            "GeneralLedgerAccounts",
            "Customers",
            "Suppliers",
            "TaxTable",
            "UOMTable",
            "AnalysisTypeTable",
            "MovementTypeTable",
            "Products",
            "PhysicalStock",
            "Owners",
            "Assets",
        ],
    ),
    (
        "Company",
        &[
            "RegistrationNumber",
            "Name",
            "Address",
            "Contact",
            "TaxRegistration",
            "BankAccount",
        ],
    ),
    (
        "Address",
        &[
            "StreetName",
            "Number",
            "AdditionalAddressDetail",
            "Building",
            "City",
            "PostalCode",
            "Region",
            "Country",
            "AddressType",
        ],
    ),
    (
        "Contact",
        &["ContactPerson", "Telephone", "Fax", "Email", "Website", "MobilePhone"],
    ),
    (
        "ContactPerson",
        &[
            "Title",
            "FirstName",
            "Initials",
            "LastNamePrefix",
            "LastName",
            "BirthName",
            "Salutation",
            "OtherTitles",
        ],
    ),
    (
        "TaxRegistration",
        &[
            "TaxRegistrationNumber",
            "TaxType",
            "TaxNumber",
            "TaxAuthority",
            "TaxVerificationDate",
        ],
    ),
    (
        "BankAccount",
        &[
            "IBANNumber",
            "BankAccountNumber",
            "BankAccountName",
            "SortCode",
            "BIC",
            "CurrencyCode",
            "GeneralLedgerAccountID",
        ],
    ),
    (
        "SelectionCriteria",
        &[
            "TaxReportingJurisdiction",
            "CompanyEntity",
            "SelectionStartDate",
            "SelectionEndDate",
            "PeriodStart",
            "PeriodStartYear",
            "PeriodEnd",
            "PeriodEndYear",
            "DocumentType",
            "OtherCriteria",
        ],
    ),
    (
        "PartyInfo",
        &["PaymentTerms", "NaceCode", "CurrencyCode", "Type", "Status", "Notes"],
    ),
    (
        "PaymentTerms",
        &["Days", "Months", "CashDiscountDays", "CashDiscountRate", "FreeBillingMonth"],
    ),
    (
        "AmountStructure",
        &["Amount", "CurrencyCode", "CurrencyAmount", "ExchangeRate"],
    ),
    ("GeneralLedgerAccounts", &["Account"]),
    ("Customers", &["Customer"]),
    ("Suppliers", &["Supplier"]),
    ("TaxTable", &["TaxTableEntry"]),
    ("AnalysisTypeTable", &["AnalysisTypeTableEntry"]),
    (
        "Account",
        &[
            "AccountID",
            "AccountDescription",
            "StandardAccountID",
            "GroupingCategory",
            "GroupingCode",
            "AccountType",
            "AccountCreationDate",
            "OpeningDebitBalance",
            "OpeningCreditBalance",
            "ClosingDebitBalance",
            "ClosingCreditBalance",
        ],
    ),
    (
        "Party",
        &[
            "RegistrationNumber",
            "Name",
            "Contact",
            "Address",
            "TaxRegistration",
            "BankAccount",
            "CustomerID",
            "SupplierID",
            "SelfBillingIndicator",
            "AccountID",
            "OpeningDebitBalance",
            "OpeningCreditBalance",
            "ClosingDebitBalance",
            "ClosingCreditBalance",
            "BalanceAccount",
            "PartyInfo",
        ],
    ),
    (
        "BalanceAccount",
        &[
            "AccountID",
            "OpeningDebitBalance",
            "OpeningCreditBalance",
            "ClosingDebitBalance",
            "ClosingCreditBalance",
        ],
    ),
    ("TaxTableEntry", &["TaxType", "Description", "TaxCodeDetails"]),
    (
        "TaxCodeDetails",
        &[
            "TaxCode",
            "EffectiveDate",
            "ExpirationDate",
            "Description",
            "TaxPercentage",
            "FlatTaxRate",
            "Country",
            "Region",
            "StandardTaxCode",
            "Compensation",
            "BaseRate",
        ],
    ),
    (
        "AnalysisTypeTableEntry",
        &[
            "AnalysisType",
            "AnalysisTypeDescription",
            "AnalysisID",
            "AnalysisIDDescription",
            "StartDate",
            "EndDate",
            "Status",
        ],
    ),
    (
        "GeneralLedgerEntries",
        &["NumberOfEntries", "TotalDebit", "TotalCredit", "Journal"],
    ),
    ("Journal", &["JournalID", "Description", "Type", "Transaction"]),
    (
        "Transaction",
        &[
            "TransactionID",
            "Period",
            "PeriodYear",
            "TransactionDate",
            "SourceID",
            "TransactionType",
            "Description",
            "BatchID",
            "SystemEntryDate",
            "GLPostingDate",
            "CustomerID",
            "SupplierID",
            "SystemID",
            "VoucherType",
            "VoucherDescription",
            "ModificationDate",
            "Line",
        ],
    ),
    (
        "Line",
        &[
            "RecordID",
            "AccountID",
            "Analysis",
            "ValueDate",
            "SourceDocumentID",
            "CustomerID",
            "SupplierID",
            "Description",
            "DebitAmount",
            "CreditAmount",
            "TaxInformation",
            "ReferenceNumber",
            "CID",
            "DueDate",
            "Quantity",
            "CrossReference",
            "SystemEntryTime",
            "OwnerID",
        ],
    ),
    (
        "Analysis",
        &[
            "AnalysisType",
            "AnalysisID",
            "AnalysisAmount",
            "DebitAnalysisAmount",
            "CreditAnalysisAmount",
        ],
    ),
    (
        "TaxInformation",
        &[
            "TaxType",
            "TaxCountryRegion",
            "TaxCode",
            "TaxPercentage",
            "TaxBase",
            "TaxBaseDescription",
            "TaxAmount",
            "DebitTaxAmount",
            "CreditTaxAmount",
            "TaxExemptionReason",
            "TaxDeclarationPeriod",
        ],
    ),
];
