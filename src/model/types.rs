use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::Finding;
use crate::schema::SchemaVersion;

/// Placeholder texts accepted in place of a real address.
const ADDRESS_PLACEHOLDERS: &[&str] = &["na", "n/a", "not available", "ikke tilgjengelig"];

/// A decoded SAF-T Financial file: the frozen ledger model.
///
/// Key indices are not serialized; deserializing rebuilds them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredAuditFile")]
pub struct AuditFile {
    pub header: Header,
    pub master_files: MasterFiles,
    pub entries: GeneralLedgerEntries,
    /// Version the file was validated against (declared or overridden).
    pub version: SchemaVersion,
    /// Namespace declared on the root element.
    pub namespace: Option<String>,
    /// Findings raised while decoding that cannot be derived from the model
    /// again (skipped entities, duplicate keys, unknown elements, ...).
    pub decode_findings: Vec<Finding>,
    pub stats: BuildStats,
    #[serde(skip_serializing)]
    pub(crate) indices: Indices,
}

/// Serialized form of [`AuditFile`].
#[derive(Deserialize)]
struct StoredAuditFile {
    header: Header,
    master_files: MasterFiles,
    entries: GeneralLedgerEntries,
    version: SchemaVersion,
    namespace: Option<String>,
    decode_findings: Vec<Finding>,
    stats: BuildStats,
}

impl From<StoredAuditFile> for AuditFile {
    fn from(stored: StoredAuditFile) -> Self {
        let indices = Indices::build(&stored.master_files, &stored.entries);
        Self {
            header: stored.header,
            master_files: stored.master_files,
            entries: stored.entries,
            version: stored.version,
            namespace: stored.namespace,
            decode_findings: stored.decode_findings,
            stats: stored.stats,
            indices,
        }
    }
}

impl AuditFile {
    pub fn account(&self, id: &str) -> Option<&Account> {
        self.indices.accounts.get(id).map(|&i| &self.master_files.accounts[i])
    }

    pub fn customer(&self, id: &str) -> Option<&Party> {
        self.indices.customers.get(id).map(|&i| &self.master_files.customers[i])
    }

    pub fn supplier(&self, id: &str) -> Option<&Party> {
        self.indices.suppliers.get(id).map(|&i| &self.master_files.suppliers[i])
    }

    pub fn party(&self, role: PartyRole, id: &str) -> Option<&Party> {
        match role {
            PartyRole::Customer => self.customer(id),
            PartyRole::Supplier => self.supplier(id),
        }
    }

    /// Look up a tax code by `(TaxType, TaxCode)`.
    pub fn tax_code(&self, tax_type: &str, code: &str) -> Option<&TaxCodeDetail> {
        self.indices
            .tax_codes
            .get(tax_type)
            .and_then(|codes| codes.get(code))
            .map(|&i| &self.master_files.tax_codes[i])
    }

    /// Look up an analysis dimension value by `(AnalysisType, AnalysisID)`.
    pub fn analysis(&self, analysis_type: &str, id: &str) -> Option<&AnalysisTypeEntry> {
        self.indices
            .analysis
            .get(analysis_type)
            .and_then(|ids| ids.get(id))
            .map(|&i| &self.master_files.analysis_types[i])
    }

    pub fn journal(&self, id: &str) -> Option<&Journal> {
        self.indices.journals.get(id).map(|&i| &self.entries.journals[i])
    }

    /// Find a line by its `RecordID` together with its transaction.
    pub fn line(&self, record_id: &str) -> Option<(&Transaction, &Line)> {
        let loc = self.indices.records.get(record_id)?;
        let tx = &self.entries.journals[loc.journal].transactions[loc.transaction];
        Some((tx, &tx.lines[loc.line]))
    }

    /// All transactions in posting order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.journals.iter().flat_map(|j| j.transactions.iter())
    }

    /// All lines with their transaction, in posting order.
    pub fn lines(&self) -> impl Iterator<Item = (&Transaction, &Line)> {
        self.transactions().flat_map(|tx| tx.lines.iter().map(move |l| (tx, l)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    /// `AuditFileVersion` as declared, e.g. "1.30".
    pub audit_file_version: Option<String>,
    pub audit_file_country: Option<String>,
    pub audit_file_date_created: Option<NaiveDate>,
    pub software_company_name: Option<String>,
    pub software_id: Option<String>,
    pub software_version: Option<String>,
    pub company: Option<Company>,
    pub default_currency_code: Option<String>,
    pub selection_criteria: Option<SelectionCriteria>,
    pub header_comment: Option<String>,
    pub tax_accounting_basis: Option<String>,
    pub user_id: Option<String>,
    /// Third party delivering the file on the company's behalf.
    pub sender: Option<Company>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Company {
    pub registration_number: Option<String>,
    pub name: Option<String>,
    pub addresses: Vec<Address>,
    pub tax_registrations: Vec<TaxRegistration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxRegistration {
    pub number: Option<String>,
    pub authority: Option<String>,
}

/// Reporting period: dates, or period numbers with years.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub period_start: Option<u32>,
    pub period_start_year: Option<i32>,
    pub period_end: Option<u32>,
    pub period_end_year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street_name: Option<String>,
    pub number: Option<String>,
    pub additional: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub address_type: Option<String>,
    /// Text of an `<Address>` element that had no child elements.
    pub text: Option<String>,
}

impl Address {
    /// Whether the address is a literal "not available" placeholder.
    pub fn is_not_available(&self) -> bool {
        let is_placeholder =
            |s: &Option<String>| s.as_deref().is_some_and(|v| ADDRESS_PLACEHOLDERS.contains(&v.trim().to_lowercase().as_str()));
        is_placeholder(&self.text) || is_placeholder(&self.street_name) || is_placeholder(&self.city)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterFiles {
    pub accounts: Vec<Account>,
    pub customers: Vec<Party>,
    pub suppliers: Vec<Party>,
    pub tax_codes: Vec<TaxCodeDetail>,
    pub analysis_types: Vec<AnalysisTypeEntry>,
}

/// Opening or closing balance, declared on one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePair {
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
}

impl BalancePair {
    pub fn is_declared(&self) -> bool {
        self.debit.is_some() || self.credit.is_some()
    }

    /// Debit minus credit.
    pub fn net(&self) -> Decimal {
        self.debit.unwrap_or_default() - self.credit.unwrap_or_default()
    }

    /// Number of sides populated.
    pub(crate) fn sides(&self) -> usize {
        usize::from(self.debit.is_some()) + usize::from(self.credit.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub description: Option<String>,
    pub standard_account_id: Option<String>,
    pub grouping_category: Option<String>,
    pub grouping_code: Option<String>,
    pub account_type: Option<String>,
    pub opening: BalancePair,
    pub closing: BalancePair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartyRole {
    Customer,
    Supplier,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Supplier => "Supplier",
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer or supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub role: PartyRole,
    /// `CustomerID` or `SupplierID`.
    pub id: String,
    pub name: Option<String>,
    pub registration_number: Option<String>,
    pub addresses: Vec<Address>,
    pub balance_accounts: Vec<BalanceAccount>,
    /// `PartyInfo/PaymentTerms/Days`.
    pub payment_terms_days: Option<u32>,
    /// Whether a `PartyInfo` block was present at all.
    pub has_party_info: bool,
}

/// Ledger account of a party with its declared balances.
///
/// 1.2 files carry one of these inline on the party (`inline = true`);
/// 1.3 files use repeated `BalanceAccount` elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAccount {
    pub account_id: Option<String>,
    pub opening: BalancePair,
    pub closing: BalancePair,
    pub inline: bool,
}

/// One `TaxCodeDetails`, keyed by `(TaxType, TaxCode)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxCodeDetail {
    pub tax_type: String,
    pub code: String,
    pub description: Option<String>,
    pub percentage: Option<Decimal>,
    pub flat_rate: Option<Amount>,
    pub country: Option<String>,
    pub standard_tax_code: Option<String>,
    pub compensation: Option<bool>,
    /// Percentages of the base that are deductible.
    pub base_rates: Vec<Decimal>,
}

/// One valid `(AnalysisType, AnalysisID)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTypeEntry {
    pub analysis_type: String,
    pub type_description: Option<String>,
    pub id: String,
    pub id_description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralLedgerEntries {
    pub number_of_entries: Option<u64>,
    pub total_debit: Option<Decimal>,
    pub total_credit: Option<Decimal>,
    pub journals: Vec<Journal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: String,
    pub description: Option<String>,
    pub journal_type: Option<String>,
    /// In posting order.
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque voucher identifier.
    pub id: String,
    pub period: Option<u32>,
    pub period_year: Option<i32>,
    pub transaction_date: Option<NaiveDate>,
    pub source_id: Option<String>,
    pub transaction_type: Option<String>,
    pub description: Option<String>,
    pub batch_id: Option<String>,
    pub system_entry_date: Option<NaiveDate>,
    pub gl_posting_date: Option<NaiveDate>,
    pub system_id: Option<String>,
    pub voucher_type: Option<String>,
    pub voucher_description: Option<String>,
    pub modification_date: Option<NaiveDate>,
    pub lines: Vec<Line>,
}

impl Transaction {
    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(Line::debit_amount).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(Line::credit_amount).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub record_id: String,
    pub account_id: Option<String>,
    pub analysis: Vec<AnalysisRef>,
    pub value_date: Option<NaiveDate>,
    pub source_document_id: Option<String>,
    pub customer_id: Option<String>,
    pub supplier_id: Option<String>,
    pub description: Option<String>,
    pub debit: Option<Amount>,
    pub credit: Option<Amount>,
    pub tax: Vec<TaxInformation>,
    pub reference_number: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl Line {
    pub fn debit_amount(&self) -> Decimal {
        self.debit.as_ref().map(|a| a.amount).unwrap_or_default()
    }

    pub fn credit_amount(&self) -> Decimal {
        self.credit.as_ref().map(|a| a.amount).unwrap_or_default()
    }

    /// Debit minus credit.
    pub fn signed_amount(&self) -> Decimal {
        self.debit_amount() - self.credit_amount()
    }

    /// The sub-ledger party of the line. Customer wins when both are set.
    pub fn party(&self) -> Option<(PartyRole, &str)> {
        self.customer_id
            .as_deref()
            .map(|id| (PartyRole::Customer, id))
            .or_else(|| self.supplier_id.as_deref().map(|id| (PartyRole::Supplier, id)))
    }
}

/// `Amount` with optional foreign-currency details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: Decimal,
    pub currency_code: Option<String>,
    pub currency_amount: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
}

impl Amount {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            currency_code: None,
            currency_amount: None,
            exchange_rate: None,
        }
    }
}

/// A tax or analysis amount in its version-specific shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaggedAmount {
    /// 1.2: one unsigned amount (`TaxAmount`, `AnalysisAmount`).
    Legacy(Amount),
    /// 1.3: debit and credit sides (`DebitTaxAmount` / `CreditTaxAmount`, ...).
    Sided {
        debit: Option<Amount>,
        credit: Option<Amount>,
    },
}

impl TaggedAmount {
    /// Debit minus credit; a legacy amount counts as debit.
    pub fn signed(&self) -> Decimal {
        match self {
            Self::Legacy(a) => a.amount,
            Self::Sided { debit, credit } => {
                debit.as_ref().map(|a| a.amount).unwrap_or_default()
                    - credit.as_ref().map(|a| a.amount).unwrap_or_default()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRef {
    pub analysis_type: Option<String>,
    pub analysis_id: Option<String>,
    pub amount: Option<TaggedAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxInformation {
    pub tax_type: Option<String>,
    pub tax_code: Option<String>,
    pub tax_percentage: Option<Decimal>,
    pub tax_base: Option<Decimal>,
    pub amount: Option<TaggedAmount>,
}

/// Entity counts collected while building.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub accounts: usize,
    pub customers: usize,
    pub suppliers: usize,
    pub tax_codes: usize,
    pub analysis_entries: usize,
    pub journals: usize,
    pub transactions: usize,
    pub lines: usize,
    /// Entities dropped because of a missing key or an unparseable value.
    pub skipped: usize,
    pub unknown_elements: usize,
    pub unused_elements: usize,
}

/// Position of a line inside `GeneralLedgerEntries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineLocation {
    pub journal: usize,
    pub transaction: usize,
    pub line: usize,
}

/// Key indices into the entity vectors. Only the first occurrence of a key is indexed.
#[derive(Debug, Clone, Default)]
pub(crate) struct Indices {
    pub accounts: HashMap<String, usize>,
    pub customers: HashMap<String, usize>,
    pub suppliers: HashMap<String, usize>,
    /// TaxType -> TaxCode -> position.
    pub tax_codes: HashMap<String, HashMap<String, usize>>,
    /// AnalysisType -> AnalysisID -> position.
    pub analysis: HashMap<String, HashMap<String, usize>>,
    pub journals: HashMap<String, usize>,
    pub records: HashMap<String, LineLocation>,
}

impl Indices {
    /// Index already accepted entities, first occurrence of each key.
    pub(crate) fn build(master: &MasterFiles, entries: &GeneralLedgerEntries) -> Self {
        let mut indices = Self::default();
        for (i, account) in master.accounts.iter().enumerate() {
            indices.accounts.entry(account.id.clone()).or_insert(i);
        }
        for (i, customer) in master.customers.iter().enumerate() {
            indices.customers.entry(customer.id.clone()).or_insert(i);
        }
        for (i, supplier) in master.suppliers.iter().enumerate() {
            indices.suppliers.entry(supplier.id.clone()).or_insert(i);
        }
        for (i, detail) in master.tax_codes.iter().enumerate() {
            indices
                .tax_codes
                .entry(detail.tax_type.clone())
                .or_default()
                .entry(detail.code.clone())
                .or_insert(i);
        }
        for (i, entry) in master.analysis_types.iter().enumerate() {
            indices
                .analysis
                .entry(entry.analysis_type.clone())
                .or_default()
                .entry(entry.id.clone())
                .or_insert(i);
        }
        for (journal, j) in entries.journals.iter().enumerate() {
            indices.journals.entry(j.id.clone()).or_insert(journal);
            for (transaction, tx) in j.transactions.iter().enumerate() {
                for (line, l) in tx.lines.iter().enumerate() {
                    indices.records.entry(l.record_id.clone()).or_insert(LineLocation {
                        journal,
                        transaction,
                        line,
                    });
                }
            }
        }
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn address_placeholders() {
        let na = Address {
            text: Some("Ikke tilgjengelig".into()),
            ..Default::default()
        };
        assert!(na.is_not_available());
        let city_na = Address {
            city: Some("N/A".into()),
            ..Default::default()
        };
        assert!(city_na.is_not_available());
        let real = Address {
            street_name: Some("Storgata".into()),
            city: Some("Oslo".into()),
            ..Default::default()
        };
        assert!(!real.is_not_available());
    }

    #[test]
    fn balance_pair_net() {
        let pair = BalancePair {
            debit: None,
            credit: Some(dec!(250.00)),
        };
        assert_eq!(pair.net(), dec!(-250.00));
        assert!(pair.is_declared());
        assert!(!BalancePair::default().is_declared());
    }

    #[test]
    fn tagged_amount_sign() {
        let sided = TaggedAmount::Sided {
            debit: None,
            credit: Some(Amount::new(dec!(25))),
        };
        assert_eq!(sided.signed(), dec!(-25));
        assert_eq!(TaggedAmount::Legacy(Amount::new(dec!(25))).signed(), dec!(25));
    }
}
