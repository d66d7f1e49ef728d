//! Presence and cardinality checks against the schema registry.

use crate::core::{Finding, FindingCode};
use crate::model::*;
use crate::model::paths;
use crate::schema::{self, SchemaVersion};

/// An entity whose field occurrences can be counted for the registry checks.
pub trait Observed {
    /// Registry prefix of the entity's rules, e.g. `"Line"`.
    fn kind(&self) -> &'static str;
    /// Document path of the entity element.
    fn path(&self) -> &'static str;
    fn owner_key(&self) -> Option<String>;
    /// Occurrences of `field`. For a nested field (`Parent/Child`) the
    /// count is taken inside the `instance`-th `Parent`.
    fn occurrences(&self, field: &str, instance: usize) -> usize;
}

/// Check one entity and append its findings to `out`.
pub fn check<E: Observed>(entity: &E, version: SchemaVersion, out: &mut Vec<Finding>) {
    for rule in schema::rules_for(entity.kind()) {
        let field = rule.field();
        let instances = match field.rsplit_once('/') {
            Some((parent, _)) => entity.occurrences(parent, 0),
            None => 1,
        };
        for instance in 0..instances {
            let n = entity.occurrences(field, instance);
            let path = format!("{}/{field}", entity.path());
            let finding = match rule.obligation(version) {
                Some(ob) if n < ob.min_occurs as usize => {
                    if n == 0 {
                        Finding::error(
                            FindingCode::MissingField,
                            path,
                            format!("<{field}> is mandatory in version {version}"),
                        )
                    } else {
                        Finding::error(
                            FindingCode::Cardinality,
                            path,
                            format!("<{field}> occurs {n} times, at least {} required", ob.min_occurs),
                        )
                    }
                }
                Some(ob) if !ob.admits(n) => {
                    if rule.is_choice() {
                        Finding::error(
                            FindingCode::ChoiceConflict,
                            path,
                            format!("only one of <{field}> may be populated, found {n}"),
                        )
                    } else {
                        Finding::error(
                            FindingCode::Cardinality,
                            path,
                            format!("<{field}> occurs {n} times, at most {} allowed", ob.max_occurs.unwrap_or(0)),
                        )
                    }
                }
                Some(_) => continue,
                None if n == 0 => continue,
                None => match schema::renamed(version, rule.path) {
                    Some(rename) => Finding::warning(
                        FindingCode::DeprecatedField,
                        path,
                        format!(
                            "<{field}> is replaced by <{}> in version {version}",
                            rename.replaced_by.join("> / <")
                        ),
                    ),
                    None => Finding::warning(
                        FindingCode::FieldNotInVersion,
                        path,
                        format!("<{field}> is not defined in version {version}"),
                    ),
                },
            };
            out.push(finding.owned_by(entity.owner_key()));
        }
    }
}

/// Re-run the checks over a frozen model. Yields the same findings as the
/// incremental run during the build.
pub fn validate(file: &AuditFile) -> Vec<Finding> {
    let version = file.version;
    let mut out = Vec::new();
    check(&file.header, version, &mut out);
    let master = &file.master_files;
    for account in &master.accounts {
        check(account, version, &mut out);
    }
    for party in master.customers.iter().chain(&master.suppliers) {
        check(party, version, &mut out);
    }
    for detail in &master.tax_codes {
        check(detail, version, &mut out);
    }
    for entry in &master.analysis_types {
        check(entry, version, &mut out);
    }
    for journal in &file.entries.journals {
        check(journal, version, &mut out);
        for tx in &journal.transactions {
            check(tx, version, &mut out);
            for line in &tx.lines {
                check(line, version, &mut out);
            }
        }
    }
    check(&file.entries, version, &mut out);
    out
}

fn present<T>(value: &Option<T>) -> usize {
    usize::from(value.is_some())
}

impl Observed for Header {
    fn kind(&self) -> &'static str {
        "Header"
    }

    fn path(&self) -> &'static str {
        paths::HEADER
    }

    fn owner_key(&self) -> Option<String> {
        None
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        let company = self.company.as_ref();
        let criteria = self.selection_criteria.as_ref();
        match field {
            "AuditFileVersion" => present(&self.audit_file_version),
            "AuditFileCountry" => present(&self.audit_file_country),
            "AuditFileDateCreated" => present(&self.audit_file_date_created),
            "SoftwareCompanyName" => present(&self.software_company_name),
            "SoftwareID" => present(&self.software_id),
            "SoftwareVersion" => present(&self.software_version),
            "Company" => present(&self.company),
            "Company/RegistrationNumber" => company.map_or(0, |c| present(&c.registration_number)),
            "Company/Name" => company.map_or(0, |c| present(&c.name)),
            "DefaultCurrencyCode" => present(&self.default_currency_code),
            "SelectionCriteria" => present(&self.selection_criteria),
            "SelectionCriteria/SelectionStartDate|PeriodStart" => {
                criteria.map_or(0, |s| present(&s.start_date) + present(&s.period_start))
            }
            "TaxAccountingBasis" => present(&self.tax_accounting_basis),
            _ => 0,
        }
    }
}

impl Observed for Account {
    fn kind(&self) -> &'static str {
        "Account"
    }

    fn path(&self) -> &'static str {
        paths::ACCOUNT
    }

    fn owner_key(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        match field {
            "AccountDescription" => present(&self.description),
            "StandardAccountID" => present(&self.standard_account_id),
            "GroupingCategory" => present(&self.grouping_category),
            "GroupingCode" => present(&self.grouping_code),
            "AccountType" => present(&self.account_type),
            "OpeningDebitBalance|OpeningCreditBalance" => self.opening.sides(),
            "ClosingDebitBalance|ClosingCreditBalance" => self.closing.sides(),
            _ => 0,
        }
    }
}

impl Observed for Party {
    fn kind(&self) -> &'static str {
        "Party"
    }

    fn path(&self) -> &'static str {
        match self.role {
            PartyRole::Customer => paths::CUSTOMER,
            PartyRole::Supplier => paths::SUPPLIER,
        }
    }

    fn owner_key(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn occurrences(&self, field: &str, instance: usize) -> usize {
        let inline = self.balance_accounts.iter().find(|b| b.inline);
        let nested = || self.balance_accounts.iter().filter(|b| !b.inline);
        match field {
            "Name" => present(&self.name),
            "Address" => self.addresses.len(),
            "AccountID" => inline.map_or(0, |b| present(&b.account_id)),
            "OpeningDebitBalance|OpeningCreditBalance" => inline.map_or(0, |b| b.opening.sides()),
            "ClosingDebitBalance|ClosingCreditBalance" => inline.map_or(0, |b| b.closing.sides()),
            "BalanceAccount" => nested().count(),
            "BalanceAccount/AccountID" => nested().nth(instance).map_or(0, |b| present(&b.account_id)),
            "PartyInfo" => usize::from(self.has_party_info),
            "PartyInfo/PaymentTerms" => present(&self.payment_terms_days),
            _ => 0,
        }
    }
}

impl Observed for TaxCodeDetail {
    fn kind(&self) -> &'static str {
        "TaxCodeDetails"
    }

    fn path(&self) -> &'static str {
        paths::TAX_CODE
    }

    fn owner_key(&self) -> Option<String> {
        Some(format!("{}/{}", self.tax_type, self.code))
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        match field {
            "Description" => present(&self.description),
            "TaxPercentage|FlatTaxRate" => present(&self.percentage) + present(&self.flat_rate),
            "Country" => present(&self.country),
            "StandardTaxCode" => present(&self.standard_tax_code),
            "BaseRate" => self.base_rates.len(),
            "Compensation" => present(&self.compensation),
            _ => 0,
        }
    }
}

impl Observed for AnalysisTypeEntry {
    fn kind(&self) -> &'static str {
        "AnalysisTypeTableEntry"
    }

    fn path(&self) -> &'static str {
        paths::ANALYSIS_ENTRY
    }

    fn owner_key(&self) -> Option<String> {
        Some(format!("{}/{}", self.analysis_type, self.id))
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        match field {
            "AnalysisTypeDescription" => present(&self.type_description),
            "AnalysisIDDescription" => present(&self.id_description),
            _ => 0,
        }
    }
}

impl Observed for GeneralLedgerEntries {
    fn kind(&self) -> &'static str {
        "GeneralLedgerEntries"
    }

    fn path(&self) -> &'static str {
        paths::ENTRIES
    }

    fn owner_key(&self) -> Option<String> {
        None
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        match field {
            "NumberOfEntries" => present(&self.number_of_entries),
            "TotalDebit" => present(&self.total_debit),
            "TotalCredit" => present(&self.total_credit),
            _ => 0,
        }
    }
}

impl Observed for Journal {
    fn kind(&self) -> &'static str {
        "Journal"
    }

    fn path(&self) -> &'static str {
        paths::JOURNAL
    }

    fn owner_key(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        match field {
            "Description" => present(&self.description),
            "Type" => present(&self.journal_type),
            _ => 0,
        }
    }
}

impl Observed for Transaction {
    fn kind(&self) -> &'static str {
        "Transaction"
    }

    fn path(&self) -> &'static str {
        paths::TRANSACTION
    }

    fn owner_key(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn occurrences(&self, field: &str, _instance: usize) -> usize {
        match field {
            "Period" => present(&self.period),
            "PeriodYear" => present(&self.period_year),
            "TransactionDate" => present(&self.transaction_date),
            "Description" => present(&self.description),
            "SystemEntryDate" => present(&self.system_entry_date),
            "GLPostingDate" => present(&self.gl_posting_date),
            "VoucherType" => present(&self.voucher_type),
            "VoucherDescription" => present(&self.voucher_description),
            "ModificationDate" => present(&self.modification_date),
            "Line" => self.lines.len(),
            _ => 0,
        }
    }
}

/// Populated sides of a debit/credit pair. A zero side next to a non-zero
/// one does not count.
fn sides(debit: Option<&Amount>, credit: Option<&Amount>) -> usize {
    match (debit, credit) {
        (Some(d), Some(c)) if d.amount.is_zero() || c.amount.is_zero() => 1,
        (Some(_), Some(_)) => 2,
        (Some(_), None) | (None, Some(_)) => 1,
        (None, None) => 0,
    }
}

fn legacy(amount: &Option<TaggedAmount>) -> usize {
    usize::from(matches!(amount, Some(TaggedAmount::Legacy(_))))
}

fn sided(amount: &Option<TaggedAmount>) -> usize {
    match amount {
        Some(TaggedAmount::Sided { debit, credit }) => present(debit) + present(credit),
        _ => 0,
    }
}

impl Observed for Line {
    fn kind(&self) -> &'static str {
        "Line"
    }

    fn path(&self) -> &'static str {
        paths::LINE
    }

    fn owner_key(&self) -> Option<String> {
        Some(self.record_id.clone())
    }

    fn occurrences(&self, field: &str, instance: usize) -> usize {
        let analysis = self.analysis.get(instance);
        let tax = self.tax.get(instance);
        match field {
            "AccountID" => present(&self.account_id),
            "Description" => present(&self.description),
            "DebitAmount|CreditAmount" => sides(self.debit.as_ref(), self.credit.as_ref()),
            "CustomerID|SupplierID" => present(&self.customer_id) + present(&self.supplier_id),
            "ValueDate" => present(&self.value_date),
            "DueDate" => present(&self.due_date),
            "ReferenceNumber" => present(&self.reference_number),
            "Analysis" => self.analysis.len(),
            "Analysis/AnalysisType" => analysis.map_or(0, |a| present(&a.analysis_type)),
            "Analysis/AnalysisID" => analysis.map_or(0, |a| present(&a.analysis_id)),
            "Analysis/AnalysisAmount" => analysis.map_or(0, |a| legacy(&a.amount)),
            "Analysis/DebitAnalysisAmount|CreditAnalysisAmount" => analysis.map_or(0, |a| sided(&a.amount)),
            "TaxInformation" => self.tax.len(),
            "TaxInformation/TaxType" => tax.map_or(0, |t| present(&t.tax_type)),
            "TaxInformation/TaxCode" => tax.map_or(0, |t| present(&t.tax_code)),
            "TaxInformation/TaxAmount" => tax.map_or(0, |t| legacy(&t.amount)),
            "TaxInformation/DebitTaxAmount|CreditTaxAmount" => tax.map_or(0, |t| sided(&t.amount)),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use rust_decimal_macros::dec;

    fn line() -> Line {
        Line {
            record_id: "7".into(),
            account_id: Some("3000".into()),
            analysis: Vec::new(),
            value_date: None,
            source_document_id: None,
            customer_id: None,
            supplier_id: None,
            description: Some("Salg".into()),
            debit: None,
            credit: Some(Amount::new(dec!(1000))),
            tax: Vec::new(),
            reference_number: None,
            due_date: None,
        }
    }

    fn run<E: Observed>(entity: &E, version: SchemaVersion) -> Vec<Finding> {
        let mut out = Vec::new();
        check(entity, version, &mut out);
        out
    }

    #[test]
    fn complete_line_is_clean() {
        assert!(run(&line(), SchemaVersion::V1_3).is_empty());
    }

    #[test]
    fn both_parties_is_a_choice_conflict() {
        let mut l = line();
        l.customer_id = Some("K1".into());
        l.supplier_id = Some("L1".into());
        for version in [SchemaVersion::V1_2, SchemaVersion::V1_3] {
            let findings = run(&l, version);
            assert_eq!(findings.len(), 1);
            assert_eq!(findings[0].code, FindingCode::ChoiceConflict);
            assert_eq!(findings[0].severity, Severity::Error);
            assert_eq!(findings[0].owner_key.as_deref(), Some("7"));
        }
    }

    #[test]
    fn zero_opposite_side_is_tolerated() {
        let mut l = line();
        l.debit = Some(Amount::new(dec!(0)));
        assert!(run(&l, SchemaVersion::V1_3).is_empty());
        l.debit = Some(Amount::new(dec!(5)));
        assert_eq!(run(&l, SchemaVersion::V1_3)[0].code, FindingCode::ChoiceConflict);
    }

    #[test]
    fn missing_account_id() {
        let mut l = line();
        l.account_id = None;
        let findings = run(&l, SchemaVersion::V1_3);
        assert_eq!(findings[0].code, FindingCode::MissingField);
        assert_eq!(
            findings[0].element_path,
            "GeneralLedgerEntries/Journal/Transaction/Line/AccountID"
        );
    }

    #[test]
    fn legacy_tax_amount_is_deprecated_in_1_3() {
        let mut l = line();
        l.tax.push(TaxInformation {
            tax_type: Some("MVA".into()),
            tax_code: Some("3".into()),
            tax_percentage: Some(dec!(25)),
            tax_base: Some(dec!(800)),
            amount: Some(TaggedAmount::Legacy(Amount::new(dec!(200)))),
        });
        assert!(run(&l, SchemaVersion::V1_2).is_empty());
        let findings = run(&l, SchemaVersion::V1_3);
        let codes: Vec<_> = findings.iter().map(|f| f.code).collect();
        assert!(codes.contains(&FindingCode::DeprecatedField));
        // the 1.3 pair is then missing as well
        assert!(codes.contains(&FindingCode::MissingField));
        let deprecated = findings
            .iter()
            .find(|f| f.code == FindingCode::DeprecatedField)
            .unwrap();
        assert_eq!(deprecated.severity, Severity::Warning);
    }

    #[test]
    fn selection_criteria_depends_on_version() {
        let header = Header {
            audit_file_version: Some("1.20".into()),
            audit_file_country: Some("NO".into()),
            audit_file_date_created: chrono::NaiveDate::from_ymd_opt(2025, 3, 1),
            software_company_name: Some("x".into()),
            software_id: Some("x".into()),
            software_version: Some("1".into()),
            company: Some(Company {
                registration_number: Some("999999999".into()),
                name: Some("Test AS".into()),
                ..Default::default()
            }),
            default_currency_code: Some("NOK".into()),
            tax_accounting_basis: Some("A".into()),
            ..Default::default()
        };
        assert!(run(&header, SchemaVersion::V1_2).is_empty());
        let findings = run(&header, SchemaVersion::V1_3);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].element_path, "Header/SelectionCriteria");
    }

    #[test]
    fn grouping_code_in_1_2_is_not_in_version() {
        let account = Account {
            id: "1920".into(),
            description: Some("Bank".into()),
            standard_account_id: Some("19".into()),
            grouping_category: None,
            grouping_code: Some("1920".into()),
            account_type: Some("GL".into()),
            opening: BalancePair {
                debit: Some(dec!(0)),
                credit: None,
            },
            closing: BalancePair {
                debit: Some(dec!(0)),
                credit: None,
            },
        };
        let findings = run(&account, SchemaVersion::V1_2);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, FindingCode::FieldNotInVersion);
    }
}
