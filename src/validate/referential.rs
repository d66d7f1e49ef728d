//! Key resolution of ledger lines and party balance accounts against MasterFiles.

use crate::core::{Finding, FindingCode};
use crate::model::{AuditFile, Line, PartyRole, paths};

/// Check every cross-reference of the model.
///
/// A line carrying both a customer and a supplier is reported once by the
/// structural checks; here each id is still resolved on its own.
pub fn validate(file: &AuditFile) -> Vec<Finding> {
    let mut out = Vec::new();
    for party in file
        .master_files
        .customers
        .iter()
        .chain(&file.master_files.suppliers)
    {
        let base = match party.role {
            PartyRole::Customer => paths::CUSTOMER,
            PartyRole::Supplier => paths::SUPPLIER,
        };
        for balance in &party.balance_accounts {
            let Some(account_id) = balance.account_id.as_deref() else {
                continue;
            };
            if file.account(account_id).is_none() {
                let at = if balance.inline {
                    "AccountID"
                } else {
                    "BalanceAccount/AccountID"
                };
                out.push(
                    Finding::error(
                        FindingCode::UnknownAccount,
                        format!("{base}/{at}"),
                        format!("balance account '{account_id}' is not in GeneralLedgerAccounts"),
                    )
                    .owned_by(Some(party.id.clone())),
                );
            }
        }
    }
    for (_, line) in file.lines() {
        check_line(file, line, &mut out);
    }
    out
}

fn check_line(file: &AuditFile, line: &Line, out: &mut Vec<Finding>) {
    let mut report = |code: FindingCode, field: &str, message: String| {
        out.push(
            Finding::error(code, format!("{}/{field}", paths::LINE), message)
                .owned_by(Some(line.record_id.clone())),
        );
    };

    if let Some(account_id) = line.account_id.as_deref() {
        if file.account(account_id).is_none() {
            report(
                FindingCode::UnknownAccount,
                "AccountID",
                format!("account '{account_id}' is not in GeneralLedgerAccounts"),
            );
        }
    }
    if let Some(id) = line.customer_id.as_deref() {
        if file.customer(id).is_none() {
            report(
                FindingCode::UnknownCustomer,
                "CustomerID",
                format!("customer '{id}' is not in Customers"),
            );
        }
    }
    if let Some(id) = line.supplier_id.as_deref() {
        if file.supplier(id).is_none() {
            report(
                FindingCode::UnknownSupplier,
                "SupplierID",
                format!("supplier '{id}' is not in Suppliers"),
            );
        }
    }
    for analysis in &line.analysis {
        let (Some(kind), Some(id)) = (analysis.analysis_type.as_deref(), analysis.analysis_id.as_deref())
        else {
            continue;
        };
        if file.analysis(kind, id).is_none() {
            report(
                FindingCode::UnknownAnalysis,
                "Analysis",
                format!("analysis '{kind}/{id}' is not in AnalysisTypeTable"),
            );
        }
    }
    for tax in &line.tax {
        let (Some(kind), Some(code)) = (tax.tax_type.as_deref(), tax.tax_code.as_deref()) else {
            continue;
        };
        if file.tax_code(kind, code).is_none() {
            report(
                FindingCode::UnknownTaxCode,
                "TaxInformation",
                format!("tax code '{kind}/{code}' is not in TaxTable"),
            );
        }
    }
}
