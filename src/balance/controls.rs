//! Audit controls over computed balances: sub-ledger reconciliation,
//! period completeness and balances on the unexpected side.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AccountTotals, PartyTotals};
use crate::core::{Finding, FindingCode};
use crate::decode::values::format_decimal;
use crate::model::{AuditFile, PartyRole, SelectionCriteria, paths};

/// Selections spanning more months than this are not checked for gaps.
const MAX_SELECTION_MONTHS: i64 = 120;

/// A control account next to the sum of the party balances posted to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubLedgerReconciliation {
    pub account_id: String,
    /// Computed closing balance of the account in the trial balance.
    pub general_ledger: Decimal,
    /// Sum of the computed closing balances of all parties on the account.
    pub sub_ledger: Decimal,
}

impl SubLedgerReconciliation {
    /// `general_ledger - sub_ledger`.
    pub fn difference(&self) -> Decimal {
        self.general_ledger - self.sub_ledger
    }
}

/// Posting activity of one calendar month inside the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodActivity {
    pub year: i32,
    pub month: u32,
    pub transactions: usize,
}

impl PeriodActivity {
    /// `YYYY-MM`.
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Reconcile every account that carries party balances against the sum of
/// those balances.
pub(super) fn reconcile_sub_ledgers(
    accounts: &BTreeMap<String, AccountTotals>,
    parties: &[PartyTotals],
    findings: &mut Vec<Finding>,
) -> Vec<SubLedgerReconciliation> {
    let mut sub_ledgers: BTreeMap<&str, Decimal> = BTreeMap::new();
    for party in parties {
        if let Some(account_id) = party.account_id.as_deref() {
            *sub_ledgers.entry(account_id).or_default() += party.totals.computed_closing();
        }
    }

    let mut rows = Vec::with_capacity(sub_ledgers.len());
    for (account_id, sub_ledger) in sub_ledgers {
        let general_ledger = accounts
            .get(account_id)
            .map(AccountTotals::computed_closing)
            .unwrap_or_default();
        let row = SubLedgerReconciliation {
            account_id: account_id.to_string(),
            general_ledger,
            sub_ledger,
        };
        let difference = row.difference();
        if !difference.is_zero() {
            findings.push(
                Finding::warning(
                    FindingCode::SubLedgerMismatch,
                    paths::ACCOUNT,
                    format!(
                        "general ledger balance {} differs from the party balances {} (difference {})",
                        format_decimal(general_ledger),
                        format_decimal(sub_ledger),
                        format_decimal(difference)
                    ),
                )
                .owned_by(Some(row.account_id.clone()))
                .with_amount(difference),
            );
        }
        rows.push(row);
    }
    rows
}

/// Customers should not owe negative amounts and suppliers should not be
/// owed by the company.
pub(super) fn check_balance_sides(parties: &[PartyTotals], findings: &mut Vec<Finding>) {
    let mut nets: BTreeMap<(PartyRole, &str), Decimal> = BTreeMap::new();
    for party in parties {
        *nets.entry((party.role, party.party_id.as_str())).or_default() += party.totals.computed_closing();
    }
    for ((role, party_id), net) in nets {
        let (base, side) = match role {
            PartyRole::Customer if net < Decimal::ZERO => (paths::CUSTOMER, "credit"),
            PartyRole::Supplier if net > Decimal::ZERO => (paths::SUPPLIER, "debit"),
            _ => continue,
        };
        findings.push(
            Finding::warning(
                FindingCode::OppositeBalance,
                base,
                format!(
                    "{} has a {side} balance of {}",
                    role.as_str().to_lowercase(),
                    format_decimal(net)
                ),
            )
            .owned_by(Some(party_id.to_string()))
            .with_amount(net),
        );
    }
}

/// Count transactions per month of the selection and report empty months.
///
/// A transaction belongs to the month of its `GLPostingDate`, or of its
/// `TransactionDate` when no posting date is present.
pub(super) fn period_completeness(file: &AuditFile, findings: &mut Vec<Finding>) -> Vec<PeriodActivity> {
    let Some((first, last)) = file
        .header
        .selection_criteria
        .as_ref()
        .and_then(selection_months)
    else {
        return Vec::new();
    };
    let span = month_index(last) - month_index(first) + 1;
    if span > MAX_SELECTION_MONTHS {
        debug!(span, "selection too long for a period completeness check");
        return Vec::new();
    }

    let mut posted: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for tx in file.transactions() {
        if let Some(date) = tx.gl_posting_date.or(tx.transaction_date) {
            *posted.entry((date.year(), date.month())).or_default() += 1;
        }
    }

    let mut rows = Vec::new();
    for index in month_index(first)..=month_index(last) {
        let (year, month) = from_month_index(index);
        let row = PeriodActivity {
            year,
            month,
            transactions: posted.get(&(year, month)).copied().unwrap_or_default(),
        };
        if row.transactions == 0 {
            let label = row.label();
            findings.push(
                Finding::warning(
                    FindingCode::PeriodWithoutPostings,
                    format!("{}/SelectionCriteria", paths::HEADER),
                    format!("no transactions posted in {label}"),
                )
                .owned_by(Some(label)),
            );
        }
        rows.push(row);
    }
    rows
}

/// First and last `(year, month)` of the selection, inclusive.
///
/// Selection dates win over periods. Periods are read as calendar months,
/// so closing periods past 12 count as December.
fn selection_months(criteria: &SelectionCriteria) -> Option<((i32, u32), (i32, u32))> {
    let by_date = |d: NaiveDate| (d.year(), d.month());
    let by_period = |period: u32, year: i32| (year, period.clamp(1, 12));
    let first = match (criteria.start_date, criteria.period_start, criteria.period_start_year) {
        (Some(date), _, _) => by_date(date),
        (None, Some(period), Some(year)) => by_period(period, year),
        _ => return None,
    };
    let last = match (criteria.end_date, criteria.period_end, criteria.period_end_year) {
        (Some(date), _, _) => by_date(date),
        (None, Some(period), Some(year)) => by_period(period, year),
        _ => return None,
    };
    (first <= last).then_some((first, last))
}

/// Months since year zero, January being 0.
fn month_index((year, month): (i32, u32)) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

fn from_month_index(index: i64) -> (i32, u32) {
    // In range: both ends came from an i32 year and a month in 1..=12.
    let year = i32::try_from(index.div_euclid(12)).unwrap_or(i32::MAX);
    (year, index.rem_euclid(12) as u32 + 1)
}
