//! Debit/credit balancing, control totals, trial balance and reconciliation
//! of declared balances, plus the audit controls built on top of them.
//!
//! All sums are exact [`Decimal`] arithmetic. Two amounts are equal when
//! their values are equal, whatever their scale (`100` == `100.00`).

mod controls;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Finding, FindingCode, SaftConfig};
use crate::decode::values::format_decimal;
use crate::model::{AuditFile, BalancePair, PartyRole, paths};

pub use controls::{PeriodActivity, SubLedgerReconciliation};

/// Aggregated movements of one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balances {
    pub transactions: u64,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub journals: Vec<JournalTotals>,
    /// Trial balance keyed by AccountID.
    pub accounts: BTreeMap<String, AccountTotals>,
    /// Sub-ledger balances, sorted by role, party and account.
    pub parties: Vec<PartyTotals>,
    /// Control accounts against their party balances, by AccountID.
    pub sub_ledgers: Vec<SubLedgerReconciliation>,
    /// Months of the selection with their transaction counts.
    pub periods: Vec<PeriodActivity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalTotals {
    pub journal_id: String,
    pub transactions: usize,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// One row of the trial balance. Balances are net, debit positive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub opening: Option<Decimal>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub declared_closing: Option<Decimal>,
}

impl AccountTotals {
    /// Opening plus movements.
    pub fn computed_closing(&self) -> Decimal {
        self.opening.unwrap_or_default() + self.debit - self.credit
    }

    /// `computed - declared`, when both balances are declared and differ.
    pub fn reconciliation_difference(&self) -> Option<Decimal> {
        self.opening?;
        let declared = self.declared_closing?;
        let difference = self.computed_closing() - declared;
        (!difference.is_zero()).then_some(difference)
    }

    fn declare(&mut self, opening: &BalancePair, closing: &BalancePair) {
        self.opening = opening.is_declared().then(|| opening.net());
        self.declared_closing = closing.is_declared().then(|| closing.net());
    }
}

/// Movements of one party on one ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyTotals {
    pub role: PartyRole,
    pub party_id: String,
    pub account_id: Option<String>,
    #[serde(flatten)]
    pub totals: AccountTotals,
}

/// Compute balances and the balance findings.
pub fn compute(file: &AuditFile, config: &SaftConfig) -> (Balances, Vec<Finding>) {
    let mut findings = Vec::new();
    let mut balances = Balances::default();

    for journal in &file.entries.journals {
        let mut totals = JournalTotals {
            journal_id: journal.id.clone(),
            transactions: journal.transactions.len(),
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
        };
        for tx in &journal.transactions {
            let debit = tx.total_debit();
            let credit = tx.total_credit();
            if debit != credit {
                let difference = debit - credit;
                findings.push(
                    Finding::error(
                        FindingCode::UnbalancedTransaction,
                        paths::TRANSACTION,
                        format!(
                            "debit {} does not equal credit {}, difference {}",
                            format_decimal(debit),
                            format_decimal(credit),
                            format_decimal(difference)
                        ),
                    )
                    .owned_by(Some(tx.id.clone()))
                    .with_amount(difference),
                );
            }
            totals.debit += debit;
            totals.credit += credit;
        }
        balances.transactions += journal.transactions.len() as u64;
        balances.total_debit += totals.debit;
        balances.total_credit += totals.credit;
        balances.journals.push(totals);
    }

    check_control_totals(file, &balances, &mut findings);

    for account in &file.master_files.accounts {
        balances
            .accounts
            .entry(account.id.clone())
            .or_default()
            .declare(&account.opening, &account.closing);
    }
    let mut parties: BTreeMap<(PartyRole, String, Option<String>), AccountTotals> = BTreeMap::new();
    for party in file
        .master_files
        .customers
        .iter()
        .chain(&file.master_files.suppliers)
    {
        for balance in &party.balance_accounts {
            parties
                .entry((party.role, party.id.clone(), balance.account_id.clone()))
                .or_default()
                .declare(&balance.opening, &balance.closing);
        }
    }

    for (_, line) in file.lines() {
        let (debit, credit) = (line.debit_amount(), line.credit_amount());
        if let Some(account_id) = &line.account_id {
            let totals = balances.accounts.entry(account_id.clone()).or_default();
            totals.debit += debit;
            totals.credit += credit;
        }
        if let Some((role, party_id)) = line.party() {
            let totals = parties
                .entry((role, party_id.to_string(), line.account_id.clone()))
                .or_default();
            totals.debit += debit;
            totals.credit += credit;
        }
    }

    let severity = config.reconciliation_severity;
    for (account_id, totals) in &balances.accounts {
        if let Some(difference) = totals.reconciliation_difference() {
            findings.push(
                Finding::new(
                    severity,
                    FindingCode::ReconciliationMismatch,
                    format!("{}/ClosingDebitBalance|ClosingCreditBalance", paths::ACCOUNT),
                    reconciliation_message(totals, difference),
                )
                .owned_by(Some(account_id.clone()))
                .with_amount(difference),
            );
        }
    }
    for ((role, party_id, account_id), totals) in parties {
        if let Some(difference) = totals.reconciliation_difference() {
            let base = match role {
                PartyRole::Customer => paths::CUSTOMER,
                PartyRole::Supplier => paths::SUPPLIER,
            };
            let on = account_id.as_deref().unwrap_or("?");
            findings.push(
                Finding::new(
                    severity,
                    FindingCode::ReconciliationMismatch,
                    format!("{base}/BalanceAccount"),
                    format!("account {on}: {}", reconciliation_message(&totals, difference)),
                )
                .owned_by(Some(party_id.clone()))
                .with_amount(difference),
            );
        }
        balances.parties.push(PartyTotals {
            role,
            party_id,
            account_id,
            totals,
        });
    }

    balances.sub_ledgers =
        controls::reconcile_sub_ledgers(&balances.accounts, &balances.parties, &mut findings);
    controls::check_balance_sides(&balances.parties, &mut findings);
    balances.periods = controls::period_completeness(file, &mut findings);

    debug!(
        transactions = balances.transactions,
        findings = findings.len(),
        "balances computed"
    );
    (balances, findings)
}

/// Only the findings of [`compute`].
pub fn check(file: &AuditFile, config: &SaftConfig) -> Vec<Finding> {
    compute(file, config).1
}

fn reconciliation_message(totals: &AccountTotals, difference: Decimal) -> String {
    format!(
        "opening {} plus movements gives {}, declared closing is {} (difference {})",
        format_decimal(totals.opening.unwrap_or_default()),
        format_decimal(totals.computed_closing()),
        format_decimal(totals.declared_closing.unwrap_or_default()),
        format_decimal(difference)
    )
}

fn check_control_totals(file: &AuditFile, balances: &Balances, findings: &mut Vec<Finding>) {
    let entries = &file.entries;
    if let Some(declared) = entries.number_of_entries {
        if declared != balances.transactions {
            findings.push(Finding::error(
                FindingCode::ControlTotalMismatch,
                format!("{}/NumberOfEntries", paths::ENTRIES),
                format!(
                    "declared {declared} entries, found {} transactions",
                    balances.transactions
                ),
            ));
        }
    }
    let sums = [
        ("TotalDebit", entries.total_debit, balances.total_debit),
        ("TotalCredit", entries.total_credit, balances.total_credit),
    ];
    for (field, declared, computed) in sums {
        let Some(declared) = declared else { continue };
        if declared != computed {
            findings.push(
                Finding::error(
                    FindingCode::ControlTotalMismatch,
                    format!("{}/{field}", paths::ENTRIES),
                    format!(
                        "declared {} but lines sum to {}",
                        format_decimal(declared),
                        format_decimal(computed)
                    ),
                )
                .with_amount(computed - declared),
            );
        }
    }
}
