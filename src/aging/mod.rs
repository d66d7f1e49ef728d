//! Aging of open sub-ledger (reskontro) lines.
//!
//! The age of a line is counted from its basis date, chosen by a fixed
//! policy. Each record states which rung of the policy produced its date:
//!
//! | Source | Basis date |
//! |--------|------------|
//! | `Exact` | `DueDate` of the line |
//! | `Estimated` | `TransactionDate` (or `GLPostingDate`) plus the party's payment days |
//! | `Fallback(GlPostingDate)` | `GLPostingDate` |
//! | `Fallback(TransactionDate)` | `TransactionDate` |
//!
//! Lines with none of these dates are listed as unresolved.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{SaftError, check_boundaries};
use crate::model::{AuditFile, Line, PartyRole, Transaction};

/// Age bucket of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBucket {
    /// Basis date lies after the as-of date.
    NotDue,
    /// `from..=to` days.
    Range { from: u32, to: u32 },
    /// More than the last boundary.
    Over(u32),
}

impl AgeBucket {
    /// Place `age_days` into the buckets defined by strictly increasing
    /// `boundaries`: `[30, 60, 90]` gives `0–30`, `31–60`, `61–90`, `90+`.
    pub fn for_age(age_days: i64, boundaries: &[u32]) -> Self {
        if age_days < 0 {
            return Self::NotDue;
        }
        let mut from = 0;
        for &to in boundaries {
            if age_days <= i64::from(to) {
                return Self::Range { from, to };
            }
            from = to + 1;
        }
        Self::Over(boundaries.last().copied().unwrap_or(0))
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDue => f.write_str("not due"),
            Self::Range { from, to } => write!(f, "{from}–{to}"),
            Self::Over(days) => write!(f, "{days}+"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackDate {
    GlPostingDate,
    TransactionDate,
}

/// Where the basis date of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisSource {
    Exact,
    Estimated,
    Fallback(FallbackDate),
}

impl BasisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Estimated => "estimated",
            Self::Fallback(_) => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingRecord {
    /// `RecordID` of the line.
    pub line_key: String,
    pub role: PartyRole,
    pub party_id: String,
    pub account_id: Option<String>,
    /// Debit minus credit.
    pub amount: Decimal,
    pub basis_date: NaiveDate,
    pub basis_source: BasisSource,
    pub age_days: i64,
    pub bucket: AgeBucket,
}

/// An open line without any usable date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedLine {
    pub line_key: String,
    pub role: PartyRole,
    pub party_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTotal {
    pub bucket: AgeBucket,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyAging {
    pub role: PartyRole,
    pub party_id: String,
    /// Non-empty buckets, youngest first.
    pub buckets: Vec<BucketTotal>,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub boundaries: Vec<u32>,
    /// In posting order.
    pub records: Vec<AgingRecord>,
    pub unresolved: Vec<UnresolvedLine>,
}

impl AgingReport {
    /// Bucket totals per party, ordered by role and party id.
    pub fn totals_by_party(&self) -> Vec<PartyAging> {
        let mut parties: BTreeMap<(PartyRole, &str), BTreeMap<AgeBucket, Decimal>> = BTreeMap::new();
        for record in &self.records {
            *parties
                .entry((record.role, record.party_id.as_str()))
                .or_default()
                .entry(record.bucket)
                .or_default() += record.amount;
        }
        parties
            .into_iter()
            .map(|((role, party_id), buckets)| PartyAging {
                role,
                party_id: party_id.to_string(),
                total: buckets.values().copied().sum(),
                buckets: buckets
                    .into_iter()
                    .map(|(bucket, amount)| BucketTotal { bucket, amount })
                    .collect(),
            })
            .collect()
    }
}

/// Choose the basis date of a line.
pub fn basis_date(
    line: &Line,
    tx: &Transaction,
    payment_days: Option<u32>,
) -> Option<(NaiveDate, BasisSource)> {
    if let Some(due) = line.due_date {
        return Some((due, BasisSource::Exact));
    }
    if let Some(days) = payment_days {
        let estimated = tx
            .transaction_date
            .or(tx.gl_posting_date)
            .and_then(|d| d.checked_add_days(Days::new(u64::from(days))));
        if let Some(date) = estimated {
            return Some((date, BasisSource::Estimated));
        }
    }
    tx.gl_posting_date
        .map(|d| (d, BasisSource::Fallback(FallbackDate::GlPostingDate)))
        .or_else(|| {
            tx.transaction_date
                .map(|d| (d, BasisSource::Fallback(FallbackDate::TransactionDate)))
        })
}

/// Age all open reskontro lines of `file` as of `as_of`.
///
/// Lines posted after `as_of` are left out. Lines sharing role, party and
/// `ReferenceNumber` whose amounts net to zero count as settled.
pub fn age(file: &AuditFile, as_of: NaiveDate, boundaries: &[u32]) -> Result<AgingReport, SaftError> {
    check_boundaries(boundaries)?;

    let posted = |tx: &Transaction| {
        tx.gl_posting_date
            .or(tx.transaction_date)
            .is_none_or(|d| d <= as_of)
    };
    let candidates: Vec<(&Transaction, &Line, PartyRole, &str)> = file
        .lines()
        .filter(|(tx, _)| posted(*tx))
        .filter_map(|(tx, line)| line.party().map(|(role, id)| (tx, line, role, id)))
        .collect();

    let mut nets: HashMap<(PartyRole, &str, &str), Decimal> = HashMap::new();
    for &(_, line, role, party_id) in &candidates {
        if let Some(reference) = line.reference_number.as_deref() {
            *nets.entry((role, party_id, reference)).or_default() += line.signed_amount();
        }
    }

    let mut report = AgingReport {
        as_of,
        boundaries: boundaries.to_vec(),
        records: Vec::new(),
        unresolved: Vec::new(),
    };
    for (tx, line, role, party_id) in candidates {
        let settled = line
            .reference_number
            .as_deref()
            .and_then(|r| nets.get(&(role, party_id, r)))
            .is_some_and(|net| net.is_zero());
        if settled {
            continue;
        }
        let payment_days = file.party(role, party_id).and_then(|p| p.payment_terms_days);
        let Some((basis_date, basis_source)) = basis_date(line, tx, payment_days) else {
            report.unresolved.push(UnresolvedLine {
                line_key: line.record_id.clone(),
                role,
                party_id: party_id.to_string(),
                amount: line.signed_amount(),
            });
            continue;
        };
        let age_days = (as_of - basis_date).num_days();
        report.records.push(AgingRecord {
            line_key: line.record_id.clone(),
            role,
            party_id: party_id.to_string(),
            account_id: line.account_id.clone(),
            amount: line.signed_amount(),
            basis_date,
            basis_source,
            age_days,
            bucket: AgeBucket::for_age(age_days, boundaries),
        });
    }
    debug!(
        %as_of,
        records = report.records.len(),
        unresolved = report.unresolved.len(),
        "aging computed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(gl: Option<NaiveDate>, txd: Option<NaiveDate>) -> Transaction {
        Transaction {
            id: "T1".into(),
            period: Some(2),
            period_year: Some(2025),
            transaction_date: txd,
            source_id: None,
            transaction_type: None,
            description: None,
            batch_id: None,
            system_entry_date: None,
            gl_posting_date: gl,
            system_id: None,
            voucher_type: None,
            voucher_description: None,
            modification_date: None,
            lines: Vec::new(),
        }
    }

    fn line(due: Option<NaiveDate>) -> Line {
        Line {
            record_id: "1".into(),
            account_id: Some("1500".into()),
            analysis: Vec::new(),
            value_date: None,
            source_document_id: None,
            customer_id: Some("K1".into()),
            supplier_id: None,
            description: None,
            debit: Some(Amount::new(dec!(1250))),
            credit: None,
            tax: Vec::new(),
            reference_number: Some("F-1001".into()),
            due_date: due,
        }
    }

    #[test]
    fn bucket_labels() {
        let b = [30, 60, 90];
        assert_eq!(AgeBucket::for_age(-3, &b).to_string(), "not due");
        assert_eq!(AgeBucket::for_age(0, &b).to_string(), "0–30");
        assert_eq!(AgeBucket::for_age(30, &b).to_string(), "0–30");
        assert_eq!(AgeBucket::for_age(31, &b).to_string(), "31–60");
        assert_eq!(AgeBucket::for_age(90, &b).to_string(), "61–90");
        assert_eq!(AgeBucket::for_age(91, &b).to_string(), "90+");
    }

    #[test]
    fn due_date_is_exact() {
        let t = tx(Some(date(2025, 1, 10)), Some(date(2025, 1, 5)));
        let got = basis_date(&line(Some(date(2025, 2, 4))), &t, Some(14)).unwrap();
        assert_eq!(got, (date(2025, 2, 4), BasisSource::Exact));
    }

    #[test]
    fn payment_terms_give_an_estimate() {
        let t = tx(Some(date(2025, 1, 10)), Some(date(2025, 1, 5)));
        let got = basis_date(&line(None), &t, Some(14)).unwrap();
        assert_eq!(got, (date(2025, 1, 19), BasisSource::Estimated));
    }

    #[test]
    fn fallback_chain() {
        let t = tx(Some(date(2025, 1, 10)), Some(date(2025, 1, 5)));
        assert_eq!(
            basis_date(&line(None), &t, None),
            Some((date(2025, 1, 10), BasisSource::Fallback(FallbackDate::GlPostingDate)))
        );
        let t = tx(None, Some(date(2025, 1, 5)));
        assert_eq!(
            basis_date(&line(None), &t, None),
            Some((date(2025, 1, 5), BasisSource::Fallback(FallbackDate::TransactionDate)))
        );
        assert_eq!(basis_date(&line(None), &tx(None, None), None), None);
    }

    #[test]
    fn source_labels() {
        assert_eq!(BasisSource::Exact.as_str(), "exact");
        assert_eq!(BasisSource::Fallback(FallbackDate::GlPostingDate).as_str(), "fallback");
    }
}
