//! Flow service - transfer reconciliation and flow aggregation
//!
//! Reconciles the two halves of each transfer (the debit on one account,
//! the credit on another) and aggregates the matched pairs into directed
//! flow edges: which account funded which, how much, how many times.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::{Transaction, TransactionKind};

/// Flow service for transfer flow reports
pub struct FlowService {
    repository: Arc<DuckDbRepository>,
}

impl FlowService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Compute directed transfer flows over an inclusive date range.
    ///
    /// Either bound may be absent. A present-but-inverted range is a
    /// validation error, rejected before any ledger read. The result is
    /// sorted by total amount descending; an empty ledger yields an empty
    /// list, never an error.
    pub fn transfer_flows(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<TransferFlowReport> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                anyhow::bail!("start_date must be on or before end_date");
            }
        }

        let transactions = self
            .repository
            .get_transfer_transactions(start_date, end_date)?;
        let account_names: HashMap<Uuid, String> = self
            .repository
            .get_accounts()?
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect();

        let totals = compute_flows(&transactions, &account_names);

        // Totals accumulate as Decimal; f64 only at the serialization edge
        let transfers = totals
            .into_iter()
            .map(|t| TransferFlow {
                source_account_id: t.source_account_id.to_string(),
                source_account_name: t.source_account_name,
                destination_account_id: t.destination_account_id.to_string(),
                destination_account_name: t.destination_account_name,
                total_amount: t.total_amount.to_f64().unwrap_or(0.0),
                transfer_count: t.transfer_count,
            })
            .collect();

        Ok(TransferFlowReport { transfers })
    }
}

/// A directed flow edge between an ordered pair of accounts
#[derive(Debug, Clone, Serialize)]
pub struct TransferFlow {
    pub source_account_id: String,
    pub source_account_name: String,
    pub destination_account_id: String,
    pub destination_account_name: String,
    pub total_amount: f64,
    pub transfer_count: i64,
}

/// Flow report, serialized by the caller as `{"data": {"transfers": [...]}}`
#[derive(Debug, Serialize)]
pub struct TransferFlowReport {
    pub transfers: Vec<TransferFlow>,
}

// ============================================================================
// Engine stages
//
// Pure functions over immutable input; the service above is just the
// fetch-then-compute wrapper. Nothing here holds state across calls.
// ============================================================================

/// One half of a transfer: a single account's debit or credit entry.
/// FIFO order within a bucket is carried by Vec position.
#[derive(Debug, Clone)]
struct Leg {
    account_id: Uuid,
    account_name: String,
    date: NaiveDate,
    magnitude: Decimal,
}

/// One out-leg bound to one in-leg: a single realized transfer
#[derive(Debug, Clone)]
struct MatchedPair {
    source_account_id: Uuid,
    source_account_name: String,
    destination_account_id: Uuid,
    destination_account_name: String,
    amount: Decimal,
    date: NaiveDate,
}

/// Aggregated matched pairs for one ordered (source, destination) key,
/// with the total still in exact decimal form
#[derive(Debug, Clone)]
struct FlowTotal {
    source_account_id: Uuid,
    source_account_name: String,
    destination_account_id: Uuid,
    destination_account_name: String,
    total_amount: Decimal,
    transfer_count: i64,
}

/// Split transfer records into outgoing and incoming legs, preserving
/// relative input order.
///
/// Non-transfer records are skipped (the repository already filters on
/// kind, but an unfiltered set must not break anything), as are
/// zero-amount records and records pointing at an unknown account.
fn extract_legs(
    transactions: &[Transaction],
    account_names: &HashMap<Uuid, String>,
) -> (Vec<Leg>, Vec<Leg>) {
    let mut out_legs = Vec::new();
    let mut in_legs = Vec::new();

    for tx in transactions {
        if tx.kind != TransactionKind::Transfer {
            continue;
        }
        let Some(name) = account_names.get(&tx.account_id) else {
            // Orphaned record; one bad row must not deny the report
            continue;
        };
        let leg = Leg {
            account_id: tx.account_id,
            account_name: name.clone(),
            date: tx.transaction_date,
            magnitude: tx.amount.abs(),
        };
        if tx.amount < Decimal::ZERO {
            out_legs.push(leg);
        } else if tx.amount > Decimal::ZERO {
            in_legs.push(leg);
        }
        // amount == 0 contributes nothing to any flow
    }

    (out_legs, in_legs)
}

/// Pair outgoing legs with incoming legs.
///
/// Legs are bucketed by (date, magnitude) and paired first-in-first-out
/// within each bucket: when several transfers share a day and an amount
/// there is no signal beyond insertion order to tell which debit funded
/// which credit. A debit never pairs with a credit on its own account;
/// the credit goes back to the tail of the queue and the next candidate
/// is tried. Legs whose counterpart never appears stay unmatched and
/// produce no output.
fn match_legs(out_legs: Vec<Leg>, in_legs: Vec<Leg>) -> Vec<MatchedPair> {
    #[derive(Default)]
    struct Bucket {
        out: VecDeque<Leg>,
        inc: VecDeque<Leg>,
    }

    // BTreeMap: buckets are visited in (date, magnitude) order, so the
    // pair stream - and with it the insertion-order tie-break downstream -
    // is reproducible across runs.
    let mut buckets: BTreeMap<(NaiveDate, Decimal), Bucket> = BTreeMap::new();
    for leg in out_legs {
        buckets
            .entry((leg.date, leg.magnitude))
            .or_default()
            .out
            .push_back(leg);
    }
    for leg in in_legs {
        buckets
            .entry((leg.date, leg.magnitude))
            .or_default()
            .inc
            .push_back(leg);
    }

    let mut pairs = Vec::new();
    for ((date, amount), mut bucket) in buckets {
        while !bucket.inc.is_empty() {
            let Some(out_leg) = bucket.out.pop_front() else {
                break;
            };

            // Try each credit in the bucket at most once for this debit
            let mut candidates = bucket.inc.len();
            while candidates > 0 {
                let Some(in_leg) = bucket.inc.pop_front() else {
                    break;
                };
                if in_leg.account_id == out_leg.account_id {
                    // A transaction cannot transfer to itself; requeue and
                    // retry with the next credit
                    bucket.inc.push_back(in_leg);
                    candidates -= 1;
                    continue;
                }
                pairs.push(MatchedPair {
                    source_account_id: out_leg.account_id,
                    source_account_name: out_leg.account_name.clone(),
                    destination_account_id: in_leg.account_id,
                    destination_account_name: in_leg.account_name,
                    amount,
                    date,
                });
                break;
            }
            // No foreign-account credit in the bucket: the debit stays
            // unmatched and is dropped
        }
    }

    pairs
}

/// Sum matched pairs into one entry per ordered (source, destination)
/// pair, then sort by total descending.
///
/// Direction matters: A->B and B->A accumulate separately, never netted.
/// The sort is stable, so equal totals keep the order in which their
/// account pair was first observed in the pair stream.
fn aggregate_flows(pairs: Vec<MatchedPair>) -> Vec<FlowTotal> {
    let mut totals: Vec<FlowTotal> = Vec::new();
    let mut index: HashMap<(Uuid, Uuid), usize> = HashMap::new();

    for pair in pairs {
        let key = (pair.source_account_id, pair.destination_account_id);
        match index.get(&key) {
            Some(&i) => {
                totals[i].total_amount += pair.amount;
                totals[i].transfer_count += 1;
            }
            None => {
                index.insert(key, totals.len());
                totals.push(FlowTotal {
                    source_account_id: pair.source_account_id,
                    source_account_name: pair.source_account_name,
                    destination_account_id: pair.destination_account_id,
                    destination_account_name: pair.destination_account_name,
                    total_amount: pair.amount,
                    transfer_count: 1,
                });
            }
        }
    }

    totals.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
    totals
}

fn compute_flows(
    transactions: &[Transaction],
    account_names: &HashMap<Uuid, String>,
) -> Vec<FlowTotal> {
    let (out_legs, in_legs) = extract_legs(transactions, account_names);
    aggregate_flows(match_legs(out_legs, in_legs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(account_id: Uuid, cents: i64, date: NaiveDate, kind: TransactionKind) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            account_id,
            Decimal::new(cents, 2),
            date,
            kind,
        )
    }

    fn names(accounts: &[(Uuid, &str)]) -> HashMap<Uuid, String> {
        accounts
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_pair_produces_one_flow() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);
        let d = date(2024, 1, 15);

        let txs = vec![
            tx(checking, -50000, d, TransactionKind::Transfer),
            tx(savings, 50000, d, TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].source_account_name, "Checking");
        assert_eq!(flows[0].destination_account_name, "Savings");
        assert_eq!(flows[0].total_amount, Decimal::new(50000, 2));
        assert_eq!(flows[0].transfer_count, 1);
    }

    #[test]
    fn test_repeated_pair_aggregates() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);

        let txs = vec![
            tx(checking, -50000, date(2024, 1, 15), TransactionKind::Transfer),
            tx(savings, 50000, date(2024, 1, 15), TransactionKind::Transfer),
            tx(checking, -30000, date(2024, 1, 20), TransactionKind::Transfer),
            tx(savings, 30000, date(2024, 1, 20), TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].total_amount, Decimal::new(80000, 2));
        assert_eq!(flows[0].transfer_count, 2);
    }

    #[test]
    fn test_reverse_direction_stays_separate() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);

        let txs = vec![
            tx(checking, -50000, date(2024, 1, 15), TransactionKind::Transfer),
            tx(savings, 50000, date(2024, 1, 15), TransactionKind::Transfer),
            tx(savings, -20000, date(2024, 1, 18), TransactionKind::Transfer),
            tx(checking, 20000, date(2024, 1, 18), TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 2);
        // Sorted by total descending
        assert_eq!(flows[0].source_account_name, "Checking");
        assert_eq!(flows[0].total_amount, Decimal::new(50000, 2));
        assert_eq!(flows[1].source_account_name, "Savings");
        assert_eq!(flows[1].total_amount, Decimal::new(20000, 2));
    }

    #[test]
    fn test_non_transfer_records_ignored() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);
        let d = date(2024, 1, 15);

        let txs = vec![
            tx(checking, 500000, d, TransactionKind::Income),
            tx(checking, -20000, d, TransactionKind::Expense),
            tx(checking, -50000, d, TransactionKind::Transfer),
            tx(savings, 50000, d, TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].transfer_count, 1);
    }

    #[test]
    fn test_zero_amount_discarded() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);
        let d = date(2024, 1, 15);

        let txs = vec![
            tx(checking, 0, d, TransactionKind::Transfer),
            tx(savings, 0, d, TransactionKind::Transfer),
        ];

        assert!(compute_flows(&txs, &map).is_empty());
    }

    #[test]
    fn test_lone_leg_is_silent() {
        let checking = Uuid::new_v4();
        let map = names(&[(checking, "Checking")]);

        let txs = vec![tx(
            checking,
            -50000,
            date(2024, 1, 15),
            TransactionKind::Transfer,
        )];

        assert!(compute_flows(&txs, &map).is_empty());
    }

    #[test]
    fn test_mismatched_amounts_never_pair() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);
        let d = date(2024, 1, 15);

        let txs = vec![
            tx(checking, -50000, d, TransactionKind::Transfer),
            tx(savings, 49900, d, TransactionKind::Transfer),
        ];

        assert!(compute_flows(&txs, &map).is_empty());
    }

    #[test]
    fn test_same_account_credit_requeued() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();
        let map = names(&[(checking, "Checking"), (savings, "Savings")]);
        let d = date(2024, 1, 15);

        // The checking credit is first in the bucket, but a debit cannot
        // pair with its own account; the savings credit must win
        let txs = vec![
            tx(checking, -50000, d, TransactionKind::Transfer),
            tx(checking, 50000, d, TransactionKind::Transfer),
            tx(savings, 50000, d, TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].source_account_name, "Checking");
        assert_eq!(flows[0].destination_account_name, "Savings");
    }

    #[test]
    fn test_same_account_only_bucket_yields_nothing() {
        let checking = Uuid::new_v4();
        let map = names(&[(checking, "Checking")]);
        let d = date(2024, 1, 15);

        // A reversal: debit and credit on the same account, same day,
        // same amount. Must not be reported as a self-flow.
        let txs = vec![
            tx(checking, -50000, d, TransactionKind::Transfer),
            tx(checking, 50000, d, TransactionKind::Transfer),
        ];

        assert!(compute_flows(&txs, &map).is_empty());
    }

    #[test]
    fn test_no_self_flow_ever() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B")]);
        let d = date(2024, 3, 1);

        let txs = vec![
            tx(a, -10000, d, TransactionKind::Transfer),
            tx(a, 10000, d, TransactionKind::Transfer),
            tx(b, -10000, d, TransactionKind::Transfer),
            tx(b, 10000, d, TransactionKind::Transfer),
        ];

        for flow in compute_flows(&txs, &map) {
            assert_ne!(flow.source_account_id, flow.destination_account_id);
        }
    }

    #[test]
    fn test_fifo_pairing_within_bucket() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d_acc = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B"), (c, "C"), (d_acc, "D")]);
        let d = date(2024, 2, 10);

        // Two debits and two credits, same day and amount: first debit
        // takes the first credit, second takes the second
        let txs = vec![
            tx(a, -10000, d, TransactionKind::Transfer),
            tx(b, -10000, d, TransactionKind::Transfer),
            tx(c, 10000, d, TransactionKind::Transfer),
            tx(d_acc, 10000, d, TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 2);
        let pairs: Vec<(String, String)> = flows
            .iter()
            .map(|f| (f.source_account_name.clone(), f.destination_account_name.clone()))
            .collect();
        assert!(pairs.contains(&("A".to_string(), "C".to_string())));
        assert!(pairs.contains(&("B".to_string(), "D".to_string())));
    }

    #[test]
    fn test_equal_totals_keep_first_observed_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d_acc = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B"), (c, "C"), (d_acc, "D")]);

        // Two distinct account pairs with identical totals; the earlier
        // bucket date is observed first and must stay first
        let txs = vec![
            tx(a, -10000, date(2024, 2, 1), TransactionKind::Transfer),
            tx(b, 10000, date(2024, 2, 1), TransactionKind::Transfer),
            tx(c, -10000, date(2024, 2, 5), TransactionKind::Transfer),
            tx(d_acc, 10000, date(2024, 2, 5), TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].source_account_name, "A");
        assert_eq!(flows[1].source_account_name, "C");
    }

    #[test]
    fn test_conservation_of_matched_amounts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B"), (c, "C")]);

        let txs = vec![
            tx(a, -50000, date(2024, 1, 15), TransactionKind::Transfer),
            tx(b, 50000, date(2024, 1, 15), TransactionKind::Transfer),
            tx(a, -30000, date(2024, 1, 20), TransactionKind::Transfer),
            tx(b, 30000, date(2024, 1, 20), TransactionKind::Transfer),
            tx(b, -20000, date(2024, 1, 22), TransactionKind::Transfer),
            tx(c, 20000, date(2024, 1, 22), TransactionKind::Transfer),
            // Unmatched leg: contributes nothing
            tx(c, -77700, date(2024, 1, 25), TransactionKind::Transfer),
        ];

        let (out_legs, in_legs) = extract_legs(&txs, &map);
        let pairs = match_legs(out_legs, in_legs);
        let pair_sum: Decimal = pairs.iter().map(|p| p.amount).sum();

        let flows = aggregate_flows(pairs);
        let flow_sum: Decimal = flows.iter().map(|f| f.total_amount).sum();

        assert_eq!(pair_sum, flow_sum);
        assert_eq!(flow_sum, Decimal::new(100000, 2));
    }

    #[test]
    fn test_sort_order_is_non_increasing() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B"), (c, "C")]);

        let txs = vec![
            tx(a, -10000, date(2024, 1, 1), TransactionKind::Transfer),
            tx(b, 10000, date(2024, 1, 1), TransactionKind::Transfer),
            tx(a, -90000, date(2024, 1, 2), TransactionKind::Transfer),
            tx(c, 90000, date(2024, 1, 2), TransactionKind::Transfer),
            tx(b, -40000, date(2024, 1, 3), TransactionKind::Transfer),
            tx(c, 40000, date(2024, 1, 3), TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 3);
        for window in flows.windows(2) {
            assert!(window[0].total_amount >= window[1].total_amount);
        }
    }

    #[test]
    fn test_decimal_amounts_accumulate_exactly() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B")]);

        // 123.45 + 0.10, exactly
        let txs = vec![
            tx(a, -12345, date(2024, 1, 10), TransactionKind::Transfer),
            tx(b, 12345, date(2024, 1, 10), TransactionKind::Transfer),
            tx(a, -10, date(2024, 1, 11), TransactionKind::Transfer),
            tx(b, 10, date(2024, 1, 11), TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].total_amount, Decimal::new(12355, 2));
    }

    #[test]
    fn test_unknown_account_record_skipped() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let map = names(&[(a, "A"), (b, "B")]);
        let d = date(2024, 1, 15);

        let txs = vec![
            tx(Uuid::new_v4(), -50000, d, TransactionKind::Transfer),
            tx(a, -50000, d, TransactionKind::Transfer),
            tx(b, 50000, d, TransactionKind::Transfer),
        ];

        let flows = compute_flows(&txs, &map);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].source_account_name, "A");
    }
}
