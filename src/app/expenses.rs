// SPDX-License-Identifier: GPL-3.0-only

//! Expense ledger
//!
//! Every successful share of a card with an amount is recorded as an
//! expense. Totals and graphs are computed over calendar periods in the
//! time zone of the `now` passed in, with weeks starting on Monday.

use crate::constants::storage_keys;
use crate::errors::StorageError;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Number of expenses shown in the recent list
pub const RECENT_LIMIT: usize = 5;

/// Graphs never scale below this value
const GRAPH_FLOOR: f64 = 100.0;

const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub id: String,
    pub amount: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExpenseSummary {
    pub week_total: f64,
    pub month_total: f64,
    pub year_total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphView {
    #[default]
    Week,
    Month,
    Year,
}

impl std::str::FromStr for GraphView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "week" => Ok(GraphView::Week),
            "month" => Ok(GraphView::Month),
            "year" => Ok(GraphView::Year),
            other => Err(format!("unknown graph view '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphData {
    pub kind: GraphKind,
    pub data: Vec<f64>,
    pub labels: Vec<String>,
    /// Scale maximum: the largest value, but at least 100
    pub max: f64,
}

pub struct ExpenseLedger {
    store: KeyValueStore,
    records: Vec<ExpenseRecord>,
}

impl ExpenseLedger {
    pub fn load(store: KeyValueStore) -> Result<Self, StorageError> {
        let records: Vec<ExpenseRecord> = store.get(storage_keys::EXPENSES)?.unwrap_or_default();
        debug!(count = records.len(), "Expense ledger loaded");
        Ok(Self { store, records })
    }

    pub fn records(&self) -> &[ExpenseRecord] {
        &self.records
    }

    /// Record an expense if `amount_text` is a positive number
    ///
    /// Anything else (empty, not a number, zero, negative) is ignored and
    /// `None` is returned.
    pub fn track<Tz: TimeZone>(
        &mut self,
        amount_text: &str,
        label: &str,
        now: &DateTime<Tz>,
    ) -> Result<Option<&ExpenseRecord>, StorageError> {
        let Some(amount) = parse_amount(amount_text) else {
            debug!(amount_text, "Not tracking expense without a positive amount");
            return Ok(None);
        };
        let label = label.trim();
        let record = ExpenseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            timestamp: now.timestamp_millis(),
            label: (!label.is_empty()).then(|| label.to_string()),
        };
        info!(amount, label, "Tracked expense");
        self.records.push(record);
        self.persist()?;
        Ok(self.records.last())
    }

    /// Totals for the current week, month and year
    pub fn summary<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> ExpenseSummary {
        let periods = Periods::around(now);
        let total_since = |start: i64| -> f64 {
            self.records
                .iter()
                .filter(|e| e.timestamp >= start && e.timestamp <= periods.now)
                .map(|e| e.amount)
                .sum()
        };
        ExpenseSummary {
            week_total: total_since(periods.week_start),
            month_total: total_since(periods.month_start),
            year_total: total_since(periods.year_start),
        }
    }

    /// Newest `limit` expenses, newest first
    pub fn recent(&self, limit: usize) -> Vec<&ExpenseRecord> {
        let mut recent: Vec<&ExpenseRecord> = self.records.iter().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        recent
    }

    /// Per-day, per-day-of-month or per-month totals for the current period
    pub fn graph<Tz: TimeZone>(&self, view: GraphView, now: &DateTime<Tz>) -> GraphData {
        let tz = now.timezone();
        let periods = Periods::around(now);
        let local = |e: &ExpenseRecord| tz.timestamp_millis_opt(e.timestamp).single();

        let (kind, data, labels) = match view {
            GraphView::Week => {
                let mut data = vec![0.0; 7];
                for e in &self.records {
                    if e.timestamp < periods.week_start || e.timestamp >= periods.week_end {
                        continue;
                    }
                    if let Some(at) = local(e) {
                        data[at.weekday().num_days_from_monday() as usize] += e.amount;
                    }
                }
                let labels = WEEKDAY_LABELS.iter().map(|s| s.to_string()).collect();
                (GraphKind::Bar, data, labels)
            }
            GraphView::Month => {
                let days = periods.days_in_month;
                let mut data = vec![0.0; days as usize];
                for e in &self.records {
                    if e.timestamp < periods.month_start || e.timestamp >= periods.month_end {
                        continue;
                    }
                    if let Some(at) = local(e) {
                        data[at.day0() as usize] += e.amount;
                    }
                }
                let labels = (1..=days).map(|d| d.to_string()).collect();
                (GraphKind::Line, data, labels)
            }
            GraphView::Year => {
                let mut data = vec![0.0; 12];
                for e in &self.records {
                    if e.timestamp < periods.year_start || e.timestamp >= periods.year_end {
                        continue;
                    }
                    if let Some(at) = local(e) {
                        data[at.month0() as usize] += e.amount;
                    }
                }
                let labels = MONTH_LABELS.iter().map(|s| s.to_string()).collect();
                (GraphKind::Bar, data, labels)
            }
        };

        let max = data.iter().copied().fold(GRAPH_FLOOR, f64::max);
        GraphData {
            kind,
            data,
            labels,
            max,
        }
    }

    /// Forget every expense
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.records.clear();
        info!("Expense ledger reset");
        self.store.remove(storage_keys::EXPENSES)
    }

    fn persist(&self) -> Result<(), StorageError> {
        self.store.set(storage_keys::EXPENSES, &self.records)
    }
}

/// Parse a user-typed amount; only finite positive numbers count
pub fn parse_amount(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Period boundaries in epoch milliseconds
struct Periods {
    now: i64,
    week_start: i64,
    week_end: i64,
    month_start: i64,
    month_end: i64,
    days_in_month: u32,
    year_start: i64,
    year_end: i64,
}

impl Periods {
    fn around<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let today = now.date_naive();

        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let month_first = today.with_day(1).unwrap_or(today);
        let next_month_first = first_of_next_month(month_first);
        let year_first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
        let next_year_first = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(today);

        Self {
            now: now.timestamp_millis(),
            week_start: midnight(&tz, monday),
            week_end: midnight(&tz, monday + Duration::days(7)),
            month_start: midnight(&tz, month_first),
            month_end: midnight(&tz, next_month_first),
            days_in_month: (next_month_first - month_first).num_days() as u32,
            year_start: midnight(&tz, year_first),
            year_end: midnight(&tz, next_year_first),
        }
    }
}

fn first_of_next_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first)
}

/// Local midnight of `date` in epoch milliseconds
///
/// Falls back to UTC midnight if the zone skips that local time.
fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}
