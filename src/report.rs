//! The aggregation engine behind the dashboard.
//!
//! [`analyze`] folds the in-memory expense table into [`DashboardData`]: overview totals, a
//! month-over-month trend, and the derived views (category totals, monthly series, quarterly
//! rollup, top companies, payment methods, weekday totals, amount-bucket histogram, recent
//! transactions). Sums are carried as `Decimal` and only converted to `f64` at the edges.

use crate::model::Expense;
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How many trailing months the monthly series is clamped to.
const MONTHS_SHOWN: usize = 12;

/// How many transactions the recent-transactions view shows.
const RECENT_SHOWN: usize = 5;

/// The amount-bucket boundaries, in euros, paired with their display labels.
const BUCKETS: &[(Option<f64>, &str)] = &[
    (Some(10.0), "Under €10"),
    (Some(50.0), "€10 to €50"),
    (Some(100.0), "€50 to €100"),
    (Some(500.0), "€100 to €500"),
    (None, "Over €500"),
];

/// Everything the dashboard needs, in one serializable structure. This is the payload consumed by
/// the web dashboard and the input to the spreadsheet renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardData {
    /// Headline figures across the whole table.
    pub overview: Overview,
    /// Spend per category, largest first.
    pub categories: Vec<GroupStat>,
    /// Spend per `YYYY-MM` month, ascending, clamped to the trailing twelve months.
    pub months: Vec<MonthStat>,
    /// Spend per `YYYY-Qn` quarter, ascending.
    pub quarters: Vec<PeriodStat>,
    /// The top companies by spend, largest first.
    pub companies: Vec<GroupStat>,
    /// Spend per payment method, largest first.
    pub payment_methods: Vec<GroupStat>,
    /// Spend per day of the week, Monday first. Days with no spend are omitted.
    pub weekdays: Vec<GroupStat>,
    /// The amount-bucket histogram, in bucket order. Empty buckets are included.
    pub buckets: Vec<GroupStat>,
    /// The most recent transactions, newest first.
    pub recent: Vec<RecentExpense>,
}

impl DashboardData {
    pub fn is_empty(&self) -> bool {
        self.overview.count == 0
    }
}

/// Headline figures across the whole table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Overview {
    /// Sum of all amounts.
    pub total: f64,
    /// Mean amount per transaction.
    pub average: f64,
    /// Largest single amount.
    pub max: f64,
    /// Smallest single amount.
    pub min: f64,
    /// Number of transactions.
    pub count: usize,
    /// Percentage change of the latest month against the month before it. Zero when there are
    /// fewer than two months of data or the prior month total is not positive.
    pub monthly_trend_pct: f64,
}

/// One row of a grouped view: a label with its total, transaction count, and share of the overall
/// total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupStat {
    pub label: String,
    pub total: f64,
    pub count: usize,
    /// Share of the overall total, in percent, rounded to one decimal place.
    pub pct: f64,
}

/// One month of the monthly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthStat {
    /// The month in `YYYY-MM` form.
    pub month: String,
    pub total: f64,
    /// Direction of change against the previous month in the series.
    pub trend: Trend,
}

/// One period of the quarterly rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodStat {
    /// The quarter in `YYYY-Qn` form.
    pub period: String,
    pub total: f64,
}

/// One row of the recent-transactions view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecentExpense {
    /// The transaction date in `YYYY-MM-DD` form.
    pub date: String,
    pub merchant: String,
    pub description: String,
    pub amount: f64,
    pub category: String,
}

/// Direction of change relative to the previous period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
    /// No prior period to compare against.
    #[default]
    None,
}

serde_plain::derive_display_from_serialize!(Trend);
serde_plain::derive_fromstr_from_deserialize!(Trend);

impl Trend {
    /// The mark rendered in the monthly table of the spreadsheet dashboard.
    pub fn mark(&self) -> &'static str {
        match self {
            Trend::Up => "▲",
            Trend::Down => "▼",
            Trend::Flat => "−",
            Trend::None => "",
        }
    }

    fn compare(current: Decimal, previous: Decimal) -> Self {
        match current.cmp(&previous) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }
}

/// Groups the expense table into every dashboard view.
///
/// `top_companies` limits the top-companies view; everything else is unbounded. An empty table
/// produces a zeroed structure rather than an error.
pub fn analyze(expenses: &[Expense], top_companies: usize) -> DashboardData {
    let total: Decimal = expenses.iter().map(|e| e.amount().value()).sum();
    let count = expenses.len();

    let overview = Overview {
        total: to_f64(total),
        average: if count == 0 {
            0.0
        } else {
            to_f64(total / Decimal::from(count))
        },
        max: to_f64(
            expenses
                .iter()
                .map(|e| e.amount().value())
                .max()
                .unwrap_or_default(),
        ),
        min: to_f64(
            expenses
                .iter()
                .map(|e| e.amount().value())
                .min()
                .unwrap_or_default(),
        ),
        count,
        monthly_trend_pct: 0.0,
    };

    let monthly = group_by(expenses, |e| e.date().format("%Y-%m").to_string());
    let monthly_trend_pct = monthly_trend(&monthly);

    // Clamp the monthly series to the trailing months and attach trend marks.
    let skip = monthly.len().saturating_sub(MONTHS_SHOWN);
    let mut months = Vec::new();
    let mut previous: Option<Decimal> = None;
    for (month, (sum, _)) in monthly.iter().skip(skip) {
        let trend = match previous {
            Some(prev) => Trend::compare(*sum, prev),
            None => Trend::None,
        };
        months.push(MonthStat {
            month: month.clone(),
            total: to_f64(*sum),
            trend,
        });
        previous = Some(*sum);
    }

    let quarters = group_by(expenses, |e| {
        format!("{}-Q{}", e.date().year(), quarter(e.date()))
    })
    .into_iter()
    .map(|(period, (sum, _))| PeriodStat {
        period,
        total: to_f64(sum),
    })
    .collect();

    let mut companies = ranked(group_by(expenses, |e| e.merchant().to_string()), total);
    companies.truncate(top_companies);

    let weekdays = {
        let by_day = group_by(expenses, |e| {
            e.date().weekday().num_days_from_monday().to_string()
        });
        // BTreeMap ordering on the numeric key puts Monday first.
        by_day
            .into_iter()
            .map(|(key, (sum, n))| GroupStat {
                label: weekday_name(key.parse().unwrap_or_default()).to_string(),
                total: to_f64(sum),
                count: n,
                pct: pct_of(sum, total),
            })
            .collect()
    };

    let buckets = bucket_histogram(expenses, total);

    let mut by_recency: Vec<&Expense> = expenses.iter().collect();
    by_recency.sort_by(|a, b| b.date().cmp(&a.date()));
    let recent = by_recency
        .into_iter()
        .take(RECENT_SHOWN)
        .map(|e| RecentExpense {
            date: e.date().format("%Y-%m-%d").to_string(),
            merchant: e.merchant().to_string(),
            description: e.description().to_string(),
            amount: to_f64(e.amount().value()),
            category: e.category().to_string(),
        })
        .collect();

    DashboardData {
        overview: Overview {
            monthly_trend_pct,
            ..overview
        },
        categories: ranked(group_by(expenses, |e| e.category().to_string()), total),
        months,
        quarters,
        companies,
        payment_methods: ranked(
            group_by(expenses, |e| e.payment_method().to_string()),
            total,
        ),
        weekdays,
        buckets,
        recent,
    }
}

/// Sums and counts expenses per key. The `BTreeMap` keeps the keys sorted, which is the order the
/// monthly and quarterly views need.
fn group_by<F>(expenses: &[Expense], key: F) -> BTreeMap<String, (Decimal, usize)>
where
    F: Fn(&Expense) -> String,
{
    let mut groups: BTreeMap<String, (Decimal, usize)> = BTreeMap::new();
    for expense in expenses {
        let entry = groups.entry(key(expense)).or_default();
        entry.0 += expense.amount().value();
        entry.1 += 1;
    }
    groups
}

/// Turns grouped sums into rows sorted by total, largest first, with share-of-total percentages.
fn ranked(groups: BTreeMap<String, (Decimal, usize)>, total: Decimal) -> Vec<GroupStat> {
    let mut rows: Vec<GroupStat> = groups
        .into_iter()
        .map(|(label, (sum, n))| GroupStat {
            label,
            total: to_f64(sum),
            count: n,
            pct: pct_of(sum, total),
        })
        .collect();
    rows.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));
    rows
}

/// Percentage change of the latest month against the month before it.
fn monthly_trend(monthly: &BTreeMap<String, (Decimal, usize)>) -> f64 {
    let sums: Vec<Decimal> = monthly.values().map(|(sum, _)| *sum).collect();
    if sums.len() < 2 {
        return 0.0;
    }
    let last = sums[sums.len() - 1];
    let prior = sums[sums.len() - 2];
    if prior <= Decimal::ZERO {
        return 0.0;
    }
    round1(to_f64((last - prior) / prior * Decimal::ONE_HUNDRED))
}

/// Builds the amount-bucket histogram. Every bucket appears, in order, even when empty.
fn bucket_histogram(expenses: &[Expense], total: Decimal) -> Vec<GroupStat> {
    let mut sums = vec![Decimal::ZERO; BUCKETS.len()];
    let mut counts = vec![0usize; BUCKETS.len()];
    for expense in expenses {
        let ix = bucket_index(to_f64(expense.amount().value()));
        sums[ix] += expense.amount().value();
        counts[ix] += 1;
    }
    BUCKETS
        .iter()
        .enumerate()
        .map(|(ix, (_, label))| GroupStat {
            label: label.to_string(),
            total: to_f64(sums[ix]),
            count: counts[ix],
            pct: pct_of(sums[ix], total),
        })
        .collect()
}

fn bucket_index(amount: f64) -> usize {
    BUCKETS
        .iter()
        .position(|(limit, _)| limit.map(|l| amount < l).unwrap_or(true))
        .unwrap_or(BUCKETS.len() - 1)
}

fn quarter(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

fn weekday_name(num_from_monday: u8) -> &'static str {
    match num_from_monday {
        0 => "Monday",
        1 => "Tuesday",
        2 => "Wednesday",
        3 => "Thursday",
        4 => "Friday",
        5 => "Saturday",
        _ => "Sunday",
    }
}

/// Share of `total`, in percent, rounded to one decimal place.
fn pct_of(part: Decimal, total: Decimal) -> f64 {
    if total <= Decimal::ZERO {
        return 0.0;
    }
    round1(to_f64(part / total * Decimal::ONE_HUNDRED))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use std::str::FromStr;

    fn expense(date: &str, merchant: &str, amount: &str, category: &str, payment: &str) -> Expense {
        Expense::new(
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            merchant,
            format!("{merchant} purchase"),
            Amount::from_str(amount).unwrap(),
            category,
            payment,
            "file.jpg",
            "2026-03-01 00:00:00",
        )
    }

    fn sample() -> Vec<Expense> {
        vec![
            expense("2026-01-05", "Mercadona", "40.00", "Groceries", "Card"),
            expense("2026-01-20", "Renfe", "60.00", "Transport", "Card"),
            expense("2026-02-10", "Mercadona", "80.00", "Groceries", "Cash"),
            expense("2026-02-14", "Cinema", "20.00", "Dining", "Card"),
        ]
    }

    #[test]
    fn test_overview() {
        let data = analyze(&sample(), 10);
        let o = &data.overview;
        assert_eq!(o.count, 4);
        assert_eq!(o.total, 200.0);
        assert_eq!(o.average, 50.0);
        assert_eq!(o.max, 80.0);
        assert_eq!(o.min, 20.0);
    }

    #[test]
    fn test_monthly_trend_pct() {
        // January 100, February 100: flat
        let data = analyze(&sample(), 10);
        assert_eq!(data.overview.monthly_trend_pct, 0.0);

        // Add 50 to February: (150 - 100) / 100 = +50%
        let mut expenses = sample();
        expenses.push(expense("2026-02-20", "Extra", "50.00", "Misc", "Card"));
        let data = analyze(&expenses, 10);
        assert_eq!(data.overview.monthly_trend_pct, 50.0);
    }

    #[test]
    fn test_single_month_has_zero_trend() {
        let expenses = vec![expense("2026-01-05", "A", "10.00", "X", "Card")];
        let data = analyze(&expenses, 10);
        assert_eq!(data.overview.monthly_trend_pct, 0.0);
    }

    #[test]
    fn test_categories_ranked_with_pct() {
        let data = analyze(&sample(), 10);
        let cats: Vec<&str> = data.categories.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(cats, vec!["Groceries", "Transport", "Dining"]);
        assert_eq!(data.categories[0].total, 120.0);
        assert_eq!(data.categories[0].count, 2);
        assert_eq!(data.categories[0].pct, 60.0);
        assert_eq!(data.categories[2].pct, 10.0);
    }

    #[test]
    fn test_monthly_series_with_trend_marks() {
        let mut expenses = sample();
        expenses.push(expense("2026-03-01", "March", "50.00", "Misc", "Card"));
        let data = analyze(&expenses, 10);
        let months: Vec<(&str, Trend)> = data
            .months
            .iter()
            .map(|m| (m.month.as_str(), m.trend))
            .collect();
        assert_eq!(
            months,
            vec![
                ("2026-01", Trend::None),
                ("2026-02", Trend::Flat),
                ("2026-03", Trend::Down),
            ]
        );
    }

    #[test]
    fn test_monthly_series_clamped_to_twelve() {
        let mut expenses = Vec::new();
        for year in [2025, 2026] {
            for month in 1..=12 {
                expenses.push(expense(
                    &format!("{year}-{month:02}-01"),
                    "Shop",
                    "10.00",
                    "Misc",
                    "Card",
                ));
            }
        }
        let data = analyze(&expenses, 10);
        assert_eq!(data.months.len(), 12);
        assert_eq!(data.months[0].month, "2026-01");
        assert_eq!(data.months[11].month, "2026-12");
        // The first shown month still has a predecessor in the data, but the series starts fresh.
        assert_eq!(data.months[0].trend, Trend::None);
    }

    #[test]
    fn test_quarterly_rollup() {
        let mut expenses = sample();
        expenses.push(expense("2026-04-02", "Q2 Shop", "30.00", "Misc", "Card"));
        expenses.push(expense("2025-11-15", "LastYear", "5.00", "Misc", "Card"));
        let data = analyze(&expenses, 10);
        let quarters: Vec<(&str, f64)> = data
            .quarters
            .iter()
            .map(|q| (q.period.as_str(), q.total))
            .collect();
        assert_eq!(
            quarters,
            vec![("2025-Q4", 5.0), ("2026-Q1", 200.0), ("2026-Q2", 30.0)]
        );
    }

    #[test]
    fn test_top_companies_truncated() {
        let data = analyze(&sample(), 2);
        assert_eq!(data.companies.len(), 2);
        assert_eq!(data.companies[0].label, "Mercadona");
        assert_eq!(data.companies[0].total, 120.0);
    }

    #[test]
    fn test_payment_methods() {
        let data = analyze(&sample(), 10);
        assert_eq!(data.payment_methods[0].label, "Card");
        assert_eq!(data.payment_methods[0].total, 120.0);
        assert_eq!(data.payment_methods[1].label, "Cash");
        assert_eq!(data.payment_methods[1].count, 1);
    }

    #[test]
    fn test_weekdays_in_week_order() {
        // 2026-01-05 is a Monday, 2026-02-14 is a Saturday.
        let data = analyze(&sample(), 10);
        let days: Vec<&str> = data.weekdays.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(days.first(), Some(&"Monday"));
        assert!(days.contains(&"Saturday"));
    }

    #[test]
    fn test_bucket_histogram() {
        let expenses = vec![
            expense("2026-01-01", "A", "5.00", "X", "Card"),
            expense("2026-01-02", "B", "10.00", "X", "Card"),
            expense("2026-01-03", "C", "49.99", "X", "Card"),
            expense("2026-01-04", "D", "250.00", "X", "Card"),
            expense("2026-01-05", "E", "600.00", "X", "Card"),
        ];
        let data = analyze(&expenses, 10);
        let counts: Vec<usize> = data.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 0, 1, 1]);
        assert_eq!(data.buckets[0].label, "Under €10");
        assert_eq!(data.buckets[4].label, "Over €500");
        assert_eq!(data.buckets[4].total, 600.0);
    }

    #[test]
    fn test_recent_transactions_newest_first() {
        let data = analyze(&sample(), 10);
        assert_eq!(data.recent.len(), 4);
        assert_eq!(data.recent[0].date, "2026-02-14");
        assert_eq!(data.recent[3].date, "2026-01-05");
    }

    #[test]
    fn test_empty_table() {
        let data = analyze(&[], 10);
        assert!(data.is_empty());
        assert_eq!(data.overview.total, 0.0);
        assert!(data.categories.is_empty());
        assert!(data.months.is_empty());
        assert!(data.recent.is_empty());
        // Buckets always render all rows.
        assert_eq!(data.buckets.len(), 5);
        assert_eq!(data.buckets[0].count, 0);
    }
}
