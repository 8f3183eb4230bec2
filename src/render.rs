//! Lays out the Dashboard worksheet from computed dashboard data.
//!
//! The layout is fixed in the upper half: title and update stamp at the top, the overview block on
//! the left, then the category and monthly tables side by side. The companies and
//! recent-transactions tables start below whichever of the two middle tables is longer. Everything
//! is returned as value blocks plus formatting operations so the caller decides where they go.

use crate::api::{CellRect, FormatOp, SheetRange, DASHBOARD};
use crate::report::DashboardData;

const TITLE: &str = "EXPENSE DASHBOARD";

/// How wide the title and update-stamp banners are, in columns (A through G).
const BANNER_COLS: usize = 7;

/// The zero-based row of the category and monthly section titles (sheet row 11).
const MIDDLE_ROW: usize = 10;

/// Column widths applied to the dashboard, in pixels.
const COLUMN_WIDTHS: &[(usize, i64)] = &[
    (0, 200),
    (1, 150),
    (2, 100),
    (4, 150),
    (5, 150),
    (6, 250),
    (7, 150),
    (8, 150),
];

/// The cell blocks and formatting that make up a rendered dashboard.
#[derive(Debug, Clone, Default)]
pub(crate) struct DashboardLayout {
    pub(crate) ranges: Vec<SheetRange>,
    pub(crate) formats: Vec<FormatOp>,
}

impl DashboardLayout {
    fn push_cell(&mut self, col: usize, row: usize, value: impl Into<String>) {
        self.ranges.push(SheetRange {
            range: format!("{DASHBOARD}!{}", a1(col, row)),
            values: vec![vec![value.into()]],
        });
    }

    fn push_block(&mut self, col: usize, row: usize, values: Vec<Vec<String>>) {
        self.ranges.push(SheetRange {
            range: format!("{DASHBOARD}!{}", a1(col, row)),
            values,
        });
    }

    /// A merged, subtitle-formatted section banner.
    fn push_section_title(&mut self, col: usize, row: usize, width: usize, text: &str) {
        self.push_cell(col, row, text);
        let rect = CellRect::new(row, row + 1, col, col + width);
        self.formats.push(FormatOp::Merge(rect));
        self.formats.push(FormatOp::Subtitle(rect));
    }

    /// A header-formatted row followed by data rows, with a currency format on `currency_col`.
    fn push_table(
        &mut self,
        col: usize,
        row: usize,
        header: &[&str],
        rows: Vec<Vec<String>>,
        currency_col: usize,
    ) {
        let data_len = rows.len();
        let mut values = vec![header.iter().map(|s| s.to_string()).collect::<Vec<String>>()];
        values.extend(rows);
        self.push_block(col, row, values);
        self.formats.push(FormatOp::Header(CellRect::new(
            row,
            row + 1,
            col,
            col + header.len(),
        )));
        self.formats.push(FormatOp::Currency(CellRect::new(
            row + 1,
            row + 1 + data_len,
            currency_col,
            currency_col + 1,
        )));
    }
}

/// Builds the full dashboard layout.
pub(crate) fn build_dashboard(data: &DashboardData, updated_at: &str) -> DashboardLayout {
    let mut layout = DashboardLayout::default();

    // Banner
    layout.push_cell(0, 0, TITLE);
    let title_rect = CellRect::new(0, 1, 0, BANNER_COLS);
    layout.formats.push(FormatOp::Merge(title_rect));
    layout.formats.push(FormatOp::Title(title_rect));

    layout.push_cell(0, 1, format!("Last updated: {updated_at}"));
    layout
        .formats
        .push(FormatOp::Merge(CellRect::new(1, 2, 0, BANNER_COLS)));

    // Overview
    layout.push_section_title(0, 3, BANNER_COLS, "OVERVIEW");
    let overview = &data.overview;
    let metrics = vec![
        pair("Total spend", eur(overview.total)),
        pair("Average per transaction", eur(overview.average)),
        pair("Largest expense", eur(overview.max)),
        pair("Smallest expense", eur(overview.min)),
        pair("Transactions", overview.count.to_string()),
        pair("Monthly trend", format!("{:+.1}%", overview.monthly_trend_pct)),
    ];
    let metrics_len = metrics.len();
    layout.push_block(0, 4, metrics);
    layout
        .formats
        .push(FormatOp::Header(CellRect::new(4, 4 + metrics_len, 0, 1)));
    // Only the four money rows get the currency format.
    layout
        .formats
        .push(FormatOp::Currency(CellRect::new(4, 8, 1, 2)));

    // Category and monthly tables, side by side.
    if !data.categories.is_empty() {
        layout.push_section_title(0, MIDDLE_ROW, 3, "SPENDING BY CATEGORY");
        let rows = data
            .categories
            .iter()
            .map(|c| vec![c.label.clone(), eur(c.total), format!("{:.1}%", c.pct)])
            .collect();
        layout.push_table(0, MIDDLE_ROW + 1, &["Category", "Amount", "Share"], rows, 1);
    }

    if !data.months.is_empty() {
        layout.push_section_title(4, MIDDLE_ROW, 3, "MONTHLY TREND");
        let rows = data
            .months
            .iter()
            .map(|m| vec![m.month.clone(), eur(m.total), m.trend.mark().to_string()])
            .collect();
        layout.push_table(4, MIDDLE_ROW + 1, &["Month", "Amount", "Trend"], rows, 5);
    }

    // The lower tables start below the longer of the two middle tables, plus a blank row.
    let middle_len = data.categories.len().max(data.months.len());
    let lower = MIDDLE_ROW + 2 + middle_len + 2;

    if !data.companies.is_empty() {
        layout.push_section_title(0, lower, 3, "TOP COMPANIES");
        let rows = data
            .companies
            .iter()
            .map(|c| vec![c.label.clone(), eur(c.total), format!("{:.1}%", c.pct)])
            .collect();
        layout.push_table(0, lower + 1, &["Company", "Amount", "Share"], rows, 1);
    }

    if !data.recent.is_empty() {
        layout.push_section_title(4, lower, 5, "RECENT TRANSACTIONS");
        let rows = data
            .recent
            .iter()
            .map(|r| {
                vec![
                    r.date.clone(),
                    r.merchant.clone(),
                    r.description.clone(),
                    eur(r.amount),
                    r.category.clone(),
                ]
            })
            .collect();
        layout.push_table(
            4,
            lower + 1,
            &["Date", "Company", "Description", "Amount", "Category"],
            rows,
            7,
        );
    }

    for &(col, pixels) in COLUMN_WIDTHS {
        layout.formats.push(FormatOp::ColumnWidth { col, pixels });
    }

    layout
}

/// The layout written when there are no records to aggregate.
pub(crate) fn empty_notice() -> DashboardLayout {
    let mut layout = DashboardLayout::default();
    layout.push_cell(0, 0, "There is not enough data to build the dashboard yet");
    layout
}

fn pair(label: &str, value: String) -> Vec<String> {
    vec![label.to_string(), value]
}

/// Formats a euro value the way the dashboard cells show it, e.g. `€1,234.50`.
fn eur(value: f64) -> String {
    format!("€{}", format_num::format_num!(",.2", value))
}

/// Converts zero-based (column, row) coordinates to A1 notation.
fn a1(col: usize, row: usize) -> String {
    let mut letters = String::new();
    let mut c = col + 1;
    while c > 0 {
        let rem = (c - 1) % 26;
        letters.insert(0, (b'A' + rem as u8) as char);
        c = (c - 1) / 26;
    }
    format!("{letters}{}", row + 1)
}
