//! Builds the in-memory expense table from raw worksheet values.
//!
//! The Expenses worksheet is hand-editable, so the loader is deliberately tolerant: headers are
//! resolved through an alias table, the two required columns fall back to their conventional
//! positions, amounts are cleaned of currency symbols and separator variants, and dates are tried
//! against several common formats. Rows whose date or amount cannot be parsed are dropped and
//! counted rather than failing the whole load.

use crate::model::{Amount, Expense};
use crate::Result;
use anyhow::bail;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, warn};

/// Header aliases accepted for each logical column, lowercase. The first header that matches an
/// alias wins. Spanish aliases are kept because older sheets used them.
const DATE_ALIASES: &[&str] = &["date", "fecha", "día", "dia", "transaction date"];
const MERCHANT_ALIASES: &[&str] = &[
    "merchant", "company", "business", "empresa", "negocio", "comercio", "tienda", "proveedor",
];
const DESCRIPTION_ALIASES: &[&str] = &[
    "description",
    "descripción",
    "descripcion",
    "concepto",
    "detalle",
];
const AMOUNT_ALIASES: &[&str] = &[
    "amount", "importe", "monto", "valor", "precio", "total",
];
const CATEGORY_ALIASES: &[&str] = &["category", "categoría", "categoria", "tipo", "type"];
const PAYMENT_ALIASES: &[&str] = &[
    "payment method",
    "payment",
    "forma de pago",
    "metodo de pago",
    "pago",
];

/// Date formats tried, in order, when parsing the date column.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Positional fallbacks for the two required columns: date is conventionally the first column and
/// amount the fourth.
const DATE_POSITION: usize = 0;
const AMOUNT_POSITION: usize = 3;

/// The value assigned to optional columns that are absent from the sheet.
const UNKNOWN: &str = "Unknown";

/// Resolved column indexes for one worksheet.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
struct ColumnIndexes {
    date: usize,
    amount: usize,
    merchant: Option<usize>,
    description: Option<usize>,
    category: Option<usize>,
    payment_method: Option<usize>,
}

impl ColumnIndexes {
    /// Resolves header positions from the header row, falling back to conventional positions for
    /// the required columns.
    fn resolve(headers: &[String]) -> Result<Self> {
        let find = |aliases: &[&str]| -> Option<usize> {
            headers
                .iter()
                .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
        };

        let date = match find(DATE_ALIASES) {
            Some(ix) => ix,
            None if headers.len() > DATE_POSITION => {
                warn!(
                    "No date header found; assuming column {} ('{}') holds dates",
                    DATE_POSITION + 1,
                    headers[DATE_POSITION]
                );
                DATE_POSITION
            }
            None => bail!("The sheet has no date column and no columns to fall back to"),
        };

        let amount = match find(AMOUNT_ALIASES) {
            Some(ix) => ix,
            None if headers.len() > AMOUNT_POSITION => {
                warn!(
                    "No amount header found; assuming column {} ('{}') holds amounts",
                    AMOUNT_POSITION + 1,
                    headers[AMOUNT_POSITION]
                );
                AMOUNT_POSITION
            }
            None => bail!("The sheet has no amount column and no columns to fall back to"),
        };

        Ok(Self {
            date,
            amount,
            merchant: find(MERCHANT_ALIASES),
            description: find(DESCRIPTION_ALIASES),
            category: find(CATEGORY_ALIASES),
            payment_method: find(PAYMENT_ALIASES),
        })
    }
}

/// The in-memory expense table loaded from the Expenses worksheet.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    expenses: Vec<Expense>,
    dropped: usize,
}

impl Ledger {
    /// Builds a `Ledger` from raw worksheet values, header row included.
    ///
    /// # Errors
    /// Returns an error when the value set is empty or the required columns cannot be located.
    /// Individual malformed rows are dropped, not errors.
    pub fn from_sheet_values(values: Vec<Vec<String>>) -> Result<Self> {
        let mut rows = values.into_iter();
        let headers = match rows.next() {
            Some(h) => h,
            None => bail!("An empty data set cannot be parsed into a Ledger"),
        };
        let cols = ColumnIndexes::resolve(&headers)?;
        debug!("Resolved sheet columns: {cols:?}");

        let mut expenses = Vec::new();
        let mut dropped = 0usize;
        for (row_ix, row) in rows.enumerate() {
            match parse_row(&cols, &row) {
                Some(expense) => expenses.push(expense),
                None => {
                    // Row numbers are 1-based and the header occupies row 1.
                    warn!("Dropping row {} with unparseable date or amount", row_ix + 2);
                    dropped += 1;
                }
            }
        }

        Ok(Self { expenses, dropped })
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    /// How many rows were dropped because their date or amount could not be parsed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.expenses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.expenses.len()
    }
}

/// Parses one data row. Returns `None` when the required date or amount cannot be parsed.
fn parse_row(cols: &ColumnIndexes, row: &[String]) -> Option<Expense> {
    let cell = |ix: usize| row.get(ix).map(|s| s.trim()).unwrap_or_default();
    let optional = |ix: Option<usize>| {
        ix.map(|i| cell(i))
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string()
    };

    let date = parse_date(cell(cols.date))?;
    let amount = parse_amount(cell(cols.amount))?;

    Some(Expense::new(
        date,
        optional(cols.merchant),
        optional(cols.description),
        amount,
        optional(cols.category),
        optional(cols.payment_method),
        String::new(),
        String::new(),
    ))
}

/// Tries each supported date format in order.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Cleans and parses an amount cell.
///
/// Currency symbols and whitespace are stripped first. A comma is then either a decimal separator
/// (European style, one comma followed by one or two digits at the end) or a thousands separator;
/// the original sheet data contains both styles.
fn parse_amount(s: &str) -> Option<Amount> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        match cleaned.rsplit_once(',') {
            Some((head, tail))
                if !head.contains(',')
                    && (1..=2).contains(&tail.len())
                    && tail.chars().all(|c| c.is_ascii_digit()) =>
            {
                // Decimal comma: "12,50" -> "12.50"
                format!("{head}.{tail}")
            }
            _ => cleaned.replace(',', ""),
        }
    } else {
        cleaned.replace(',', "")
    };

    Decimal::from_str(&normalized).ok().map(Amount::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn sample_values() -> Vec<Vec<String>> {
        vec![
            row(&[
                "Date",
                "Merchant",
                "Description",
                "Amount",
                "Category",
                "Payment Method",
                "Source File",
                "Processed At",
            ]),
            row(&[
                "2026-01-15",
                "Mercadona",
                "Groceries",
                "€54.20",
                "Groceries",
                "Card",
                "a.jpg",
                "2026-01-15 10:00:00",
            ]),
            row(&[
                "2026-02-03",
                "Renfe",
                "Train ticket",
                "23,40",
                "Transport",
                "Cash",
                "b.jpg",
                "2026-02-03 11:00:00",
            ]),
            row(&[
                "not-a-date",
                "Broken",
                "Bad row",
                "10.00",
                "Misc",
                "Card",
                "c.jpg",
                "",
            ]),
        ]
    }

    #[test]
    fn test_from_sheet_values() {
        let ledger = Ledger::from_sheet_values(sample_values()).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.dropped(), 1);
        let first = &ledger.expenses()[0];
        assert_eq!(first.merchant(), "Mercadona");
        assert_eq!(first.amount().value(), Decimal::from_str("54.20").unwrap());
        let second = &ledger.expenses()[1];
        assert_eq!(
            second.amount().value(),
            Decimal::from_str("23.40").unwrap(),
            "decimal comma should be honored"
        );
    }

    #[test]
    fn test_empty_values_is_an_error() {
        assert!(Ledger::from_sheet_values(Vec::new()).is_err());
    }

    #[test]
    fn test_header_only_is_empty_ledger() {
        let ledger = Ledger::from_sheet_values(vec![row(&["Date", "Merchant", "x", "Amount"])])
            .unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.dropped(), 0);
    }

    #[test]
    fn test_spanish_headers_resolve() {
        let values = vec![
            row(&["Fecha", "Negocio", "Descripción", "Importe", "Categoría"]),
            row(&["15/01/2026", "Bar Pepe", "Lunch", "12,50 €", "Dining"]),
        ];
        let ledger = Ledger::from_sheet_values(values).unwrap();
        assert_eq!(ledger.len(), 1);
        let e = &ledger.expenses()[0];
        assert_eq!(e.date(), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        assert_eq!(e.amount().value(), Decimal::from_str("12.50").unwrap());
        assert_eq!(e.payment_method(), "Unknown");
    }

    #[test]
    fn test_positional_fallback() {
        let values = vec![
            row(&["A", "B", "C", "D"]),
            row(&["2026-01-01", "Shop", "Thing", "9.99"]),
        ];
        let ledger = Ledger::from_sheet_values(values).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.expenses()[0].amount().value(),
            Decimal::from_str("9.99").unwrap()
        );
    }

    #[test]
    fn test_missing_required_columns() {
        let values = vec![row(&["Only", "Two"])];
        assert!(Ledger::from_sheet_values(values).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        assert_eq!(parse_date("2026-03-04"), Some(expected));
        assert_eq!(parse_date("04/03/2026"), Some(expected));
        assert_eq!(parse_date("04-03-2026"), Some(expected));
        assert_eq!(parse_date("2026/03/04"), Some(expected));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_parse_amount_styles() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(parse_amount("€12.50").unwrap().value(), d("12.50"));
        assert_eq!(parse_amount("12,50").unwrap().value(), d("12.50"));
        assert_eq!(parse_amount("12,5").unwrap().value(), d("12.5"));
        assert_eq!(parse_amount("1,234.56").unwrap().value(), d("1234.56"));
        assert_eq!(parse_amount("1,234").unwrap().value(), d("1234"));
        assert_eq!(parse_amount("$99").unwrap().value(), d("99"));
        assert_eq!(parse_amount("1,234,567").unwrap().value(), d("1234567"));
        assert!(parse_amount("").is_none());
        assert!(parse_amount("n/a").is_none());
    }
}
