use crate::model::Amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub(crate) const DATE_STR: &str = "Date";
pub(crate) const MERCHANT_STR: &str = "Merchant";
pub(crate) const DESCRIPTION_STR: &str = "Description";
pub(crate) const AMOUNT_STR: &str = "Amount";
pub(crate) const CATEGORY_STR: &str = "Category";
pub(crate) const PAYMENT_METHOD_STR: &str = "Payment Method";
pub const SOURCE_FILE_STR: &str = "Source File";
pub(crate) const PROCESSED_AT_STR: &str = "Processed At";

/// The canonical header row, shared by the Expenses worksheet and the local CSV ledger. The
/// duplicate check scans the `Source File` column of both stores.
pub const LEDGER_HEADER: [&str; 8] = [
    DATE_STR,
    MERCHANT_STR,
    DESCRIPTION_STR,
    AMOUNT_STR,
    CATEGORY_STR,
    PAYMENT_METHOD_STR,
    SOURCE_FILE_STR,
    PROCESSED_AT_STR,
];

/// The timestamp format used in the `Processed At` column.
pub(crate) const PROCESSED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single expense record extracted from a receipt image.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Expense {
    /// The transaction date printed on the receipt.
    pub(crate) date: NaiveDate,
    /// The business that issued the receipt.
    pub(crate) merchant: String,
    /// A short description of the purchase.
    pub(crate) description: String,
    /// The total amount paid.
    pub(crate) amount: Amount,
    /// The assigned spending category.
    pub(crate) category: String,
    /// How the purchase was paid for, when the receipt shows it.
    pub(crate) payment_method: String,
    /// The Drive file name of the receipt image this record came from.
    pub(crate) source_file: String,
    /// When this record was written, formatted with [`PROCESSED_AT_FORMAT`].
    pub(crate) processed_at: String,
}

impl Expense {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        date: NaiveDate,
        merchant: impl Into<String>,
        description: impl Into<String>,
        amount: Amount,
        category: impl Into<String>,
        payment_method: impl Into<String>,
        source_file: impl Into<String>,
        processed_at: impl Into<String>,
    ) -> Self {
        Self {
            date,
            merchant: merchant.into(),
            description: description.into(),
            amount,
            category: category.into(),
            payment_method: payment_method.into(),
            source_file: source_file.into(),
            processed_at: processed_at.into(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// Converts the expense into a row matching [`LEDGER_HEADER`], suitable for both the Expenses
    /// worksheet and the CSV ledger.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.format("%Y-%m-%d").to_string(),
            self.merchant.clone(),
            self.description.clone(),
            self.amount.to_string(),
            self.category.clone(),
            self.payment_method.clone(),
            self.source_file.clone(),
            self.processed_at.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn example() -> Expense {
        Expense::new(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            "Mercadona",
            "Weekly groceries",
            Amount::from_str("€54.20").unwrap(),
            "Groceries",
            "Card",
            "IMG_2041.jpg",
            "2026-03-02 18:30:01",
        )
    }

    #[test]
    fn test_to_row_matches_header() {
        let row = example().to_row();
        assert_eq!(row.len(), LEDGER_HEADER.len());
        assert_eq!(row[0], "2026-03-02");
        assert_eq!(row[3], "€54.20");
        assert_eq!(row[6], "IMG_2041.jpg");
    }

    #[test]
    fn test_header_has_source_file_column() {
        assert_eq!(LEDGER_HEADER[6], SOURCE_FILE_STR);
    }
}
