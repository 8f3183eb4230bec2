//! Types that represent the core data model, such as `Expense` and `Amount`.
mod amount;
mod expense;
mod ledger;

pub use amount::{Amount, AmountFormat, Symbol};
pub(crate) use expense::PROCESSED_AT_FORMAT;
pub use expense::{Expense, LEDGER_HEADER, SOURCE_FILE_STR};
pub use ledger::Ledger;
