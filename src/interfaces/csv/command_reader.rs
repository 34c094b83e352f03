use crate::domain::money::Currency;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Issue an order for a course.
    Issue,
    /// Sandbox only: pay the order at the simulated checkout, then verify it.
    Pay,
    /// Verify an explicit confirmation.
    Verify,
    Refund,
    /// Re-run the enrollment grant for the order's payment.
    Retry,
}

/// One row of a command script. Columns that a command doesn't use are left empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub command: CommandKind,
    pub user: Option<String>,
    pub course: Option<String>,
    /// Major units, e.g. `29.99`.
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub order: Option<String>,
    pub payment: Option<String>,
    pub signature: Option<String>,
    pub reason: Option<String>,
}

impl CommandRecord {
    /// The value of a column the command requires.
    pub fn require<'a>(&'a self, column: &str, value: &'a Option<String>) -> Result<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PaymentError::ValidationError(format!(
                    "{:?} needs a value in the '{}' column",
                    self.command, column
                ))
            })
    }
}

/// Reads checkout commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths, so trailing
/// empty columns may be omitted.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes commands, one `Result` per row.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
