use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies the marketplace accepts. No conversion happens between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    INR,
    USD,
    EUR,
}

impl Currency {
    /// Number of decimal places between the major and minor unit.
    pub fn minor_exponent(&self) -> u32 {
        match self {
            Currency::INR | Currency::USD | Currency::EUR => 2,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            other => Err(PaymentError::ValidationError(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

/// A strictly positive amount in minor currency units (paise, cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(minor: i64) -> Result<Self, PaymentError> {
        if minor > 0 {
            Ok(Self(minor))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    /// Converts a major-unit decimal (e.g. `29.99`) into minor units without rounding.
    ///
    /// Values carrying more precision than the currency's minor unit are rejected.
    pub fn from_major(value: Decimal, currency: Currency) -> Result<Self, PaymentError> {
        let scaled = value
            .checked_mul(Decimal::from(10_i64.pow(currency.minor_exponent())))
            .ok_or_else(|| PaymentError::ValidationError(format!("{} is out of range", value)))?;
        if scaled.fract() != Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "{} has more precision than {} allows",
                value, currency
            )));
        }
        let minor = i64::try_from(scaled.trunc()).map_err(|_| {
            PaymentError::ValidationError(format!("{} is out of range", value))
        })?;
        Self::new(minor)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn to_major(&self, currency: Currency) -> Decimal {
        Decimal::new(self.0, currency.minor_exponent()).normalize()
    }
}

impl TryFrom<i64> for Amount {
    type Error = PaymentError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
