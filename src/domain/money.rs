use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive monetary amount.
///
/// Every payment, refund and ledger posting is expressed as an `Amount`; the
/// sign of a ledger movement is carried by the entry type, never by the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::InvalidArgument(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A merchant balance. Unlike [`Amount`] it may be zero or negative, e.g. when
/// refunds are debited after the credited funds were paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Fails rather than panicking when the sum leaves `Decimal`'s range.
    pub fn checked_add(self, rhs: Self) -> Result<Self, PaymentError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| PaymentError::internal(format!("Balance overflow: {self} + {rhs}")))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, PaymentError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or_else(|| PaymentError::internal(format!("Balance overflow: {self} - {rhs}")))
    }

    /// The debit side of `amount`. Negating a `Decimal` cannot overflow.
    pub fn negated(amount: Amount) -> Self {
        Self(-amount.0)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
