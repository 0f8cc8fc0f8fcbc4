use crate::application::lifecycle::PaymentRequest;
use crate::domain::transaction::PaymentMethod;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RequestType {
    Payment,
    Refund,
}

/// Raw row. Amounts stay text so their scale survives into the signature.
#[derive(Debug, Deserialize)]
struct RequestRecord {
    #[serde(rename = "type")]
    kind: RequestType,
    merchant: String,
    order: String,
    amount: Option<String>,
    currency: Option<String>,
    method: Option<PaymentMethod>,
    idempotency_key: Option<String>,
    signature: Option<String>,
}

/// One row of a request file.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Payment(PaymentRequest),
    /// Refund against the latest transaction of `(merchant_id, order_id)`.
    Refund {
        merchant_id: String,
        order_id: String,
        amount: Decimal,
    },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<RequestRecord> for Request {
    type Error = PaymentError;

    fn try_from(record: RequestRecord) -> Result<Self> {
        let amount = non_empty(record.amount)
            .ok_or_else(|| PaymentError::InvalidArgument("amount is required".to_string()))?;
        let amount = Decimal::from_str(&amount)
            .map_err(|e| PaymentError::InvalidArgument(format!("invalid amount {amount}: {e}")))?;

        Ok(match record.kind {
            RequestType::Payment => Request::Payment(PaymentRequest {
                merchant_id: record.merchant,
                order_id: record.order,
                amount,
                currency: non_empty(record.currency),
                payment_method: record.method.unwrap_or(PaymentMethod::Upi),
                description: None,
                idempotency_key: non_empty(record.idempotency_key),
                signature: non_empty(record.signature),
            }),
            RequestType::Refund => Request::Refund {
                merchant_id: record.merchant,
                order_id: record.order,
                amount,
            },
        })
    }
}

/// Reads payment and refund requests
/// (`type, merchant, order, amount, currency, method, idempotency_key, signature`).
///
/// Rows are deserialized lazily, so large files stream.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<Request>> {
        self.reader
            .into_deserialize::<RequestRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(Request::try_from))
    }
}
