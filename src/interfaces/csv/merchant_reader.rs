use crate::domain::merchant::Merchant;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct MerchantRecord {
    merchant: String,
    name: Option<String>,
    secret: String,
    callback_url: Option<String>,
}

impl TryFrom<MerchantRecord> for Merchant {
    type Error = PaymentError;

    fn try_from(record: MerchantRecord) -> Result<Self> {
        if record.merchant.is_empty() {
            return Err(PaymentError::InvalidArgument("merchant is required".to_string()));
        }
        if record.secret.is_empty() {
            return Err(PaymentError::InvalidArgument(format!(
                "merchant {} has no secret",
                record.merchant
            )));
        }
        let name = record.name.unwrap_or_else(|| record.merchant.clone());
        Ok(Merchant::new(
            record.merchant,
            name,
            record.secret,
            record.callback_url.unwrap_or_default(),
        ))
    }
}

/// Reads the merchant registry (`merchant, name, secret, callback_url`).
pub struct MerchantReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> MerchantReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn merchants(self) -> impl Iterator<Item = Result<Merchant>> {
        self.reader
            .into_deserialize::<MerchantRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(Merchant::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_merchants() {
        let data = "merchant, name, secret, callback_url\n\
                    MER_1, Acme, s3cret, http://acme/cb\n\
                    MER_2, , other, ";
        let merchants: Vec<Result<Merchant>> =
            MerchantReader::new(data.as_bytes()).merchants().collect();
        assert_eq!(merchants.len(), 2);

        let acme = merchants[0].as_ref().unwrap();
        assert_eq!(acme.merchant_id, "MER_1");
        assert_eq!(acme.callback_url, "http://acme/cb");
        assert!(acme.active);

        let bare = merchants[1].as_ref().unwrap();
        assert_eq!(bare.name, "MER_2");
        assert_eq!(bare.callback_url, "");
    }

    #[test]
    fn test_missing_secret_rejected() {
        let data = "merchant, name, secret, callback_url\nMER_1, Acme, , http://acme/cb";
        let merchants: Vec<Result<Merchant>> =
            MerchantReader::new(data.as_bytes()).merchants().collect();
        assert!(matches!(merchants[0], Err(PaymentError::InvalidArgument(_))));
    }
}
