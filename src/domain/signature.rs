use crate::error::{PaymentError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `merchantId:orderId:amount:currency`, with the amount in `Decimal`'s
/// canonical display form.
pub fn canonical_string(
    merchant_id: &str,
    order_id: &str,
    amount: Decimal,
    currency: &str,
) -> String {
    format!("{merchant_id}:{order_id}:{amount}:{currency}")
}

fn mac_for(secret: &str, message: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::internal(format!("invalid signing key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(mac)
}

/// Base64 HMAC-SHA256 of the canonical string under the merchant secret.
pub fn sign(
    merchant_id: &str,
    order_id: &str,
    amount: Decimal,
    currency: &str,
    secret: &str,
) -> Result<String> {
    let message = canonical_string(merchant_id, order_id, amount, currency);
    let mac = mac_for(secret, &message)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Checks a supplied signature. The strict base64 decoder accepts exactly one
/// encoding per digest, so this matches string equality with `sign`, compared
/// in constant time.
pub fn verify(
    merchant_id: &str,
    order_id: &str,
    amount: Decimal,
    currency: &str,
    secret: &str,
    signature: &str,
) -> Result<()> {
    let mismatch = || PaymentError::Authentication("Invalid signature".to_string());
    let supplied = STANDARD.decode(signature).map_err(|_| mismatch())?;
    let message = canonical_string(merchant_id, order_id, amount, currency);
    mac_for(secret, &message)?
        .verify_slice(&supplied)
        .map_err(|_| mismatch())
}
