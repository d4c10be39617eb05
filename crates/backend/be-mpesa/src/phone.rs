//! Kenyan mobile number normalization.
//!
//! Daraja expects MSISDNs as `2547XXXXXXXX` or `2541XXXXXXXX`: the country
//! code followed by a nine digit subscriber number, no `+` and no leading
//! trunk `0`.

use crate::error::MpesaError;

const COUNTRY_CODE: &str = "254";
const SUBSCRIBER_DIGITS: usize = 9;

/// Normalizes a user-entered phone number to the provider's MSISDN format.
///
/// Accepts `0712345678`, `+254712345678`, `254712345678` and `712345678`,
/// ignoring spaces, dashes and parentheses.
pub fn normalize_phone(input: &str) -> Result<String, MpesaError> {
    let compact: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MpesaError::InvalidPhone(input.to_string()));
    }

    let subscriber = if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits
    };

    let valid_prefix = matches!(subscriber.as_bytes().first(), Some(b'7' | b'1'));
    if subscriber.len() != SUBSCRIBER_DIGITS || !valid_prefix {
        return Err(MpesaError::InvalidPhone(input.to_string()));
    }

    Ok(format!("{COUNTRY_CODE}{subscriber}"))
}
