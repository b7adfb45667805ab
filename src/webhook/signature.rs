use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Check a webhook delivery against the shared secret.
///
/// Returns `false` when the header is absent, the secret is empty, or the
/// digest does not match. The comparison itself is constant-time.
pub fn verify(payload: &[u8], signature_header: Option<&str>, secret: &[u8]) -> bool {
    match signature_header {
        Some(header) => verify_signature(secret, payload, header).is_ok(),
        None => false,
    }
}

/// Verify the GitHub webhook HMAC-SHA256 signature.
///
/// GitHub sends the signature in the `X-Hub-Signature-256` header as `sha256=<hex>`,
/// lowercase. Uppercase hex is rejected so that the accepted header is exactly
/// the canonical `"sha256=" + hex(digest)` string.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_header: &str) -> Result<()> {
    if secret.is_empty() {
        return Err(AppError::SignatureInvalid(
            "No webhook secret configured".to_string(),
        ));
    }

    let signature_hex = signature_header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| AppError::SignatureInvalid("Missing sha256= prefix".to_string()))?;

    if !signature_hex
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(AppError::SignatureInvalid(
            "Signature is not lowercase hex".to_string(),
        ));
    }

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| AppError::SignatureInvalid(format!("Invalid hex in signature: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::SignatureInvalid(format!("Invalid HMAC key: {e}")))?;

    mac.update(payload);

    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::SignatureInvalid("Signature mismatch".to_string()))
}

/// Compute the header value GitHub would send for `payload`.
pub fn sign(secret: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("Invalid HMAC key: {e}")))?;
    mac.update(payload);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn test_valid_signature() {
        let payload = b"hello world";

        let mut mac = HmacSha256::new_from_slice(SECRET).unwrap();
        mac.update(payload);
        let result = mac.finalize();
        let expected_hex = hex::encode(result.into_bytes());

        let header = format!("sha256={expected_hex}");
        assert!(verify_signature(SECRET, payload, &header).is_ok());
        assert!(verify(payload, Some(&header), SECRET));
    }

    #[test]
    fn test_invalid_signature() {
        let payload = b"hello world";
        let header = "sha256=0000000000000000000000000000000000000000000000000000000000000000";
        assert!(verify_signature(SECRET, payload, header).is_err());
    }

    #[test]
    fn test_missing_prefix() {
        let payload = b"hello world";
        let header = "abcdef1234567890";
        assert!(verify_signature(SECRET, payload, header).is_err());
    }

    #[test]
    fn test_absent_header() {
        assert!(!verify(b"hello world", None, SECRET));
    }

    #[test]
    fn test_empty_secret() {
        let header = sign(b"", b"hello world").unwrap_or_default();
        assert!(!verify(b"hello world", Some(&header), b""));
    }

    #[test]
    fn test_uppercase_hex_rejected() {
        let payload = b"hello world";
        let header = sign(SECRET, payload).unwrap();
        let upper = format!("sha256={}", header["sha256=".len()..].to_uppercase());
        assert!(!verify(payload, Some(&upper), SECRET));
    }

    #[test]
    fn test_every_payload_bit_flip_fails() {
        let payload = br#"{"action":"opened","number":42}"#.to_vec();
        let header = sign(SECRET, &payload).unwrap();
        assert!(verify(&payload, Some(&header), SECRET));

        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut mutated = payload.clone();
                mutated[byte] ^= 1 << bit;
                assert!(
                    !verify(&mutated, Some(&header), SECRET),
                    "payload mutation at byte {byte} bit {bit} verified"
                );
            }
        }
    }

    #[test]
    fn test_every_signature_bit_flip_fails() {
        let payload = b"pull request payload";
        let header = sign(SECRET, payload).unwrap();

        for byte in 0..header.len() {
            for bit in 0..8 {
                let mut mutated = header.clone().into_bytes();
                mutated[byte] ^= 1 << bit;
                // Flips that leave the string non-UTF-8 cannot arrive as a header value.
                let Ok(mutated) = String::from_utf8(mutated) else {
                    continue;
                };
                assert!(
                    !verify(payload, Some(&mutated), SECRET),
                    "signature mutation at byte {byte} bit {bit} verified"
                );
            }
        }
    }
}
