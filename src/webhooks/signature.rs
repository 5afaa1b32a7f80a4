//! Webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery body with the shared webhook secret and sends
//! the result in `X-Hub-Signature-256` as `sha256=<hex>`. Verification runs
//! over the exact raw body bytes, before any parsing.
//!
//! When no secret is configured the bot runs in an explicit insecure mode:
//! [`check_signature`] reports [`SignatureCheck::Skipped`] and the caller is
//! expected to log it.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of checking a delivery's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// The signature matched the configured secret.
    Verified,
    /// No secret is configured; verification was not performed.
    Skipped,
    /// The signature was missing, malformed, or did not match.
    Rejected,
}

/// Parses a signature header (e.g., "sha256=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
///
/// ```
/// use changelog_bot::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a payload.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value (`sha256=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a signature header against the payload and secret.
///
/// Uses the HMAC library's constant-time comparison.
///
/// ```
/// use changelog_bot::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let header = format_signature_header(&compute_signature(b"{}", b"secret"));
/// assert!(verify_signature(b"{}", &header, b"secret"));
/// assert!(!verify_signature(b"{}", &header, b"other"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Checks a delivery's signature, honouring insecure mode.
///
/// * `secret == None` ⇒ [`SignatureCheck::Skipped`], regardless of the header.
/// * `secret == Some(_)` and no header ⇒ [`SignatureCheck::Rejected`].
pub fn check_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: Option<&[u8]>,
) -> SignatureCheck {
    let Some(secret) = secret else {
        return SignatureCheck::Skipped;
    };

    match signature_header {
        Some(header) if verify_signature(payload, header, secret) => SignatureCheck::Verified,
        _ => SignatureCheck::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_signature_header_valid() {
        assert_eq!(
            parse_signature_header("sha256=1234abcd"),
            Some(vec![0x12, 0x34, 0xab, 0xcd])
        );
    }

    #[test]
    fn parse_signature_header_rejects_odd_length() {
        assert_eq!(parse_signature_header("sha256=abc"), None);
    }

    #[test]
    fn verify_rejects_modified_payload() {
        let header = format_signature_header(&compute_signature(b"original", b"secret"));
        assert!(verify_signature(b"original", &header, b"secret"));
        assert!(!verify_signature(b"modified", &header, b"secret"));
    }

    #[test]
    fn verify_rejects_malformed_headers() {
        for header in ["", "sha256=", "sha256=zz", "sha1=abc123", "not-a-header"] {
            assert!(!verify_signature(b"body", header, b"secret"), "{header}");
        }
    }

    #[test]
    fn check_without_secret_is_skipped() {
        assert_eq!(check_signature(b"body", None, None), SignatureCheck::Skipped);
        assert_eq!(
            check_signature(b"body", Some("sha256=00"), None),
            SignatureCheck::Skipped
        );
    }

    #[test]
    fn check_with_secret_and_missing_header_is_rejected() {
        assert_eq!(
            check_signature(b"body", None, Some(b"secret")),
            SignatureCheck::Rejected
        );
    }

    #[test]
    fn check_with_matching_header_is_verified() {
        let header = format_signature_header(&compute_signature(b"body", b"secret"));
        assert_eq!(
            check_signature(b"body", Some(&header), Some(b"secret")),
            SignatureCheck::Verified
        );
    }

    proptest! {
        #[test]
        fn prop_sign_verify_roundtrip(payload: Vec<u8>, secret: Vec<u8>) {
            let header = format_signature_header(&compute_signature(&payload, &secret));
            prop_assert!(verify_signature(&payload, &header, &secret));
        }

        #[test]
        fn prop_wrong_secret_fails(
            payload in any::<Vec<u8>>(),
            // HMAC zero-pads short keys, so keys differing only by trailing
            // NULs collide; keep generated secrets NUL-free.
            secret1 in prop::collection::vec(1u8.., 1..64),
            secret2 in prop::collection::vec(1u8.., 1..64),
        ) {
            prop_assume!(secret1 != secret2);
            let header = format_signature_header(&compute_signature(&payload, &secret1));
            prop_assert!(!verify_signature(&payload, &header, &secret2));
        }

        #[test]
        fn prop_malformed_header_no_panic(header: String, payload: Vec<u8>, secret: Vec<u8>) {
            let _ = parse_signature_header(&header);
            let _ = check_signature(&payload, Some(&header), Some(&secret));
        }
    }
}
