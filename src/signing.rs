use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm tag prefixed to every signature value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature for a serialized envelope.
///
/// The digest covers the exact byte sequence that is sent as the request
/// body; callers must sign *after* serialization so the signature and body
/// can never disagree. Returns `sha256=<hex>`.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a received signature against a payload.
///
/// Comparison goes through the MAC verification API, which is constant-time.
/// Returns false for signatures without the `sha256=` tag or with malformed
/// hex.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    mac.verify_slice(&digest).is_ok()
}

/// Signature and timestamp headers extracted from an incoming request.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

/// Pull the webhook signature and timestamp out of a header list.
///
/// Header name matching is case-insensitive.
pub fn parse_signature_headers<'a, I>(headers: I) -> ParsedSignature
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut signature = None;
    let mut timestamp = None;

    for (name, value) in headers {
        if name.eq_ignore_ascii_case(crate::transport::SIGNATURE_HEADER) {
            signature = Some(value.to_string());
        } else if name.eq_ignore_ascii_case(crate::transport::TIMESTAMP_HEADER) {
            timestamp = Some(value.to_string());
        }
    }

    ParsedSignature { signature, timestamp }
}

/// Freshness check for the ISO-8601 delivery timestamp.
///
/// Rejects timestamps from the future as stale rather than trusting
/// sender-side clock skew.
pub fn is_timestamp_fresh(timestamp: DateTime<Utc>, now: DateTime<Utc>, max_age_secs: i64) -> bool {
    match (now - timestamp).num_seconds() {
        age if age < 0 => false,
        age => age <= max_age_secs,
    }
}

/// Why an incoming webhook request failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    MissingSignature,
    MissingTimestamp,
    InvalidTimestamp,
    StaleTimestamp,
    InvalidSignature,
}

/// Verify an incoming webhook request in one call.
///
/// Intended for receiving services: checks header presence, timestamp
/// freshness, and the payload signature.
pub fn verify_webhook_request<'a, I>(
    headers: I,
    payload: &[u8],
    secret: &str,
    max_age_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), VerificationError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parsed = parse_signature_headers(headers);
    let signature = parsed.signature.ok_or(VerificationError::MissingSignature)?;
    let timestamp_str = parsed.timestamp.ok_or(VerificationError::MissingTimestamp)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|_| VerificationError::InvalidTimestamp)?
        .with_timezone(&Utc);

    if !is_timestamp_fresh(timestamp, now, max_age_secs) {
        return Err(VerificationError::StaleTimestamp);
    }

    if verify_signature(payload, &signature, secret) {
        Ok(())
    } else {
        Err(VerificationError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sign_verify_round_trip() {
        let payload = br#"{"id":"evt_1","type":"work_item.created"}"#;
        let signature = sign_payload(payload, "s3cr3t");
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature(payload, &signature, "s3cr3t"));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let payload = b"payload";
        let signature = sign_payload(payload, "secret-a");
        assert!(!verify_signature(payload, &signature, "secret-b"));
    }

    #[test]
    fn verify_rejects_different_payload() {
        let signature = sign_payload(b"payload-one", "s3cr3t");
        assert!(!verify_signature(b"payload-two", &signature, "s3cr3t"));
    }

    #[test]
    fn verify_rejects_missing_prefix() {
        let signature = sign_payload(b"payload", "s3cr3t");
        let bare = signature.strip_prefix("sha256=").unwrap();
        assert!(!verify_signature(b"payload", bare, "s3cr3t"));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify_signature(b"payload", "sha256=zzzz", "s3cr3t"));
    }

    #[test]
    fn signature_is_hex_sha256_length() {
        let signature = sign_payload(b"payload", "s3cr3t");
        let hex_part = signature.strip_prefix("sha256=").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn timestamp_freshness_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let fresh = now - chrono::Duration::seconds(200);
        let stale = now - chrono::Duration::seconds(400);
        let future = now + chrono::Duration::seconds(30);

        assert!(is_timestamp_fresh(fresh, now, 300));
        assert!(!is_timestamp_fresh(stale, now, 300));
        assert!(!is_timestamp_fresh(future, now, 300));
    }

    #[test]
    fn full_request_verification() {
        let payload = br#"{"id":"evt_1"}"#;
        let secret = "s3cr3t";
        let now = Utc::now();
        let timestamp = now.to_rfc3339();
        let signature = sign_payload(payload, secret);

        let headers = vec![
            ("Content-Type", "application/json"),
            ("X-Webhook-Signature", signature.as_str()),
            ("X-Webhook-Timestamp", timestamp.as_str()),
        ];

        assert_eq!(
            verify_webhook_request(headers.iter().copied(), payload, secret, 300, now),
            Ok(())
        );
    }

    #[test]
    fn request_verification_missing_headers() {
        let result = verify_webhook_request(
            std::iter::empty::<(&str, &str)>(),
            b"payload",
            "s3cr3t",
            300,
            Utc::now(),
        );
        assert_eq!(result, Err(VerificationError::MissingSignature));
    }
}
