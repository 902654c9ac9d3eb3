//! Signed webhook verification.
//!
//! Every inbound delivery is verified with HMAC-SHA256 over a
//! vendor-specific string-to-sign before the payload is looked at.
//! Verification failure is a boolean outcome, never an error: parse
//! failures, bad hex, and stale timestamps all return `false`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;


type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed clock skew between a signed timestamp and now.
pub const MAX_SKEW_SECS: i64 = 300;

/// Vendor-specific string-to-sign construction.
#[derive(Clone, Debug, PartialEq)]
pub enum SignatureScheme {
    /// Facebook-style: HMAC-SHA256 over the raw body; header value is
    /// `sha256=<hex>`. No timestamp component.
    HubSha256,
    /// TikTok-style: HMAC-SHA256 over `timestamp || nonce || body`;
    /// header value is plain hex. The timestamp is replay-checked.
    TimestampNonceBody,
}

/// One inbound webhook delivery, as received. Transient: exists only
/// during verification.
#[derive(Clone, Debug)]
pub struct WebhookEnvelope {
    /// Raw signature header value (e.g. `sha256=ab12...` or plain hex).
    pub signature: String,
    /// Signed Unix timestamp (seconds), for schemes that include one.
    pub timestamp: Option<i64>,
    /// Signed nonce, for schemes that include one.
    pub nonce: Option<String>,
    /// Raw request body, exactly as received.
    pub body: Vec<u8>,
}

/// Verifies webhook deliveries for a single platform.
pub struct SignedWebhookVerifier {
    scheme: SignatureScheme,
    max_skew_secs: i64,
}

impl SignedWebhookVerifier {
    pub fn new(scheme: SignatureScheme) -> Self {
        Self {
            scheme,
            max_skew_secs: MAX_SKEW_SECS,
        }
    }

    /// Overrides the replay window (tests, nonstandard vendors).
    pub fn with_max_skew(mut self, max_skew_secs: i64) -> Self {
        self.max_skew_secs = max_skew_secs;
        self
    }

    /// Recomputes the signature and compares it in constant time.
    ///
    /// Returns false on any mismatch, missing component, undecodable
    /// signature, or timestamp outside the replay window.
    pub fn verify(&self, envelope: &WebhookEnvelope, secret: &str) -> bool {
        let provided_hex = match self.scheme {
            SignatureScheme::HubSha256 => {
                match envelope.signature.strip_prefix("sha256=") {
                    Some(hex) => hex,
                    None => return false,
                }
            }
            SignatureScheme::TimestampNonceBody => envelope.signature.as_str(),
        };

        // Replay window check before any digest work
        if self.scheme == SignatureScheme::TimestampNonceBody {
            let Some(timestamp) = envelope.timestamp else {
                return false;
            };
            if (Utc::now().timestamp() - timestamp).abs() > self.max_skew_secs {
                return false;
            }
        }

        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };

        match self.scheme {
            SignatureScheme::HubSha256 => {
                mac.update(&envelope.body);
            }
            SignatureScheme::TimestampNonceBody => {
                // Checked above
                let timestamp = envelope.timestamp.unwrap_or_default();
                mac.update(timestamp.to_string().as_bytes());
                if let Some(nonce) = &envelope.nonce {
                    mac.update(nonce.as_bytes());
                }
                mac.update(&envelope.body);
            }
        }

        let expected_hex = hex::encode(mac.finalize().into_bytes());
        constant_time_eq(provided_hex.as_bytes(), expected_hex.as_bytes())
    }
}

/// Computes the signature header value a vendor would send. Used by the
/// receiver tests and the connection tester.
pub fn sign(
    scheme: &SignatureScheme,
    secret: &str,
    timestamp: Option<i64>,
    nonce: Option<&str>,
    body: &[u8],
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");

    match scheme {
        SignatureScheme::HubSha256 => {
            mac.update(body);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        }
        SignatureScheme::TimestampNonceBody => {
            mac.update(timestamp.unwrap_or_default().to_string().as_bytes());
            if let Some(nonce) = nonce {
                mac.update(nonce.as_bytes());
            }
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Checks the subscription handshake: `hub.mode=subscribe` with a
/// matching verify token. Returns the challenge to echo back.
pub fn verify_challenge<'a>(
    mode: &str,
    verify_token: &str,
    challenge: &'a str,
    expected_token: &str,
) -> Option<&'a str> {
    if mode == "subscribe" && constant_time_eq(verify_token.as_bytes(), expected_token.as_bytes())
    {
        Some(challenge)
    } else {
        None
    }
}

/// Constant-time byte comparison. Length mismatch short-circuits, which
/// leaks only the length, not the content.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
