//! Time-based one-time passcode generation (RFC 6238).
//!
//! Pure function, no I/O: given the shared base32 secret the identity
//! provider issued at MFA enrollment, produce the code for the current
//! 30-second interval. Codes are inherently racy near interval boundaries;
//! there is deliberately no retry here - the login driver regenerates a
//! fresh code on a new attempt rather than resubmitting a stale one.

use std::time::{SystemTime, UNIX_EPOCH};

use ring::hmac;

use crate::error::{SessionError, SessionResult};

/// TOTP interval and code-length parameters. Defaults per RFC 6238.
#[derive(Debug, Clone, Copy)]
pub struct TotpParams {
    pub step_secs: u64,
    pub digits: u32,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            step_secs: 30,
            digits: 6,
        }
    }
}

/// Generate the code for the current time with default parameters.
///
/// Fails with a configuration error when the secret is absent or not valid
/// base32 - that is a deployment defect, not a transient condition.
pub fn generate(secret: &str) -> SessionResult<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SessionError::configuration(format!("system clock before epoch: {e}")))?
        .as_secs();
    generate_at(secret, now, &TotpParams::default())
}

/// Generate the code for an explicit unix timestamp. Deterministic; the seam
/// tests use for RFC 6238 vectors.
pub fn generate_at(secret: &str, unix_secs: u64, params: &TotpParams) -> SessionResult<String> {
    if secret.trim().is_empty() {
        return Err(SessionError::configuration(
            "OTP secret is empty - set the application's OTP secret environment variable",
        ));
    }

    let key_bytes = decode_base32(secret).ok_or_else(|| {
        SessionError::configuration("OTP secret is not valid base32 (RFC 4648)")
    })?;

    let counter = unix_secs / params.step_secs;
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &key_bytes);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    // Dynamic truncation per RFC 4226 §5.3.
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let modulus = 10u32.pow(params.digits);
    Ok(format!(
        "{:0width$}",
        binary % modulus,
        width = params.digits as usize
    ))
}

/// Decode RFC 4648 base32, case-insensitive, padding optional. Returns
/// `None` on any character outside the alphabet.
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let mut bits: u32 = 0;
    let mut bit_count: u32 = 0;
    let mut out = Vec::with_capacity(input.len() * 5 / 8);

    for ch in input.trim_end_matches('=').bytes() {
        let upper = ch.to_ascii_uppercase();
        let value = ALPHABET.iter().position(|&a| a == upper)? as u32;
        bits = (bits << 5) | value;
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            out.push((bits >> bit_count) as u8);
            bits &= (1 << bit_count) - 1;
        }
    }

    if out.is_empty() {
        return None;
    }
    Some(out)
}
