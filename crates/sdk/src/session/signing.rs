//! Session cookie signing
//!
//! Cookie values have the form `s:<id>.<signature>` where the signature is
//! the unpadded base64 HMAC-SHA256 of the id keyed by the session secret.
//! Other gateway components verify cookies in the same format.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

/// Random bytes in a session id (32 base64url characters)
const SESSION_ID_BYTES: usize = 24;

const SIGNED_PREFIX: &str = "s:";

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &str, value: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(value.as_bytes());
    mac
}

/// Generate a new unguessable session id
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Sign a session id for the cookie
pub fn sign(value: &str, secret: &str) -> String {
    let signature = keyed_mac(secret, value).finalize().into_bytes();
    format!("{SIGNED_PREFIX}{value}.{}", STANDARD_NO_PAD.encode(signature))
}

/// Verify a signed cookie value and return the session id (constant-time)
pub fn unsign(signed: &str, secret: &str) -> Option<String> {
    let body = signed.strip_prefix(SIGNED_PREFIX)?;
    let (value, signature) = body.rsplit_once('.')?;
    let signature = STANDARD_NO_PAD.decode(signature).ok()?;
    keyed_mac(secret, value).verify_slice(&signature).ok()?;
    Some(value.to_string())
}
