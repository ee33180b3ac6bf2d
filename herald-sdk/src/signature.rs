//! HMAC-SHA256 body signing shared by every Herald integration point.
//!
//! Outgoing channel and reminder requests and incoming RSVP pushes all carry
//! the same header:
//!
//! ```text
//! Herald-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{timestamp}.{json_body}", secret)`.
//! Receivers reject signatures older than [`MAX_SIGNATURE_AGE`] seconds.

use ring::hmac;
use std::fmt;
use std::str::FromStr;

pub const SIGNATURE_HEADER: &str = "Herald-Signature";

/// Seconds a signature stays acceptable.
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Payloads that travel signed.
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

/// Parsed value of the [`SIGNATURE_HEADER`] header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub mac: Box<[u8]>,
}

impl SignatureHeader {
    /// Sign `json` as of `timestamp`.
    pub fn sign(timestamp: i64, json: &str, secret: &[u8]) -> Self {
        let tag = hmac::sign(&key(secret), signed_data(timestamp, json).as_bytes());
        Self {
            timestamp,
            mac: tag.as_ref().into(),
        }
    }

    /// Check the MAC over `json`, then the age of the timestamp.
    pub fn verify(&self, json: &str, secret: &[u8]) -> Result<(), SignatureError> {
        hmac::verify(
            &key(secret),
            signed_data(self.timestamp, json).as_bytes(),
            &self.mac,
        )
        .map_err(|_| SignatureError::SignatureMismatch)?;
        if unix_now() - self.timestamp > MAX_SIGNATURE_AGE {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

impl FromStr for SignatureHeader {
    type Err = SignatureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
        let timestamp = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidFormat)?;
        let mac = fast32::base64::RFC4648_NOPAD
            .decode_str(encoded)
            .map_err(|_| SignatureError::InvalidBase64)?
            .into_boxed_slice();
        Ok(Self { timestamp, mac })
    }
}

impl fmt::Display for SignatureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.timestamp,
            fast32::base64::RFC4648_NOPAD.encode(&self.mac)
        )
    }
}

fn key(secret: &[u8]) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret)
}

fn signed_data(timestamp: i64, json: &str) -> String {
    format!("{timestamp}.{json}")
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// A typed payload together with the exact JSON it was signed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub json: String,
    pub header: SignatureHeader,
}

impl<T: Signature> SignedObject<T> {
    /// Serialize and sign `body` as of now.
    pub fn new(body: T, secret: &[u8]) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let header = SignatureHeader::sign(unix_now(), &json, secret);
        Ok(Self { body, json, header })
    }

    /// Parse a received header and body. The MAC is not checked until
    /// [`verify`](Self::verify).
    pub fn from_header_and_body(header: &str, json: String) -> Result<Self, SignatureError> {
        let header = header.parse()?;
        let body = serde_json::from_str(&json)?;
        Ok(Self { body, json, header })
    }

    /// The authenticated payload, if the signature holds and is fresh.
    pub fn verify(self, secret: &[u8]) -> Result<T, SignatureError> {
        self.header.verify(&self.json, secret)?;
        Ok(self.body)
    }

    pub fn to_header(&self) -> String {
        self.header.to_string()
    }
}

/// Header value for a body that is already serialized, so the bytes sent
/// are the bytes signed.
pub fn sign_json(json: &str, secret: &[u8]) -> String {
    SignatureHeader::sign(unix_now(), json, secret).to_string()
}
