use crate::core::errors::ExchangeError;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Result type for signing operations: headers to add to the request
pub type SignatureResult = Result<HashMap<String, String>, ExchangeError>;

/// Signer trait for request authentication
///
/// Implementations only produce headers; the request body is never touched.
pub trait Signer: Send + Sync {
    /// Sign a request and return the authentication headers
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, PUT)
    /// * `target` - Request target (path plus query string)
    /// * `body` - Raw request body bytes, empty when absent
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(&self, method: &str, target: &str, body: &[u8], timestamp: u64)
        -> SignatureResult;
}

/// Header names an HMAC-signing exchange expects
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub api_key: &'static str,
    pub timestamp: &'static str,
    pub signature: &'static str,
    pub passphrase: &'static str,
    /// Header name and value announcing the key version, if any
    pub api_version: Option<(&'static str, &'static str)>,
    /// Whether the passphrase is sent HMAC-signed rather than in clear
    pub sign_passphrase: bool,
}

impl SignatureHeaders {
    /// KuCoin API key version 2
    pub const fn kucoin() -> Self {
        Self {
            api_key: "KC-API-KEY",
            timestamp: "KC-API-TIMESTAMP",
            signature: "KC-API-SIGN",
            passphrase: "KC-API-PASSPHRASE",
            api_version: Some(("KC-API-KEY-VERSION", "2")),
            sign_passphrase: true,
        }
    }
}

/// HMAC-SHA256 signer producing base64 signatures over
/// `timestamp + method + target + body`
pub struct HmacSigner {
    api_key: String,
    secret_key: String,
    passphrase: Option<String>,
    headers: SignatureHeaders,
}

impl HmacSigner {
    pub fn new(
        api_key: String,
        secret_key: String,
        passphrase: Option<String>,
        headers: SignatureHeaders,
    ) -> Self {
        Self {
            api_key,
            secret_key,
            passphrase,
            headers,
        }
    }

    fn hmac_base64(&self, payload: &[u8]) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::SigningError(format!("Invalid secret key: {}", e)))?;
        mac.update(payload);
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// The exact string an exchange signs; order matters
pub fn canonical_string(
    timestamp: u64,
    method: &str,
    target: &str,
    body: &[u8],
) -> Result<String, ExchangeError> {
    let body = std::str::from_utf8(body)
        .map_err(|e| ExchangeError::SigningError(format!("Invalid body encoding: {}", e)))?;
    Ok(format!("{}{}{}{}", timestamp, method, target, body))
}

impl Signer for HmacSigner {
    fn sign_request(
        &self,
        method: &str,
        target: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult {
        let prehash = canonical_string(timestamp, method, target, body)?;
        let signature = self.hmac_base64(prehash.as_bytes())?;

        let mut headers = HashMap::new();
        headers.insert(self.headers.api_key.to_string(), self.api_key.clone());
        headers.insert(self.headers.timestamp.to_string(), timestamp.to_string());
        headers.insert(self.headers.signature.to_string(), signature);

        if let Some((name, value)) = self.headers.api_version {
            headers.insert(name.to_string(), value.to_string());
        }

        if let Some(passphrase) = &self.passphrase {
            let value = if self.headers.sign_passphrase {
                self.hmac_base64(passphrase.as_bytes())?
            } else {
                passphrase.clone()
            };
            headers.insert(self.headers.passphrase.to_string(), value);
        }

        Ok(headers)
    }
}

/// Signer that only attaches the API key header (no signature)
pub struct ApiKeySigner {
    header: &'static str,
    api_key: String,
}

impl ApiKeySigner {
    pub fn new(header: &'static str, api_key: String) -> Self {
        Self { header, api_key }
    }
}

impl Signer for ApiKeySigner {
    fn sign_request(
        &self,
        _method: &str,
        _target: &str,
        _body: &[u8],
        _timestamp: u64,
    ) -> SignatureResult {
        let mut headers = HashMap::new();
        headers.insert(self.header.to_string(), self.api_key.clone());
        Ok(headers)
    }
}

#[allow(clippy::cast_possible_truncation)]
pub fn get_timestamp() -> Result<u64, ExchangeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .map_err(|e| ExchangeError::SigningError(format!("System time error: {}", e)))
}
