//! Kalshi request signing — RSA-PSS over `"{unix_ms}{method}{path}"`
//!: SHA-256, MGF1-SHA-256, salt length = digest length (32).
//! Every REST request and the WebSocket upgrade carry the resulting
//! headers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pss::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

use crate::config::KalshiConfig;
use crate::ports::venue::VenueError;

pub const WS_PATH: &str = "/trade-api/ws/v2";

/// Holds the parsed RSA private key and signs requests on demand.
#[derive(Clone)]
pub struct KalshiAuth {
    key_id: String,
    private_key: RsaPrivateKey,
}

/// The three `KALSHI-ACCESS-*` headers for a single request.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub key: String,
    pub timestamp: String,
    pub signature: String,
}

impl KalshiAuth {
    pub fn from_pem(key_id: String, pem: &str) -> Result<Self, VenueError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| VenueError::Auth(format!("invalid Kalshi private key: {e}")))?;
        Ok(Self { key_id, private_key })
    }

    /// Build auth from a `KalshiConfig`, preferring inline PEM over a path
    /// on disk; unauthenticated (`None`) if neither credential is set.
    pub fn from_config(config: &KalshiConfig) -> anyhow::Result<Option<Self>> {
        let auth = match (&config.key_id, &config.private_key_pem, &config.private_key_path) {
            (Some(key_id), Some(pem), _) => Some(Self::from_pem(key_id.clone(), pem)?),
            (Some(key_id), None, Some(path)) => {
                let pem = std::fs::read_to_string(path)?;
                Some(Self::from_pem(key_id.clone(), &pem)?)
            }
            _ => None,
        };
        Ok(auth)
    }

    /// Sign `"{unix_ms}{method}{path}"` and produce the access headers for
    /// one request. `now_ms` is caller-supplied so auth is testable without
    /// a wall-clock read inside this module.
    pub fn sign(&self, now_ms: i64, method: &str, path: &str) -> AuthHeaders {
        let message = format!("{now_ms}{method}{path}");
        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign_with_rng(&mut rand::thread_rng(), message.as_bytes());
        AuthHeaders {
            key: self.key_id.clone(),
            timestamp: now_ms.to_string(),
            signature: BASE64.encode(signature.to_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn test_key_pem() -> String {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        key.to_pkcs8_pem(Default::default()).unwrap().to_string()
    }

    #[test]
    fn signs_with_distinct_headers_per_call() {
        let pem = test_key_pem();
        let auth = KalshiAuth::from_pem("key-1".into(), &pem).unwrap();
        let h1 = auth.sign(1_700_000_000_000, "GET", WS_PATH);
        let h2 = auth.sign(1_700_000_000_001, "GET", WS_PATH);
        assert_eq!(h1.key, "key-1");
        assert_eq!(h1.timestamp, "1700000000000");
        assert_ne!(h1.signature, h2.signature);
    }

    #[test]
    fn rejects_malformed_pem() {
        assert!(KalshiAuth::from_pem("k".into(), "not a pem").is_err());
    }
}
