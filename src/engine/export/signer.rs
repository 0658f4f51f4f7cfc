use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::engine::errors::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters of a signed download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub key: String,
    pub expires: i64,
    pub signature: String,
}

/// Issues and checks expiring HMAC-SHA256 signed download URLs.
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            secret: secret.as_ref().to_vec(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(b"GET\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn presign(&self, key: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.sign(key, expires);
        format!(
            "{}/objects/{}?expires={}&signature={}",
            self.base_url, key, expires, signature
        )
    }

    pub fn verify(&self, url: &SignedUrl) -> Result<(), StoreError> {
        self.verify_at(url, Utc::now().timestamp())
    }

    pub fn verify_at(&self, url: &SignedUrl, now: i64) -> Result<(), StoreError> {
        let expected = self.sign(&url.key, url.expires);
        if !bool::from(expected.as_bytes().ct_eq(url.signature.as_bytes())) {
            warn!(target: "glide::export", key = %url.key, "Invalid download signature");
            return Err(StoreError::InvalidSignature);
        }
        if now > url.expires {
            return Err(StoreError::Expired);
        }
        Ok(())
    }
}
