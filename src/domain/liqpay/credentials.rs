//! Merchant key pair and envelope sealing.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use super::{codec, signature};

/// API version sent with every request.
pub const API_VERSION: u8 = 3;

/// Signed request envelope (`data` + `signature` form fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub data: String,
    pub signature: String,
}

/// LiqPay merchant keys. Either key may be blank when the integration is
/// not configured; that is reported at request time, never at startup.
#[derive(Clone)]
pub struct LiqPayCredentials {
    public_key: SecretString,
    private_key: SecretString,
}

impl LiqPayCredentials {
    pub fn new(public_key: SecretString, private_key: SecretString) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Convenience constructor for plain strings.
    pub fn from_keys(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self::new(
            SecretString::new(public_key.into()),
            SecretString::new(private_key.into()),
        )
    }

    /// Keys absent; every operation reports the integration as not configured.
    pub fn unconfigured() -> Self {
        Self::from_keys("", "")
    }

    /// Enough to verify callbacks.
    pub fn has_private_key(&self) -> bool {
        !self.private_key.expose_secret().trim().is_empty()
    }

    /// Enough to call the API and build checkouts.
    pub fn is_configured(&self) -> bool {
        self.has_private_key() && !self.public_key.expose_secret().trim().is_empty()
    }

    pub fn public_key(&self) -> &str {
        self.public_key.expose_secret().trim()
    }

    /// Checks a callback signature. False when no private key is set.
    pub fn verify(&self, data: &str, signature: &str) -> bool {
        signature::verify(data, signature, self.private_key.expose_secret().trim())
    }

    /// Adds `version` and `public_key`, encodes and signs the parameters.
    pub fn seal(&self, params: &Map<String, Value>) -> SealedEnvelope {
        let mut envelope = Map::new();
        envelope.insert("version".to_string(), Value::from(API_VERSION));
        envelope.insert(
            "public_key".to_string(),
            Value::String(self.public_key().to_string()),
        );
        for (key, value) in params {
            envelope.insert(key.clone(), value.clone());
        }
        let data = codec::encode(&envelope);
        let signature = signature::sign(&data, self.private_key.expose_secret().trim());
        SealedEnvelope { data, signature }
    }
}

impl std::fmt::Debug for LiqPayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiqPayCredentials")
            .field("public_key", &self.public_key())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_keys_are_not_configured() {
        let creds = LiqPayCredentials::from_keys("  ", "");
        assert!(!creds.is_configured());
        assert!(!creds.has_private_key());
        assert!(!creds.verify("data", "sig"));
    }

    #[test]
    fn private_key_alone_verifies_callbacks() {
        let creds = LiqPayCredentials::from_keys("", "secret");
        assert!(creds.has_private_key());
        assert!(!creds.is_configured());
    }

    #[test]
    fn sealed_envelope_verifies_and_carries_version_and_key() {
        let creds = LiqPayCredentials::from_keys("pub_1", "secret");
        let mut params = Map::new();
        params.insert("action".to_string(), json!("status"));

        let sealed = creds.seal(&params);

        assert!(creds.verify(&sealed.data, &sealed.signature));
        let payload = codec::decode(&sealed.data).unwrap();
        assert_eq!(payload.text("version").as_deref(), Some("3"));
        assert_eq!(payload.text("public_key").as_deref(), Some("pub_1"));
        assert_eq!(payload.action().as_deref(), Some("status"));
    }

    #[test]
    fn debug_redacts_private_key() {
        let creds = LiqPayCredentials::from_keys("pub_1", "secret");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
    }
}
