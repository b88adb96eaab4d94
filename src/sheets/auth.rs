//! Service account authorization for the Sheets API (OAuth2 JWT bearer grant).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{error::ConfigError, sheets::SheetsError};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The fields of a service account key file that the grant needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|reason| ConfigError::Credentials {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse and check that the private key is a usable RSA key.
    pub fn from_json(content: &str) -> Result<Self, String> {
        let key: Self = serde_json::from_str(content).map_err(|e| e.to_string())?;
        key.encoding_key().map_err(|e| e.to_string())?;
        Ok(key)
    }

    fn encoding_key(&self) -> jsonwebtoken::errors::Result<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signed JWT assertion for the token endpoint.
pub fn sign_assertion(
    key: &ServiceAccountKey,
    scope: &str,
    now: DateTime<Utc>,
) -> Result<String, SheetsError> {
    let claims = Claims {
        iss: key.client_email.clone(),
        scope: scope.to_string(),
        aud: key.token_uri.clone(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let encoding = key
        .encoding_key()
        .map_err(|e| SheetsError::Auth(format!("invalid private key: {}", e)))?;
    jsonwebtoken::encode(&header, &claims, &encoding)
        .map_err(|e| SheetsError::Auth(format!("signing assertion: {}", e)))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// Hands out bearer tokens, fetching a new one only when the cached token is
/// about to expire.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    scope: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self {
            key,
            scope: SHEETS_SCOPE.to_string(),
            http,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(tok) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(tok.token.clone());
        }

        let assertion = sign_assertion(&self.key, &self.scope, now)?;
        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SheetsError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        let parsed: TokenResponse = serde_json::from_str(&body)?;
        debug!(account = %self.key.client_email, expires_in = parsed.expires_in, "obtained access token");

        let token = parsed.access_token.clone();
        *cached = Some(CachedToken {
            token: parsed.access_token,
            expires_at: now + Duration::seconds(parsed.expires_in),
        });
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/test_rsa_key.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/test_rsa_key.pub.pem");

    fn key_json() -> String {
        serde_json::json!({
            "type": "service_account",
            "client_email": "etl@project.iam.gserviceaccount.com",
            "private_key": PRIVATE_PEM,
            "private_key_id": "abc123",
        })
        .to_string()
    }

    #[test]
    fn parses_key_and_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(&key_json()).unwrap();
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
        assert!(!format!("{:?}", key).contains("PRIVATE KEY"));
    }

    #[test]
    fn rejects_non_rsa_private_key() {
        let json = serde_json::json!({
            "client_email": "x@y",
            "private_key": "not a key",
        })
        .to_string();
        assert!(ServiceAccountKey::from_json(&json).is_err());
    }

    #[test]
    fn assertion_carries_expected_claims() {
        let key = ServiceAccountKey::from_json(&key_json()).unwrap();
        let now = Utc::now();
        let jwt = sign_assertion(&key, SHEETS_SCOPE, now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[key.token_uri.as_str()]);
        let decoded = jsonwebtoken::decode::<Claims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.header.kid.as_deref(), Some("abc123"));
        assert_eq!(decoded.claims.iss, key.client_email);
        assert_eq!(decoded.claims.scope, SHEETS_SCOPE);
        assert_eq!(decoded.claims.exp - decoded.claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn cached_token_expires_with_margin() {
        let now = Utc::now();
        let tok = CachedToken {
            token: "t".into(),
            expires_at: now + Duration::seconds(EXPIRY_MARGIN_SECS + 5),
        };
        assert!(tok.is_fresh(now));
        assert!(!tok.is_fresh(now + Duration::seconds(10)));
    }

    #[test]
    fn missing_credentials_file_is_config_error() {
        let err = ServiceAccountKey::from_file(Path::new("/nonexistent/creds.json")).unwrap_err();
        assert!(matches!(err, ConfigError::CredentialsIo { .. }));
    }
}
