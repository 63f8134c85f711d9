use std::path::Path;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LoadError;

const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets.readonly \
                      https://www.googleapis.com/auth/drive.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// The fields we need from a Google service-account key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Credentials(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| LoadError::Credentials(format!("{}: {}", path.display(), e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Sign a JWT assertion for `key`, valid for one hour from `now`.
pub fn sign_assertion(key: &ServiceAccountKey, token_uri: &str, now: i64) -> Result<String, LoadError> {
    let claims = Claims {
        iss: &key.client_email,
        scope: SCOPES,
        aud: token_uri,
        iat: now,
        exp: now + TOKEN_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| LoadError::Credentials(format!("invalid private key: {}", e)))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| LoadError::Credentials(format!("failed to sign assertion: {}", e)))
}

/// Exchange a signed assertion for an OAuth access token.
///
/// `token_uri` overrides the one in the key file when set.
pub async fn fetch_access_token(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
    token_uri: Option<&str>,
) -> Result<String, LoadError> {
    let token_uri = token_uri.unwrap_or(&key.token_uri);
    let assertion = sign_assertion(key, token_uri, chrono::Utc::now().timestamp())?;

    debug!("Requesting access token for {}", key.client_email);
    let response = client
        .post(token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(LoadError::network)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LoadError::auth(format!("token endpoint returned {}: {}", status, body)));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| LoadError::auth(format!("malformed token response: {}", e)))?;
    Ok(token.access_token)
}
