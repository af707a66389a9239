//! `Credential` resolution: `Authorization: Bearer <jwt>` or `X-API-Key:
//! <key>`, both producing the same internal user context.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use waddle_core::types::{ApiKeyRecord, Credential, JwtClaims};

use crate::error::{Result, RouterError};

/// Mint a JWT for a user with the standard claim shape
/// (`sub, username, email, roles, iat, exp`).
pub fn issue_jwt(claims: &JwtClaims, secret: &str) -> Result<String> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| RouterError::Internal(format!("jwt encode failed: {e}")))
}

/// Decode and validate a bearer token, rejecting expired or malformed
/// tokens as `Unauthenticated`.
pub fn decode_jwt(token: &str, secret: &str) -> Result<JwtClaims> {
    let data = decode::<JwtClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map_err(|e| RouterError::Unauthenticated(format!("invalid bearer token: {e}")))?;
    Ok(data.claims)
}

/// Durable API key store: keys are hashed with SHA-256 before storage, the
/// same "never persist the raw secret" discipline
/// `shared/py_libs/py_libs/crypto` applies to passwords.
pub struct ApiKeyStore {
    db: std::sync::Mutex<Connection>,
}

impl ApiKeyStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_keys (
                key_id      TEXT PRIMARY KEY,
                key_hash    TEXT NOT NULL,
                owner       TEXT NOT NULL,
                permissions TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash);",
        )?;
        Ok(Self {
            db: std::sync::Mutex::new(conn),
        })
    }

    /// Issue a new key for `owner`. Returns the raw key — shown to the
    /// caller exactly once; only its hash is retained.
    pub fn issue(&self, owner: &str, permissions: &[String]) -> Result<String> {
        let key_id = uuid::Uuid::new_v4().to_string();
        let raw_key = format!("wbk_{}", uuid::Uuid::new_v4().simple());
        let hash = hex::encode(Sha256::digest(raw_key.as_bytes()));
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO api_keys (key_id, key_hash, owner, permissions, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key_id,
                hash,
                owner,
                serde_json::to_string(permissions)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(raw_key)
    }

    pub fn verify(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>> {
        let hash = hex::encode(Sha256::digest(raw_key.as_bytes()));
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT key_id, owner, permissions FROM api_keys WHERE key_hash = ?1",
            params![hash],
            |r| {
                let key_id: String = r.get(0)?;
                let owner: String = r.get(1)?;
                let permissions_str: String = r.get(2)?;
                Ok((key_id, owner, permissions_str))
            },
        )
        .optional()?
        .map(|(key_id, owner, permissions_str)| -> Result<ApiKeyRecord> {
            Ok(ApiKeyRecord {
                key_id,
                owner,
                permissions: serde_json::from_str(&permissions_str)?,
            })
        })
        .transpose()
    }
}

/// Resolve either header form into the shared `Credential` sum type. `auth`
/// is the `Authorization` header value (if present); `api_key` is the
/// `X-API-Key` header value (if present). `Authorization` is tried first.
pub fn resolve_credential(
    auth_header: Option<&str>,
    api_key_header: Option<&str>,
    jwt_secret: &str,
    api_keys: &ApiKeyStore,
) -> Result<Credential> {
    if let Some(h) = auth_header {
        let token = h
            .strip_prefix("Bearer ")
            .ok_or_else(|| RouterError::Unauthenticated("Authorization header must be a Bearer token".into()))?;
        return Ok(Credential::Jwt(decode_jwt(token, jwt_secret)?));
    }
    if let Some(key) = api_key_header {
        let record = api_keys
            .verify(key)?
            .ok_or_else(|| RouterError::Unauthenticated("unknown API key".into()))?;
        return Ok(Credential::ApiKey(record));
    }
    Err(RouterError::Unauthenticated(
        "missing Authorization or X-API-Key header".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> JwtClaims {
        JwtClaims {
            sub: "user-1".into(),
            username: "alice".into(),
            email: Some("alice@example.com".into()),
            roles: vec!["member".into()],
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
        }
    }

    #[test]
    fn jwt_round_trips() {
        let token = issue_jwt(&claims(), "secret").unwrap();
        let decoded = decode_jwt(&token, "secret").unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn jwt_wrong_secret_is_unauthenticated() {
        let token = issue_jwt(&claims(), "secret").unwrap();
        let err = decode_jwt(&token, "wrong").unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
    }

    #[test]
    fn api_key_issue_then_verify_round_trips() {
        let store = ApiKeyStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let raw = store.issue("owner-1", &["read".to_string()]).unwrap();
        let record = store.verify(&raw).unwrap().unwrap();
        assert_eq!(record.owner, "owner-1");
    }

    #[test]
    fn unknown_api_key_is_none() {
        let store = ApiKeyStore::new(Connection::open_in_memory().unwrap()).unwrap();
        assert!(store.verify("bogus").unwrap().is_none());
    }

    #[test]
    fn resolve_credential_prefers_bearer_over_api_key() {
        let store = ApiKeyStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let token = issue_jwt(&claims(), "secret").unwrap();
        let bearer = format!("Bearer {token}");
        let cred = resolve_credential(Some(&bearer), Some("irrelevant"), "secret", &store).unwrap();
        assert!(matches!(cred, Credential::Jwt(_)));
    }

    #[test]
    fn resolve_credential_missing_both_headers_errors() {
        let store = ApiKeyStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let err = resolve_credential(None, None, "secret", &store).unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
    }
}
