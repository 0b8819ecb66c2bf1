use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{Actor, ActorId, Role};

/// Bearer token payload. `role` travels as its wire name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub role_confirmed: bool,
    pub exp: i64,
}

impl Claims {
    pub fn for_actor(actor: &Actor, issued_at: DateTime<Utc>, ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            sub: actor.id.0.clone(),
            name: actor.name.clone(),
            role: actor.role.as_str().to_string(),
            role_confirmed: actor.role_confirmed,
            exp: issued_at.timestamp().saturating_add(ttl),
        }
    }

    pub fn into_actor(self) -> Result<Actor, SessionError> {
        let role = Role::parse(&self.role).ok_or(SessionError::UnknownRole(self.role.clone()))?;
        if self.sub.trim().is_empty() {
            return Err(SessionError::MissingSubject);
        }
        Ok(Actor {
            id: ActorId(self.sub),
            name: self.name,
            role,
            role_confirmed: self.role_confirmed,
        })
    }
}

/// The authenticated caller of one HTTP request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub actor: Actor,
    pub correlation_id: String,
}

impl Session {
    pub fn new(actor: Actor, correlation_id: impl Into<String>) -> Self {
        Self { actor, correlation_id: correlation_id.into() }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token carries unknown role `{0}`")]
    UnknownRole(String),
    #[error("token has no subject")]
    MissingSubject,
}

/// HS256 signer and verifier sharing one secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: SecretString,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("ttl_secs", &self.ttl_secs).finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: SecretString, ttl_secs: u64) -> Self {
        Self { secret, ttl_secs }
    }

    pub fn issue(&self, actor: &Actor, issued_at: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = Claims::for_actor(actor, issued_at, self.ttl_secs);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Actor, SessionError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        data.claims.into_actor()
    }

    /// Accepts the raw `Authorization` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Actor, SessionError> {
        let header = header.ok_or(SessionError::MissingToken)?;
        let token = header.strip_prefix("Bearer ").ok_or(SessionError::MalformedHeader)?;
        self.verify(token.trim())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use secrecy::SecretString;

    use super::{SessionError, TokenCodec};
    use crate::domain::actor::{Actor, Role};

    fn codec() -> TokenCodec {
        TokenCodec::new(SecretString::from("test-secret-value".to_string()), 3600)
    }

    #[test]
    fn issued_token_verifies_back_to_the_same_actor() {
        let actor = Actor::new("analyst-1", "Ben Analyst", Role::BudgetAnalyst).unconfirmed();
        let token = codec().issue(&actor, Utc::now()).expect("token issues");

        let decoded = codec().verify_header(Some(&format!("Bearer {token}"))).expect("verifies");
        assert_eq!(decoded, actor);
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let actor = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        let stale = codec().issue(&actor, Utc::now() - Duration::hours(3)).expect("token issues");
        assert!(matches!(codec().verify(&stale), Err(SessionError::InvalidToken(_))));

        let other = TokenCodec::new(SecretString::from("another-secret".to_string()), 3600);
        let foreign = other.issue(&actor, Utc::now()).expect("token issues");
        assert!(codec().verify(&foreign).is_err());
    }

    #[test]
    fn header_must_be_bearer() {
        assert!(matches!(codec().verify_header(None), Err(SessionError::MissingToken)));
        assert!(matches!(
            codec().verify_header(Some("Basic abc")),
            Err(SessionError::MalformedHeader)
        ));
    }
}
