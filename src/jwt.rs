//! JWT access token issuance and validation.
//!
//! Access tokens are short-lived and stateless: validity is purely a function of
//! the signature and the `exp` claim. Expiry is checked against the injected
//! [`Clock`] rather than the system time so it can be driven from tests.

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::sync::Arc;

use crate::clock::Clock;

/// Access token lifetime used when none is configured.
pub const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

/// Claims owned by the issuer. Extra claims with these names are dropped.
const REGISTERED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Any additional claims supplied at issue time
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Signing configuration for access tokens.
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: Vec<u8>,
    pub algorithm: Algorithm,
    pub access_token_ttl: Duration,
}

impl JwtSettings {
    /// Settings with the default algorithm (HS256) and a 15 minute lifetime.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            access_token_ttl: Duration::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
        }
    }
}

/// Parse a configured algorithm name. Only HMAC algorithms are accepted since
/// the signing key is a shared secret.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, String> {
    let algorithm: Algorithm = name
        .parse()
        .map_err(|_| format!("Unknown JWT algorithm: {}", name))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(format!(
            "Unsupported JWT algorithm {}: expected HS256, HS384 or HS512",
            name
        )),
    }
}

/// Issues and verifies access tokens.
#[derive(Clone)]
pub struct JwtService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    pub fn new(settings: &JwtSettings, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(settings.algorithm);
        // Expiry is checked against our own clock in `decode_token`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            algorithm: settings.algorithm,
            encoding_key: EncodingKey::from_secret(&settings.secret),
            decoding_key: DecodingKey::from_secret(&settings.secret),
            validation,
            access_token_ttl: settings.access_token_ttl,
            clock,
        }
    }

    /// Lifetime of newly issued access tokens.
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    /// Issue an access token for a user with no extra claims.
    pub fn issue_access_token(&self, user_id: impl Display) -> Result<String, TokenError> {
        self.issue_access_token_with_claims(user_id, Map::new())
    }

    /// Issue an access token carrying additional claims.
    ///
    /// `sub`, `iat` and `exp` are always set by the issuer; extra claims with
    /// those names are ignored.
    pub fn issue_access_token_with_claims(
        &self,
        user_id: impl Display,
        mut extra_claims: Map<String, Value>,
    ) -> Result<String, TokenError> {
        for name in REGISTERED_CLAIMS {
            extra_claims.remove(name);
        }

        let now = self.clock.now();
        let claims = AccessClaims {
            sub: Some(user_id.to_string()),
            iat: now.timestamp(),
            exp: (now + self.access_token_ttl).timestamp(),
            extra: extra_claims,
        };

        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Verify the signature and expiry of a token and return its claims.
    pub fn decode_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid(e),
                })?;

        if token_data.claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token verified but its `exp` has passed
    #[error("token has expired")]
    Expired,
    /// Bad signature, malformed encoding, wrong algorithm or missing claims
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    /// Error encoding the token
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &[u8] = b"test-secret-key-for-testing-only!";

    fn service_with_clock() -> (JwtService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let service = JwtService::new(&JwtSettings::new(SECRET), clock.clone());
        (service, clock)
    }

    #[test]
    fn test_issue_and_decode_round_trip() {
        let (jwt, clock) = service_with_clock();

        let token = jwt.issue_access_token(42).unwrap();
        let claims = jwt.decode_token(&token).unwrap();

        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert_eq!(claims.iat, clock.now().timestamp());
        assert_eq!(claims.exp, claims.iat + 15 * 60);
        assert!(claims.extra.is_empty());
    }

    #[test]
    fn test_extra_claims_are_carried() {
        let (jwt, _) = service_with_clock();

        let mut extra = Map::new();
        extra.insert("scope".to_string(), Value::from("read"));
        let token = jwt.issue_access_token_with_claims("7", extra).unwrap();

        let claims = jwt.decode_token(&token).unwrap();
        assert_eq!(claims.extra.get("scope"), Some(&Value::from("read")));
    }

    #[test]
    fn test_extra_claims_cannot_override_registered_claims() {
        let (jwt, clock) = service_with_clock();

        let mut extra = Map::new();
        extra.insert("sub".to_string(), Value::from("someone-else"));
        extra.insert("exp".to_string(), Value::from(i64::MAX));
        let token = jwt.issue_access_token_with_claims(1, extra).unwrap();

        let claims = jwt.decode_token(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("1"));
        assert_eq!(claims.exp, clock.now().timestamp() + 15 * 60);
    }

    #[test]
    fn test_expired_token() {
        let (jwt, clock) = service_with_clock();
        let token = jwt.issue_access_token(1).unwrap();

        // One second past expiry
        clock.advance(jwt.access_token_ttl() + Duration::seconds(1));

        assert!(matches!(jwt.decode_token(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_token_expires_exactly_at_exp() {
        let (jwt, clock) = service_with_clock();
        let token = jwt.issue_access_token(1).unwrap();

        clock.advance(jwt.access_token_ttl() - Duration::seconds(1));
        assert!(jwt.decode_token(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(jwt.decode_token(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_custom_ttl() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut settings = JwtSettings::new(SECRET);
        settings.access_token_ttl = Duration::minutes(1);
        let jwt = JwtService::new(&settings, clock.clone());

        let claims = jwt
            .decode_token(&jwt.issue_access_token(1).unwrap())
            .unwrap();
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_invalid_token() {
        let (jwt, _) = service_with_clock();
        assert!(matches!(
            jwt.decode_token("invalid-token"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let clock = Arc::new(ManualClock::starting_now());
        let jwt1 = JwtService::new(&JwtSettings::new(b"secret-1".to_vec()), clock.clone());
        let jwt2 = JwtService::new(&JwtSettings::new(b"secret-2".to_vec()), clock);

        let token = jwt1.issue_access_token(1).unwrap();
        assert!(matches!(
            jwt2.decode_token(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_wrong_algorithm_rejected() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut hs512 = JwtSettings::new(SECRET);
        hs512.algorithm = Algorithm::HS512;

        let issuer = JwtService::new(&hs512, clock.clone());
        let verifier = JwtService::new(&JwtSettings::new(SECRET), clock);

        let token = issuer.issue_access_token(1).unwrap();
        assert!(matches!(
            verifier.decode_token(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_token_without_subject_decodes() {
        let (jwt, clock) = service_with_clock();
        let now = clock.now().timestamp();

        let claims = serde_json::json!({ "iat": now, "exp": now + 60 });
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let decoded = jwt.decode_token(&token).unwrap();
        assert_eq!(decoded.sub, None);
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("HS256"), Ok(Algorithm::HS256));
        assert_eq!(parse_algorithm("HS512"), Ok(Algorithm::HS512));
        assert!(parse_algorithm("RS256").is_err());
        assert!(parse_algorithm("none").is_err());
    }
}
