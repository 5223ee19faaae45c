/// JWT issuance and validation
///
/// Tokens are HS256-signed and carry the user's id and role. Two token types
/// exist: short-lived access tokens sent on every request and long-lived
/// refresh tokens exchanged for new access tokens.
///
/// The role inside an access token is informational; the API reloads the
/// user on every request so role changes and soft deletes apply immediately.
///
/// # Example
///
/// ```
/// use planboard_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use planboard_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let claims = Claims::new(user_id, UserRole::Member, TokenType::Access);
/// let token = create_token(&claims, "a-secret-that-is-at-least-32-bytes!")?;
///
/// let validated = validate_access_token(&token, "a-secret-that-is-at-least-32-bytes!")?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// Issuer claim on every token
pub const ISSUER: &str = "planboard";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Expected {expected} token")]
    WrongType { expected: &'static str },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    /// Lifetime used when no explicit TTL is configured
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::minutes(60),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Token lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtl {
    pub access: Duration,
    pub refresh: Duration,
}

impl TokenTtl {
    fn for_type(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access,
            TokenType::Refresh => self.refresh,
        }
    }
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            access: TokenType::Access.default_expiration(),
            refresh: TokenType::Refresh.default_expiration(),
        }
    }
}

/// JWT claims
///
/// Standard claims `sub`, `iss`, `iat`, `exp`, `nbf` plus `role` and
/// `token_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub role: UserRole,
    pub token_type: TokenType,
}

impl Claims {
    /// Creates claims with the default lifetime for `token_type`
    pub fn new(user_id: Uuid, role: UserRole, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, role, token_type, token_type.default_expiration())
    }

    /// Creates claims expiring `expires_in` from now
    pub fn with_expiration(
        user_id: Uuid,
        role: UserRole,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            role,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Seconds until expiry, `None` once expired
    pub fn expires_in(&self) -> Option<i64> {
        let remaining = self.exp - Utc::now().timestamp();
        (remaining > 0).then_some(remaining)
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Verifies signature, expiry, not-before and issuer
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            _ => JwtError::ValidationError(e.to_string()),
        })
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongType {
            expected: expected.as_str(),
        });
    }

    Ok(claims)
}

/// Validates a token and requires it to be an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Access)
}

/// Validates a token and requires it to be a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Refresh)
}

/// Access and refresh token issued together at login and registration
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues a single token of `token_type`
pub fn issue_token(
    user_id: Uuid,
    role: UserRole,
    token_type: TokenType,
    secret: &str,
    ttl: &TokenTtl,
) -> Result<String, JwtError> {
    let claims = Claims::with_expiration(user_id, role, token_type, ttl.for_type(token_type));
    create_token(&claims, secret)
}

/// Issues an access/refresh pair
pub fn issue_token_pair(
    user_id: Uuid,
    role: UserRole,
    secret: &str,
    ttl: &TokenTtl,
) -> Result<TokenPair, JwtError> {
    Ok(TokenPair {
        access_token: issue_token(user_id, role, TokenType::Access, secret, ttl)?,
        refresh_token: issue_token(user_id, role, TokenType::Refresh, secret, ttl)?,
        token_type: "Bearer".to_string(),
        expires_in: ttl.access.num_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_default_expirations() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::minutes(60));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, UserRole::Maintainer, TokenType::Access);

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.role, UserRole::Maintainer);
        assert!(!claims.is_expired());
        assert!(claims.expires_in().unwrap() <= 3600);
    }

    #[test]
    fn test_create_and_validate() {
        let user_id = Uuid::new_v4();
        let token = create_token(&Claims::new(user_id, UserRole::Admin, TokenType::Access), SECRET)
            .expect("create");

        let claims = validate_token(&token, SECRET).expect("validate");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token(
            &Claims::new(Uuid::new_v4(), UserRole::Member, TokenType::Access),
            SECRET,
        )
        .unwrap();

        assert!(matches!(
            validate_token(&token, "another-secret-that-is-long-enough"),
            Err(JwtError::ValidationError(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            UserRole::Member,
            TokenType::Access,
            Duration::seconds(-3600),
        );
        assert!(claims.is_expired());
        assert!(claims.expires_in().is_none());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), UserRole::Member, TokenType::Access);
        claims.iss = "someone-else".to_string();
        let token = create_token(&claims, SECRET).unwrap();

        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::InvalidIssuer)));
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let ttl = TokenTtl::default();
        let pair = issue_token_pair(Uuid::new_v4(), UserRole::Member, SECRET, &ttl).unwrap();

        assert!(validate_access_token(&pair.access_token, SECRET).is_ok());
        assert!(validate_refresh_token(&pair.refresh_token, SECRET).is_ok());
        assert!(matches!(
            validate_access_token(&pair.refresh_token, SECRET),
            Err(JwtError::WrongType { expected: "access" })
        ));
        assert!(matches!(
            validate_refresh_token(&pair.access_token, SECRET),
            Err(JwtError::WrongType { expected: "refresh" })
        ));
    }

    #[test]
    fn test_token_pair_uses_configured_ttl() {
        let ttl = TokenTtl {
            access: Duration::minutes(5),
            refresh: Duration::days(1),
        };
        let pair = issue_token_pair(Uuid::new_v4(), UserRole::Member, SECRET, &ttl).unwrap();
        assert_eq!(pair.expires_in, 300);
        assert_eq!(pair.token_type, "Bearer");

        let access = validate_access_token(&pair.access_token, SECRET).unwrap();
        assert!(access.exp - access.iat <= 300);

        let refresh = validate_refresh_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(refresh.exp - refresh.iat, 86_400);
    }
}
