use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Configuration for JWT validation and issuance.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, issuer: String, audience: String, token_ttl: Duration) -> Self {
        Self {
            jwt_secret,
            issuer,
            audience,
            token_ttl,
        }
    }
}

/// JWT claims carried by every request.
///
/// `locations` is the set of locations the subject may operate on; it stands
/// in for a user-to-location lookup service at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub locations: Vec<Uuid>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Validates and issues tokens. Shared via request extensions.
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issues a signed token for the given subject.
    pub fn issue_token(
        &self,
        user_id: &str,
        role: &str,
        locations: Vec<Uuid>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            locations,
            iat: now,
            exp: now + self.config.token_ttl.as_secs() as i64,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::AuthError(format!("Failed to issue token: {}", e)))
    }

    /// Validates a bearer token and returns its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

/// Authenticated caller extracted from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
    pub locations: Vec<Uuid>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Whether the caller may operate on the given location. Admins see the
    /// whole network; everyone else is limited to their claim set.
    pub fn can_access_location(&self, location_id: Uuid) -> bool {
        self.has_role("admin") || self.locations.contains(&location_id)
    }

    pub fn accessible_locations(&self) -> &[Uuid] {
        &self.locations
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
            locations: claims.locations,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| {
                ServiceError::InternalError("AuthService missing from request extensions".into())
            })?;

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ServiceError::Unauthorized("Authorization header must be a bearer token".into())
        })?;

        let claims = auth_service.validate_token(token)?;
        Ok(AuthUser::from(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "freshstock-api".to_string(),
            "freshstock-clients".to_string(),
            Duration::from_secs(3600),
        ))
    }

    #[test]
    fn issued_tokens_round_trip() {
        let service = test_service();
        let location = Uuid::new_v4();
        let token = service
            .issue_token("user-1", "clerk", vec![location])
            .expect("issue");
        let claims = service.validate_token(&token).expect("validate");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.locations, vec![location]);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let service = test_service();
        let token = service.issue_token("user-1", "clerk", vec![]).expect("issue");
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(service.validate_token(&tampered).is_err());
    }

    #[test]
    fn location_access_respects_claims_and_admin_role() {
        let allowed = Uuid::new_v4();
        let other = Uuid::new_v4();
        let clerk = AuthUser {
            user_id: "u".into(),
            role: "clerk".into(),
            locations: vec![allowed],
        };
        assert!(clerk.can_access_location(allowed));
        assert!(!clerk.can_access_location(other));

        let admin = AuthUser {
            user_id: "a".into(),
            role: "admin".into(),
            locations: vec![],
        };
        assert!(admin.can_access_location(other));
    }
}
