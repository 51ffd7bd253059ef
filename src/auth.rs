//! Bearer token validation
//!
//! The gateway consumes identity through the `AuthValidator` trait; the
//! default implementation validates HS256 JWTs and surfaces the subject
//! claim as the user id.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::llm::{GatewayError, GatewayResult};

/// The verified caller identity
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
}

#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn verify(&self, token: &str) -> GatewayResult<AuthContext>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// HS256 JWT validator
pub struct JwtAuthValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl AuthValidator for JwtAuthValidator {
    async fn verify(&self, token: &str) -> GatewayResult<AuthContext> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| GatewayError::Unauthorized(format!("invalid bearer token: {}", e)))?;
        if data.claims.sub.is_empty() {
            return Err(GatewayError::Unauthorized(
                "token has no subject".to_string(),
            ));
        }
        Ok(AuthContext {
            user_id: data.claims.sub,
        })
    }
}

/// Fixed-identity validator for tests
#[cfg(test)]
pub struct StaticAuthValidator {
    pub user_id: String,
}

#[cfg(test)]
#[async_trait]
impl AuthValidator for StaticAuthValidator {
    async fn verify(&self, token: &str) -> GatewayResult<AuthContext> {
        if token == "valid-token" {
            Ok(AuthContext {
                user_id: self.user_id.clone(),
            })
        } else {
            Err(GatewayError::Unauthorized("unknown token".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_yields_user_id() {
        let validator = JwtAuthValidator::new("secret");
        let ctx = validator
            .verify(&token("secret", "user-123", 3600))
            .await
            .unwrap();
        assert_eq!(ctx.user_id, "user-123");
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let validator = JwtAuthValidator::new("secret");
        let err = validator
            .verify(&token("secret", "user-123", -3600))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let validator = JwtAuthValidator::new("secret");
        let err = validator
            .verify(&token("other-secret", "user-123", 3600))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
    }
}
