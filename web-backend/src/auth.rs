// JWT verification gate
// Token issuance lives in the auth service; this backend only verifies.
// Tokens arrive as `Authorization: Bearer <token>` or a `token` cookie.
// A missing token is 401, a bad one is 403.

use crate::error::ApiError;
use crate::state::AppState;
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id minted by the auth service.
    pub id: String,
    pub exp: usize,
}

/// Extractor guarding every `/api/scan` route.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state missing".to_string()))?;

    let token = bearer_token(req)
        .or_else(|| req.cookie("token").map(|c| c.value().to_string()))
        .ok_or(ApiError::Unauthorized)?;

    let decoded = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Forbidden)?;

    Ok(AuthUser {
        id: decoded.claims.id,
    })
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}
