// src/middleware.rs
use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::{
    auth::verify_jwt,
    auth_models::{Role, TokenClaims},
    errors::AppError,
    state::AppState,
};

impl FromRequestParts<AppState> for TokenClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to extract Bearer token header: {:?}", e);
                AppError::MissingToken("Falta el encabezado Authorization o no es válido".into())
            })?;

        let claims = verify_jwt(bearer.token(), &state.jwt_secret).inspect_err(|e| {
            tracing::warn!("Rejected token: {}", e);
        })?;

        Ok(claims.claims)
    }
}

/// Any signed-in CMS account (admin or editor).
#[derive(Debug, Clone)]
pub struct CmsUser(pub TokenClaims);

impl FromRequestParts<AppState> for CmsUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = TokenClaims::from_request_parts(parts, state).await?;
        match claims.role {
            Role::Admin | Role::Editor => Ok(CmsUser(claims)),
        }
    }
}

/// Administrator only. Used for destructive operations and user management.
#[derive(Debug, Clone)]
pub struct AdminUser(pub TokenClaims);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = TokenClaims::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            tracing::warn!(
                "User {} ({}) attempted an admin-only operation",
                claims.sub,
                claims.email
            );
            return Err(AppError::Forbidden(
                "Solo un administrador puede realizar esta acción".into(),
            ));
        }
        Ok(AdminUser(claims))
    }
}
