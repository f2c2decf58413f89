// src/errors.rs

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    SqlxError(sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation errors")]
    ValidationError(#[from] ValidationErrors),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid login credentials")]
    InvalidLoginCredentials,

    #[error("missing token: {0}")]
    MissingToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("password hashing failed")]
    PasswordHashingError,

    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} no encontrado", what))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_)
            | AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidLoginCredentials
            | AppError::MissingToken(_)
            | AppError::TokenExpired
            | AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::SqlxError(_)
            | AppError::PasswordHashingError
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client. Server-side details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::SqlxError(_) | AppError::InternalServerError(_) => {
                "Error interno del servidor".to_string()
            }
            AppError::PasswordHashingError => "Error al procesar la contraseña".to_string(),
            AppError::NotFound(message)
            | AppError::Validation(message)
            | AppError::BadRequest(message)
            | AppError::Conflict(message)
            | AppError::MissingToken(message)
            | AppError::InvalidToken(message)
            | AppError::Forbidden(message) => message.clone(),
            AppError::ValidationError(errors) => {
                let mut messages = Vec::new();
                for (field, field_errors) in errors.field_errors() {
                    for error in field_errors {
                        let msg = error.message.as_ref().map_or_else(
                            || format!("El campo '{}' no es válido", field),
                            |m| format!("{}: {}", field, m),
                        );
                        messages.push(msg);
                    }
                }
                messages.sort();
                messages.join("; ")
            }
            AppError::InvalidLoginCredentials => "Credenciales inválidas".to_string(),
            AppError::TokenExpired => "El token ha expirado".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::SqlxError(e) => tracing::error!("SQLx error: {:?}", e),
            AppError::InternalServerError(detail) => {
                tracing::error!("Internal server error: {}", detail)
            }
            AppError::PasswordHashingError => tracing::error!("Password hashing failed"),
            other => tracing::debug!("Request failed with {}: {}", status, other),
        }

        let body = Json(json!({ "success": false, "error": self.public_message() }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => {
                    let message = conflict_message(db_err.constraint());
                    tracing::warn!("Unique violation: {:?}", db_err);
                    return AppError::Conflict(message);
                }
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    tracing::warn!("Foreign key violation: {:?}", db_err);
                    return AppError::BadRequest(
                        "El registro está relacionado con otros datos o hace referencia a un registro inexistente"
                            .to_string(),
                    );
                }
                _ => {}
            }
        }
        AppError::SqlxError(err)
    }
}

fn conflict_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("farmers_slug_key") => "Ya existe un productor con ese slug".to_string(),
        Some("products_sku_key") => "Ya existe un producto con ese SKU".to_string(),
        Some("products_slug_key") => "Ya existe un producto con ese slug".to_string(),
        Some("coffee_batches_code_key") => "Ya existe un lote con ese código".to_string(),
        Some("varieties_name_key") => "Ya existe una variedad con ese nombre".to_string(),
        Some("provinces_name_key") => "Ya existe una provincia con ese nombre".to_string(),
        Some("users_email_key") => "Ya existe un usuario con ese correo".to_string(),
        _ => "El registro ya existe".to_string(),
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken("Token JWT inválido o dañado".to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("Rejected JSON body: {}", rejection.body_text());
        AppError::BadRequest(format!("Cuerpo JSON inválido: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_renders_failure_envelope() {
        let response = AppError::not_found("Lote").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Lote no encontrado");
    }

    #[tokio::test]
    async fn database_error_hides_details() {
        let response = AppError::from(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Error interno del servidor");
    }

    #[test]
    fn conflicts_and_validation_are_bad_requests() {
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn known_constraints_get_specific_messages() {
        assert_eq!(
            conflict_message(Some("coffee_batches_code_key")),
            "Ya existe un lote con ese código"
        );
        assert_eq!(conflict_message(None), "El registro ya existe");
    }
}
