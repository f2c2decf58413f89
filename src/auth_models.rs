// src/auth_models.rs
use serde::{Deserialize, Serialize};
use validator::Validate;

pub use crate::models::Role;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(email(message = "Formato de correo inválido"))]
    pub email: String,

    #[validate(length(min = 1, message = "La contraseña es obligatoria"))]
    pub password: String,
}

/// Account created from the CMS by an administrator.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserPayload {
    #[validate(email(message = "Formato de correo inválido"))]
    pub email: String,

    #[validate(length(min = 8, message = "La contraseña debe tener al menos 8 caracteres"))]
    pub password: String,

    #[validate(length(min = 1, max = 120, message = "El nombre es obligatorio"))]
    pub name: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Editor
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TokenClaims {
    pub sub: i32,
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl TokenClaims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_users_default_to_editor() {
        let payload: CreateUserPayload = serde_json::from_str(
            r#"{ "email": "ana@finca.co", "password": "cafe-de-altura", "name": "Ana" }"#,
        )
        .unwrap();
        assert_eq!(payload.role, Role::Editor);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn short_password_is_rejected() {
        let payload = CreateUserPayload {
            email: "ana@finca.co".into(),
            password: "corta".into(),
            name: "Ana".into(),
            role: Role::Editor,
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }
}
