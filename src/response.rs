// src/response.rs

use axum::Json;
use axum::http::StatusCode;
use axum_extra::extract::WithRejection;
use serde::Serialize;

use crate::errors::AppError;

/// JSON request body whose parse errors come back in the failure envelope.
pub type JsonBody<T> = WithRejection<Json<T>, AppError>;

/// Success envelope: `{ "success": true, ...payload }`.
///
/// The payload must serialize as a map (a struct or a `json!({ .. })` object),
/// its fields are flattened next to `success`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

pub type CreatedResult<T> = Result<(StatusCode, Json<Envelope<T>>), AppError>;

pub fn ok<T: Serialize>(payload: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        payload,
    })
}

pub fn created<T: Serialize>(payload: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_fields_sit_next_to_success() {
        let Json(envelope) = ok(json!({ "farmer": { "id": 7 } }));
        let value = serde_json::to_value(envelope).unwrap();
        assert_eq!(value, json!({ "success": true, "farmer": { "id": 7 } }));
    }
}
