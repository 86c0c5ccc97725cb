use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// JSON envelope every API endpoint speaks.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn success<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        status: "success",
        message: None,
        data: Some(data),
    })
    .into_response()
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            status: "error",
            message: Some(message.to_string()),
            data: None,
        }),
    )
        .into_response()
}
