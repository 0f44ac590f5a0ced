use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Uniform JSON error envelope shared by the platform's HTTP surface.
/// Every response carries the machine-readable code both in the body and in
/// the `X-Error-Code` header so middleware can classify failures without
/// buffering the body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: Option<String> },
    Unauthorized { code: &'static str, message: Option<String> },
    Forbidden { code: &'static str, message: Option<String> },
    NotFound { code: &'static str, message: Option<String> },
    BadGateway { code: &'static str, message: Option<String> },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { code, message: Some(message.into()) }
    }
    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized { code, message: Some(message.into()) }
    }
    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden { code, message: Some(message.into()) }
    }
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound { code, message: Some(message.into()) }
    }
    pub fn bad_gateway(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadGateway { code, message: Some(message.into()) }
    }
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal { message: Some(err.to_string()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            ApiError::Unauthorized { code, message } => (StatusCode::UNAUTHORIZED, code, message),
            ApiError::Forbidden { code, message } => (StatusCode::FORBIDDEN, code, message),
            ApiError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            ApiError::BadGateway { code, message } => (StatusCode::BAD_GATEWAY, code, message),
            ApiError::Internal { message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        let body = ErrorBody { code: code.into(), message };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn response_carries_code_header_and_body() {
        let err = ApiError::unauthorized("invalid_signature", "Invalid signature");
        let resp = err.into_response();
        assert_eq!(resp.status().as_u16(), 401);
        assert_eq!(
            resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
            Some("invalid_signature")
        );
        let bytes = to_bytes(resp.into_body(), 1024 * 8).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("\"code\":\"invalid_signature\""), "body: {}", text);
    }

    #[tokio::test]
    async fn internal_defaults_to_500() {
        let resp = ApiError::internal("boom").into_response();
        assert_eq!(resp.status().as_u16(), 500);
        assert_eq!(
            resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
            Some("internal_error")
        );
    }
}
