//! JSON response envelope shared by every endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// `{ success, code, message, data, total }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Total row count for paged listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            code: StatusCode::OK.as_u16(),
            message: "ok".to_string(),
            data: Some(data),
            total: None,
        }
    }

    /// One page of a listing.
    pub fn page(data: T, total: i64) -> Self {
        Self {
            total: Some(total),
            ..Self::ok(data)
        }
    }
}

impl ApiResponse<()> {
    /// Successful response without a payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: StatusCode::OK.as_u16(),
            message: message.into(),
            data: None,
            total: None,
        }
    }

    /// Failure response.
    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: status.as_u16(),
            message: message.into(),
            data: None,
            total: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn page_carries_total() {
        let json = serde_json::to_value(ApiResponse::page(vec![1, 2], 10)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["code"], 200);
        assert_eq!(json["total"], 10);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn failure_omits_data() {
        let json =
            serde_json::to_value(ApiResponse::failure(StatusCode::FORBIDDEN, "access denied"))
                .unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], 403);
        assert_eq!(json["message"], "access denied");
        assert!(json.get("data").is_none());
        assert!(json.get("total").is_none());
    }
}
