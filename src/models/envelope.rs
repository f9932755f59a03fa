//! Uniform JSON response envelope shared by every endpoint.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Body shape of every JSON response: `{success, message, data?}`.
#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// An [`ApiResponse`] paired with the status code it is sent with.
#[derive(Debug)]
pub struct Envelope<T> {
    pub status: StatusCode,
    pub body: ApiResponse<T>,
}

impl<T> Envelope<T> {
    pub fn new(
        status: StatusCode,
        success: bool,
        message: impl Into<String>,
        data: Option<T>,
    ) -> Self {
        Self {
            status,
            body: ApiResponse {
                success,
                message: message.into(),
                data,
            },
        }
    }

    /// 200 OK carrying a payload.
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::new(StatusCode::OK, true, message, Some(data))
    }
}

impl Envelope<()> {
    /// Successful response without a payload.
    pub fn ok_empty(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, true, message, None)
    }

    /// Failure response; `success` is always false.
    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, false, message, None)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.body) {
            Ok(bytes) => (
                self.status,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                bytes,
            )
                .into_response(),
            Err(err) => {
                tracing::error!("Error encoding response: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error encoding response",
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    #[tokio::test]
    async fn failure_envelope_omits_data() {
        let response = Envelope::failure(StatusCode::NOT_FOUND, "File not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static("application/json")
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "message": "File not found"}));
    }

    #[tokio::test]
    async fn empty_list_payload_is_kept() {
        let response = Envelope::ok("Found 0 files", Vec::<u8>::new()).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"], serde_json::json!([]));
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn serialization_failure_becomes_plain_text_500() {
        let response = Envelope::ok("never sent", Unserializable).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Error encoding response");
    }
}
