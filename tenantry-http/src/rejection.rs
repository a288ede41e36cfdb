//! Resolution failures and their HTTP responses.

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};
use serde::Serialize;
use tenantry_core::TenantError;

/// Why a request was not given a tenant
#[derive(Debug, thiserror::Error)]
pub enum TenantRejection {
    /// The tenant header is absent or blank
    #[error("tenant header not found: {0}")]
    MissingHeader(String),

    /// The tenant header is not valid UTF-8
    #[error("tenant header is not valid text: {0}")]
    InvalidHeader(String),

    /// The resolution service failed
    #[error(transparent)]
    Resolution(#[from] TenantError),
}

impl TenantRejection {
    /// Status code for this rejection.
    ///
    /// Unknown tenants are 404, inactive tenants 403, malformed requests
    /// 400. Everything else is a server error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeader(_) | Self::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            Self::Resolution(TenantError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Resolution(TenantError::Inactive(_)) => StatusCode::FORBIDDEN,
            Self::Resolution(TenantError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Resolution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client.
    ///
    /// Server errors are reduced to a generic message unless
    /// `expose_details` is set.
    pub fn public_message(&self, expose_details: bool) -> String {
        if self.status().is_server_error() && !expose_details {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    /// Render the JSON error body.
    pub fn to_response(&self, expose_details: bool) -> Response<Bytes> {
        let message = self.public_message(expose_details);
        let body = ErrorBody {
            success: false,
            errors: vec![FieldError {
                field: "tenant",
                message: message.clone(),
            }],
            message,
        };

        let bytes = serde_json::to_vec(&body).map(Bytes::from).unwrap_or_default();
        let mut response = Response::new(bytes);
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    errors: Vec<FieldError>,
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: &'static str,
    message: String,
}
