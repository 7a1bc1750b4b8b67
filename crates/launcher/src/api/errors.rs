use core::error::Error;

use poem::error::ResponseError;
use poem::http::StatusCode;

/// API errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("requester is required")]
    MissingRequester,
    #[display("Mapping document unavailable: {message}")]
    MappingUnavailable { message: String },
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}

impl ResponseError for ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingRequester => StatusCode::BAD_REQUEST,
            Self::MappingUnavailable { .. } | Self::ServerError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_formatting() {
        assert_eq!(
            ApiError::MissingRequester.to_string(),
            "requester is required"
        );
        assert_eq!(
            ApiError::MappingUnavailable {
                message: "permission denied".to_string(),
            }
            .to_string(),
            "Mapping document unavailable: permission denied"
        );
        assert_eq!(
            ApiError::ServerError {
                message: "address in use".to_string(),
            }
            .to_string(),
            "Server error: address in use"
        );
    }

    #[test]
    fn missing_requester_is_a_client_error() {
        assert_eq!(ApiError::MissingRequester.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::ServerError {
                message: String::new(),
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
