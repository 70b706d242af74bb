use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use campfund_engine::{DonationApiError, LedgerError, ReconciliationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request cannot be fulfilled. {0}")]
    Unprocessable(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        Self::BackendError(e.to_string())
    }
}

/// Reconciliation only fails on storage errors. The gateway must see a 5xx so that it redelivers.
impl From<ReconciliationError> for ServerError {
    fn from(e: ReconciliationError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<DonationApiError> for ServerError {
    fn from(e: DonationApiError) -> Self {
        match e {
            DonationApiError::InvalidAmount => Self::InvalidRequestBody(e.to_string()),
            DonationApiError::CampaignNotFound(_) => Self::NoRecordFound(e.to_string()),
            DonationApiError::CampaignNotAcceptingDonations(..) => Self::Unprocessable(e.to_string()),
            DonationApiError::OrderCodeExhausted => Self::BackendError(e.to_string()),
            DonationApiError::Storage(e) => e.into(),
        }
    }
}
