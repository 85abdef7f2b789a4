use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::QueryRejection;
use scp_core::{hca::FieldError, model::annotation::SelectorError};
use serde::Serialize;
use valuable::Valuable;

use crate::{db, hca, storage};

#[derive(thiserror::Error, Serialize, Debug, Clone, Valuable)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error(transparent)]
    Database(#[from] db::error::Error),
    #[error("simple invalid data")]
    SimpleData { reason: String },
    #[error("malformed request")]
    MalformedRequest {
        #[serde(skip)]
        #[valuable(skip)]
        status: StatusCode,
        message: String,
    },
    #[error("operation not permitted")]
    Permission { message: String },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("metadata does not conform to its schema")]
    SchemaValidation { errors: Vec<FieldError> },
    #[error("download quota exceeded")]
    Quota { message: String },
    #[error("service unavailable")]
    Unavailable { message: String },
}

impl Error {
    pub(super) fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    pub(super) fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        use Error::{
            Database, MalformedRequest, NotFound, Permission, Quota, SchemaValidation, SimpleData, Unavailable,
        };
        use db::error::Error::{DuplicateRecord, Other, RecordNotFound};

        match self {
            SimpleData { .. } | SchemaValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Permission { .. } | Quota { .. } => StatusCode::FORBIDDEN,
            NotFound { .. } => StatusCode::NOT_FOUND,
            Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Database(inner) => match inner {
                Other { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                DuplicateRecord { .. } => StatusCode::CONFLICT,
                RecordNotFound => StatusCode::NOT_FOUND,
            },
            MalformedRequest { status, .. } => *status,
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(err: JsonRejection) -> Self {
        Self::MalformedRequest {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(err: QueryRejection) -> Self {
        Self::MalformedRequest {
            status: err.status(),
            message: format!("{err:#}"),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(err: PathRejection) -> Self {
        Self::MalformedRequest {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<garde::Report> for Error {
    fn from(err: garde::Report) -> Self {
        Self::SimpleData {
            reason: format!("{err:#}"),
        }
    }
}

impl From<SelectorError> for Error {
    fn from(err: SelectorError) -> Self {
        Self::SimpleData {
            reason: err.to_string(),
        }
    }
}

impl From<hca::Error> for Error {
    fn from(err: hca::Error) -> Self {
        match err {
            hca::Error::InvalidName { .. } => Self::SimpleData {
                reason: err.to_string(),
            },
            _ => Self::Unavailable {
                message: err.to_string(),
            },
        }
    }
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(error = self.as_value());

        #[derive(Serialize)]
        struct ErrorResponse {
            status: u16,
            error: Option<Error>,
        }

        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return (
                status,
                axum::Json(ErrorResponse {
                    status: status.as_u16(),
                    error: None,
                }),
            )
                .into_response();
        }

        (
            status,
            axum::Json(ErrorResponse {
                status: status.as_u16(),
                error: Some(self),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
