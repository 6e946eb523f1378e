// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Response envelope and error-to-status mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use printdock_core::error::PrintDockError;

/// Every response body: `{ success, message, data }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Successful response carrying `data`.
pub fn ok<T>(message: impl Into<String>, data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        message: message.into(),
        data: Some(data),
    }))
}

/// How an error is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    Conflict,
    /// CUPS, a printer, or the companion failed.
    Upstream,
    /// Anything else.  Details stay in the log.
    Internal,
}

impl ErrorClass {
    pub fn of(err: &PrintDockError) -> Self {
        if err.is_not_found() {
            return Self::NotFound;
        }
        match err {
            PrintDockError::Conflict(_) => Self::Conflict,
            _ if err.is_client_error() => Self::BadRequest,
            PrintDockError::Adapter(_)
            | PrintDockError::Probe(_)
            | PrintDockError::Discovery(_)
            | PrintDockError::Http(_) => Self::Upstream,
            _ => Self::Internal,
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handler error.  Converts into an envelope with `success: false`.
#[derive(Debug)]
pub struct ApiError(pub PrintDockError);

impl From<PrintDockError> for ApiError {
    fn from(err: PrintDockError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let class = ErrorClass::of(&self.0);
        let message = match class {
            ErrorClass::Internal => {
                error!(error = %self.0, "request failed");
                "internal error".to_owned()
            }
            ErrorClass::Upstream => {
                warn!(error = %self.0, "upstream failure");
                self.0.to_string()
            }
            _ => self.0.to_string(),
        };
        let body = Envelope::<()> {
            success: false,
            message,
            data: None,
        };
        (class.status(), Json(body)).into_response()
    }
}
