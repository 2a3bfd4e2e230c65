// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube_core::ErrorResponse;
use thiserror::Error;

/// APIError is the reply of the API server to a failed request,
/// reduced to the reasons the controllers act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum APIError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("object already exists")]
    ObjectAlreadyExists,
    #[error("conflict: the object has been modified")]
    Conflict,
    #[error("bad request")]
    BadRequest,
    #[error("invalid object")]
    Invalid,
    #[error("forbidden")]
    Forbidden,
    #[error("internal error")]
    InternalError,
    #[error("timeout")]
    Timeout,
    #[error("server timeout")]
    ServerTimeout,
    #[error("{0}")]
    Other(String),
}

impl From<&ErrorResponse> for APIError {
    fn from(error_resp: &ErrorResponse) -> Self {
        match error_resp.reason.as_str() {
            "NotFound" => APIError::ObjectNotFound,
            "AlreadyExists" => APIError::ObjectAlreadyExists,
            "Conflict" => APIError::Conflict,
            "BadRequest" => APIError::BadRequest,
            "Invalid" => APIError::Invalid,
            "Forbidden" => APIError::Forbidden,
            "InternalError" => APIError::InternalError,
            "Timeout" => APIError::Timeout,
            "ServerTimeout" => APIError::ServerTimeout,
            // Some servers leave the reason empty and only set the code.
            _ => match error_resp.code {
                404 => APIError::ObjectNotFound,
                409 => APIError::Conflict,
                _ => APIError::Other(error_resp.message.clone()),
            },
        }
    }
}

/// kube_error_to_api translates errors returned by kube-rs APIs
/// to the form the reconcilers and the healer match on.
pub fn kube_error_to_api(error: &kube::Error) -> APIError {
    match error {
        kube::Error::Api(error_resp) => APIError::from(error_resp),
        other => APIError::Other(other.to_string()),
    }
}

#[derive(Debug, Error)]
pub enum ParseDynamicObjectError {
    #[error("failed to convert object: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("unexpected kind: expected {expected}, found {found}")]
    UnexpectedKind { expected: String, found: String },
}
