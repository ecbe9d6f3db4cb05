use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    Backend {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected payload: {0}")]
    Unexpected(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Sign in required")]
    Unauthenticated,
}

impl AppError {
    pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| AppError::Transport { service, source }
    }

    /// Body text sent back by the upstream service, when there is one.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            AppError::Backend { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            AppError::InvalidFilter(_) => Status::BadRequest,
            AppError::Unauthenticated | AppError::Backend { status: 401, .. } => Status::Unauthorized,
            AppError::Backend { status: 403, .. } => Status::Forbidden,
            AppError::Backend { status: 404, .. } => Status::NotFound,
            _ => Status::BadGateway,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        error!(error = %self, status = status.code, uri = %request.uri(), "Request failed");
        (status, self.to_string()).respond_to(request)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16) -> AppError {
        AppError::Backend {
            service: "report API",
            status,
            body: String::new(),
        }
    }

    #[test]
    fn upstream_refusals_keep_their_status() {
        assert_eq!(backend(401).status(), Status::Unauthorized);
        assert_eq!(backend(403).status(), Status::Forbidden);
        assert_eq!(backend(404).status(), Status::NotFound);
        assert_eq!(backend(500).status(), Status::BadGateway);
        assert_eq!(backend(503).status(), Status::BadGateway);
    }

    #[test]
    fn local_failures_map_to_client_errors() {
        assert_eq!(AppError::Unauthenticated.status(), Status::Unauthorized);
        assert_eq!(AppError::InvalidFilter("x".to_string()).status(), Status::BadRequest);
        assert_eq!(AppError::Unexpected("x".to_string()).status(), Status::BadGateway);
    }
}
