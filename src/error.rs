use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mongodb::is_transient_error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A store failure that cannot be fixed by retrying.
    #[error(transparent)]
    Db(DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    /// The store aborted the operation, but running it again from scratch may succeed.
    #[error("Transient store failure: {0}")]
    TransientStore(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Is it safe to run the whole failed operation again?
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(_) | Self::Unauthorized(_) => Status::Unauthorized,
            Self::TransientStore(_) => Status::ServiceUnavailable,
            Self::NotFound(_) => Status::NotFound,
            Self::Forbidden(_) => Status::Forbidden,
            Self::Conflict(_) => Status::Conflict,
            Self::BadRequest(_) => Status::BadRequest,
        }
    }

    /// The message shown to the user. Denials are deliberately vague so they
    /// reveal nothing about groups the caller cannot see.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) | Self::Forbidden(_) | Self::Unauthorized(_) | Self::Jwt(_) => {
                "You do not have access to this resource.".to_string()
            }
            Self::Conflict(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::TransientStore(_) => "The service is busy, please try again.".to_string(),
            Self::Db(_) => "Something went wrong.".to_string(),
        }
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        if is_transient_error(&err) {
            Self::TransientStore(err.to_string())
        } else {
            Self::Db(err)
        }
    }
}

/// The JSON body of an error response.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        let body = ErrorBody {
            status: status.code,
            message: self.user_message(),
        };
        Custom(status, Json(body)).respond_to(req)
    }
}
