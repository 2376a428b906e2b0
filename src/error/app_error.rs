use rocket::http::Status;
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("User not found")]
    UserNotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("User {0} already exists")]
    UserAlreadyExists(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("An active code was already issued, wait for it to expire before requesting another")]
    Cooldown,
    #[error("Too many attempts, try again after the 24 hour window resets")]
    RateLimited,
    #[error("Could not deliver the verification code")]
    DeliveryFailed { message: String },
    #[error("No verification code was issued")]
    OtpNotFound,
    #[error("This code has already been verified")]
    AlreadyVerified,
    #[error("The verification code has expired, request a new one")]
    OtpExpired,
    #[error("Wrong verification code")]
    OtpMismatch,
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Internal server error")]
    ConfigurationError {
        message: String,
        #[source]
        source: figment::Error,
    },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::DeliveryFailed { message: message.into() }
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Db { .. } => Status::InternalServerError,
            AppError::UserNotFound => Status::NotFound,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::InvalidCredentials => Status::Forbidden,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::UserAlreadyExists(_) => Status::Conflict,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Cooldown => Status::TooManyRequests,
            AppError::RateLimited => Status::TooManyRequests,
            AppError::DeliveryFailed { .. } => Status::BadRequest,
            AppError::OtpNotFound => Status::NotFound,
            AppError::AlreadyVerified => Status::Conflict,
            AppError::OtpExpired => Status::Gone,
            AppError::OtpMismatch => Status::BadRequest,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::ConfigurationError { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = req
            .local_cache(|| None::<crate::auth::CurrentUser>)
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %method,
            uri = %uri,
            "request failed"
        );

        let status = Status::from(&self);
        let body = self.to_string();

        Response::build().status(status).sized_body(body.len(), Cursor::new(body)).ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("410", "Gone"),
            ("429", "Too Many Requests"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::ConfigurationError {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_errors_map_to_client_statuses() {
        assert_eq!(Status::from(&AppError::Cooldown), Status::TooManyRequests);
        assert_eq!(Status::from(&AppError::RateLimited), Status::TooManyRequests);
        assert_eq!(Status::from(&AppError::OtpNotFound), Status::NotFound);
        assert_eq!(Status::from(&AppError::AlreadyVerified), Status::Conflict);
        assert_eq!(Status::from(&AppError::OtpExpired), Status::Gone);
        assert_eq!(Status::from(&AppError::OtpMismatch), Status::BadRequest);
        assert_eq!(Status::from(&AppError::Unauthorized), Status::Unauthorized);
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = AppError::PasswordHash {
            message: "argon2 blew up".to_string(),
        };
        assert_eq!(err.to_string(), "Internal server error");
    }
}
