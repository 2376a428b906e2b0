use crate::database::otp::OtpRepository;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::elevation::{ELEVATION_COOKIE, ElevationClaims};
use crate::models::otp::OtpRecord;
use chrono::Utc;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "user";

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Proof that the caller recently completed OTP verification. Possession
/// of the decrypted cookie alone is not enough: the backing otp row is
/// re-read on every request, so deleting it revokes the elevation early.
#[derive(Debug, Clone, Copy)]
pub struct ElevatedUser {
    pub user_id: Uuid,
    pub otp_id: Uuid,
}

/// The trust decision behind the step-up guard: the claims only elevate
/// when the backing record exists, belongs to the claimed user, carries
/// the claimed id, and has been spent by a successful verification. Any
/// shortfall is the same opaque `Unauthorized`.
pub(crate) fn authorize_elevation(claims: &ElevationClaims, record: Option<&OtpRecord>) -> Result<ElevatedUser, AppError> {
    match record {
        Some(record) if record.id == claims.otp_id && record.user_id == claims.user_id && record.used => Ok(ElevatedUser {
            user_id: claims.user_id,
            otp_id: claims.otp_id,
        }),
        _ => Err(AppError::Unauthorized),
    }
}

pub(crate) fn parse_session_cookie_value(value: &str) -> Option<(Uuid, Uuid)> {
    let (session_id_str, user_id_str) = value.split_once(':')?;
    let session_id = Uuid::parse_str(session_id_str).ok()?;
    let user_id = Uuid::parse_str(user_id_str).ok()?;
    Some((session_id, user_id))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let cookies = req.cookies();
        if let Some(cookie) = cookies.get_private(SESSION_COOKIE)
            && let Some((session_id, user_id)) = parse_session_cookie_value(cookie.value())
        {
            let pool = match req.rocket().state::<PgPool>() {
                Some(pool) => pool,
                None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
            };

            let repo = PostgresRepository { pool: pool.clone() };

            match repo.get_active_session_user(&session_id, &user_id).await {
                Ok(Some(user)) => {
                    let current_user = CurrentUser {
                        id: user.id,
                        username: user.username,
                        email: user.email,
                    };
                    req.local_cache(|| Some(current_user.clone()));
                    return Outcome::Success(current_user);
                }
                Ok(None) => {
                    let _ = repo.delete_session_if_expired(&session_id).await;
                    return Outcome::Error((Status::Unauthorized, AppError::InvalidCredentials));
                }
                Err(err) => return Outcome::Error((Status::InternalServerError, err)),
            }
        }

        Outcome::Error((Status::Unauthorized, AppError::InvalidCredentials))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ElevatedUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        // Every failure below collapses to the same opaque Unauthorized so
        // a caller cannot probe which check rejected them.
        let unauthorized = || Outcome::Error((Status::Unauthorized, AppError::Unauthorized));

        let Some(cookie) = req.cookies().get_private(ELEVATION_COOKIE) else {
            return unauthorized();
        };
        let Some(claims) = ElevationClaims::parse(cookie.value()) else {
            return unauthorized();
        };
        if claims.is_expired(Utc::now()) {
            return unauthorized();
        }

        let pool = match req.rocket().state::<PgPool>() {
            Some(pool) => pool,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };
        let repo = PostgresRepository { pool: pool.clone() };

        match repo.get_otp_by_id(&claims.otp_id).await {
            Ok(record) => match authorize_elevation(&claims, record.as_ref()) {
                Ok(elevated) => Outcome::Success(elevated),
                Err(_) => unauthorized(),
            },
            Err(err) => Outcome::Error((Status::InternalServerError, err)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Cookie-based authentication. Log in via POST /users/login to obtain the session cookie.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: SESSION_COOKIE.to_string(),
                location: "cookie".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("cookieAuth".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("cookieAuth".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        unauthorized_response()
    }
}

impl<'a> OpenApiFromRequest<'a> for ElevatedUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Step-up cookie minted by POST /otp/verify. Required for sensitive operations.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: ELEVATION_COOKIE.to_string(),
                location: "cookie".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("elevationAuth".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("elevationAuth".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        unauthorized_response()
    }
}

fn unauthorized_response() -> rocket_okapi::Result<Responses> {
    use rocket_okapi::okapi::openapi3::{RefOr, Response};
    let mut responses = Responses::default();
    responses.responses.insert(
        "401".to_string(),
        RefOr::Object(Response {
            description: "Unauthorized - Authentication required".to_string(),
            ..Default::default()
        }),
    );
    Ok(responses)
}
