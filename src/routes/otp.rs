use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::elevation::ELEVATION_COOKIE;
use crate::models::otp::{OtpIssueResponse, OtpVerifyRequest, OtpVerifyResponse};
use crate::service::email::EmailService;
use crate::service::otp::OtpService;
use chrono::Duration;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

/// Issue a fresh verification code for the logged-in user and send it to
/// their registered email. Subject to the per-code cooldown and the
/// 24-hour attempt cap.
#[openapi(tag = "OTP")]
#[get("/generate")]
pub async fn generate_otp(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser) -> Result<Json<OtpIssueResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };

    let user = repo.get_user_by_id(&current_user.id).await?.ok_or(AppError::UserNotFound)?;

    let email_service = EmailService::new(config.email.clone());
    let issued = OtpService::new(&repo, &email_service).issue(&user).await?;

    Ok(Json(OtpIssueResponse {
        otp: issued.code,
        otp_id: issued.record.id,
        expires_at: issued.record.expires_at,
    }))
}

/// Verify a submitted code. On success the otp record is marked used and
/// an elevation cookie is set, unlocking the sensitive endpoints for the
/// configured window.
#[openapi(tag = "OTP")]
#[post("/verify", data = "<payload>")]
pub async fn verify_otp(
    pool: &State<PgPool>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    current_user: CurrentUser,
    payload: Json<OtpVerifyRequest>,
) -> Result<Json<OtpVerifyResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let email_service = EmailService::new(config.email.clone());

    let elevation_ttl = Duration::minutes(config.elevation.ttl_minutes);
    let claims = OtpService::new(&repo, &email_service)
        .verify(&current_user.id, &payload.code, elevation_ttl)
        .await?;

    let cookie = Cookie::build((ELEVATION_COOKIE, claims.encode()))
        .path("/")
        .http_only(true)
        .secure(config.session.cookie_secure)
        .same_site(SameSite::Strict)
        .max_age(rocket::time::Duration::minutes(config.elevation.ttl_minutes))
        .build();
    cookies.add_private(cookie);

    Ok(Json(OtpVerifyResponse {
        elevated_until: claims.expires_at,
    }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![generate_otp, verify_otp]
}

#[cfg(test)]
mod tests {
    use crate::{Config, build_rocket};
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    async fn generate_otp_requires_a_session() {
        let mut config = Config::default();
        config.session.cookie_secure = false;

        let client = Client::tracked(build_rocket(config)).await.expect("valid rocket instance");
        let response = client.get("/api/v1/otp/generate").dispatch().await;

        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn verify_otp_requires_a_session() {
        let mut config = Config::default();
        config.session.cookie_secure = false;

        let client = Client::tracked(build_rocket(config)).await.expect("valid rocket instance");
        let response = client
            .post("/api/v1/otp/verify")
            .header(rocket::http::ContentType::JSON)
            .body(r#"{"code":"12345"}"#)
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
    }
}
