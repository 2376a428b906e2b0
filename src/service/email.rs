use crate::config::EmailConfig;
use crate::error::app_error::AppError;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// Outbound delivery of verification codes. The issuer rolls back the
/// stored record when this fails, so implementations must only return Ok
/// once the message was actually accepted.
#[async_trait::async_trait]
pub trait OtpMailer {
    async fn send_otp(&self, to_email: &str, to_name: &str, code: &str) -> Result<(), AppError>;
}

pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn otp_email_text(&self, to_name: &str, code: &str) -> String {
        format!(
            r#"ClipStream | Verification code

Hi {},

Your ClipStream verification code is: {}

It expires in 3 minutes. Enter it in the app to continue with your
sensitive account change.

If you did not request this code, you can safely ignore this message;
your account stays unchanged.

ClipStream Security
"#,
            to_name, code
        )
    }

    async fn send_email(&self, to_email: &str, subject: &str, text_body: &str) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_address)
                    .parse()
                    .map_err(|e| AppError::delivery(format!("Invalid from address: {}", e)))?,
            )
            .to(to_email.parse().map_err(|e| AppError::delivery(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(text_body.to_string())
            .map_err(|e| AppError::delivery(format!("Failed to build email: {}", e)))?;

        let creds = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());

        let mailer = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| AppError::delivery(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        // lettre's SmtpTransport blocks; keep it off the async workers.
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::delivery(format!("Failed to spawn email sending task: {}", e)))?;

        result.map_err(|e| AppError::delivery(format!("Failed to send email: {}", e)))?;

        tracing::info!("Verification code email sent to {}", to_email);
        Ok(())
    }
}

#[async_trait::async_trait]
impl OtpMailer for EmailService {
    async fn send_otp(&self, to_email: &str, to_name: &str, code: &str) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!("Email service is disabled, skipping verification code email to {}", to_email);
            return Ok(());
        }

        let subject = "Your ClipStream verification code";
        let body = self.otp_email_text(to_name, code);

        self.send_email(to_email, subject, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_email_contains_code_and_window() {
        let service = EmailService::new(EmailConfig::default());
        let text = service.otp_email_text("Jane Smith", "48213");

        assert!(text.contains("Jane Smith"));
        assert!(text.contains("48213"));
        assert!(text.contains("3 minutes"));
    }

    #[rocket::async_test]
    async fn disabled_service_reports_success() {
        let service = EmailService::new(EmailConfig::default());
        assert!(service.send_otp("someone@example.com", "Someone", "12345").await.is_ok());
    }
}
