// src/services/mail_service.rs
use crate::{
    config::MailConfig,
    error::{AppError, AppResult},
    services::spreadsheet_service::XLSX_CONTENT_TYPE,
};
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// An email carrying one XLSX attachment.
#[derive(Debug, Clone)]
pub struct XlsxMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub filename: String,
    pub attachment: Vec<u8>,
}

fn mailbox(address: &str) -> AppResult<Mailbox> {
    address
        .parse()
        .map_err(|e| AppError::Validation(format!("잘못된 이메일 주소입니다: {} ({})", address, e)))
}

pub fn build_message(config: &MailConfig, mail: XlsxMail) -> AppResult<Message> {
    let content_type =
        ContentType::parse(XLSX_CONTENT_TYPE).map_err(|e| AppError::Mail(e.to_string()))?;

    Message::builder()
        .from(mailbox(&config.from)?)
        .to(mailbox(&mail.to)?)
        .subject(mail.subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body))
                .singlepart(Attachment::new(mail.filename).body(mail.attachment, content_type)),
        )
        .map_err(|e| AppError::Mail(e.to_string()))
}

pub async fn send(config: &MailConfig, mail: XlsxMail) -> AppResult<()> {
    let to = mail.to.clone();
    let message = build_message(config, mail)?;

    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        .map_err(|e| AppError::Mail(e.to_string()))?
        .credentials(Credentials::new(config.username.clone(), config.password.clone()))
        .build();

    transport
        .send(message)
        .await
        .map_err(|e| AppError::Mail(e.to_string()))?;

    tracing::info!("📧 Mail sent to {}", to);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailConfig {
        MailConfig {
            smtp_host: "smtp.example.com".into(),
            username: "school@example.com".into(),
            password: "secret".into(),
            from: "상벌점 시스템 <school@example.com>".into(),
        }
    }

    #[test]
    fn message_carries_the_attachment() {
        let message = build_message(
            &config(),
            XlsxMail {
                to: "teacher@example.com".into(),
                subject: "일일 상벌점 보고".into(),
                body: "첨부 파일을 확인해 주세요.".into(),
                filename: "report.xlsx".into(),
                attachment: vec![1, 2, 3],
            },
        )
        .unwrap();

        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("report.xlsx"));
        assert!(raw.contains("spreadsheetml"));
    }

    #[test]
    fn invalid_recipient_is_a_validation_error() {
        let err = build_message(
            &config(),
            XlsxMail {
                to: "not-an-address".into(),
                subject: "s".into(),
                body: "b".into(),
                filename: "r.xlsx".into(),
                attachment: vec![],
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
