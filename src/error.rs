// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    SqlxMigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to process password")]
    PasswordHashingError,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is awaiting approval")]
    AccountPending,

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Failed to write workbook: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Failed to read workbook: {0}")]
    XlsxRead(#[from] calamine::XlsxError),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Unexpected internal error")]
    InternalServerError,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::AccountPending | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::Spreadsheet(_) | AppError::XlsxRead(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Mail(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal failures never leak details.
    pub fn user_message(&self) -> String {
        match self {
            AppError::SqlxError(_) | AppError::SqlxMigrateError(_) => {
                "데이터 처리 중 오류가 발생했습니다.".to_string()
            }
            AppError::EnvVarError(_) | AppError::Config(_) => "서버 설정 오류입니다.".to_string(),
            AppError::PasswordHashingError => "인증 정보를 처리하지 못했습니다.".to_string(),
            AppError::InvalidCredentials => "아이디 또는 비밀번호가 올바르지 않습니다.".to_string(),
            AppError::AccountPending => "관리자 승인 대기 중인 계정입니다.".to_string(),
            AppError::SessionError(_) => "세션 처리 중 오류가 발생했습니다.".to_string(),
            AppError::Unauthorized => "로그인이 필요합니다.".to_string(),
            AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Spreadsheet(msg) => msg.clone(),
            AppError::XlsxWrite(_) => "엑셀 파일을 만들지 못했습니다.".to_string(),
            AppError::XlsxRead(_) => "엑셀 파일을 읽을 수 없습니다.".to_string(),
            AppError::Mail(_) => "메일 발송에 실패했습니다.".to_string(),
            AppError::InternalServerError => "예기치 않은 오류가 발생했습니다.".to_string(),
        }
    }

    /// Maps a SQLite UNIQUE violation to a conflict, everything else stays a DB error.
    pub fn from_unique(e: sqlx::Error, msg: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return AppError::Conflict(msg.into());
            }
        }
        AppError::SqlxError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status.as_u16(), self);
        }

        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

pub type AppResult<T = ()> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let err = AppError::Conflict("이미 처리된 요청입니다.".into());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.user_message(), "이미 처리된 요청입니다.");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::Config("SESSION_SECRET too short".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("SESSION_SECRET"));
    }
}
