// src/web/mod.rs
pub mod admin_handlers;
pub mod auth_handlers;
pub mod merit_handlers;
pub mod mw_admin;
pub mod mw_auth;
pub mod routes;
pub mod user_handlers;

use crate::services::spreadsheet_service::XLSX_CONTENT_TYPE;
use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// Download response for a generated workbook. Korean file names go through `filename*`.
pub fn xlsx_attachment(filename: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!(
        "attachment; filename=\"export.xlsx\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    );
    (
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}
