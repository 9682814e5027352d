// src/services/mod.rs
pub mod account_service;
pub mod auth_service;
pub mod class_service;
pub mod inquiry_service;
pub mod log_service;
pub mod mail_service;
pub mod merit_service;
pub mod report_service;
pub mod reset_service;
pub mod spreadsheet_service;
