// src/models/mod.rs
pub mod account;
pub mod class;
pub mod inquiry;
pub mod log;
pub mod merit;
pub mod reset;
