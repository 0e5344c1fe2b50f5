pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod otp;
pub mod phone;
pub mod policy;
pub mod sms;
pub mod storage;

pub use app::{build_router, AppState};
