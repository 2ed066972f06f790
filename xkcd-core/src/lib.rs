pub mod app_context;
pub mod broker;
pub mod common;
pub mod config;
pub mod database;
pub mod errors;
pub mod services;
pub mod storage;
pub mod value_objects;

pub use app_context::AppContext;
pub use config::Settings;
