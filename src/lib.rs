pub mod archive;
pub mod auth;
pub mod config;
pub mod console;
pub mod dns;
pub mod error;
pub mod session;
pub mod settings;
pub mod transfer;
