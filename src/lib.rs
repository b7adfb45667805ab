pub mod config;
pub mod deploy;
pub mod dispatch;
pub mod error;
pub mod platform;
pub mod server;
pub mod shutdown;
pub mod webhook;
