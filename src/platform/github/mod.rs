pub mod auth;
pub mod client;

pub use client::{comment_endpoint, GitHubCredentials, GitHubNotifier};
