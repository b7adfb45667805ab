pub mod cleanup;
pub mod provision;
pub mod script;

pub use cleanup::CleanupRunner;
pub use provision::{DeploymentResult, DeploymentRunner};
pub use script::ScriptRunner;
