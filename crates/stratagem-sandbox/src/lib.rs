pub mod docker;
pub mod error;
pub mod executor;
pub mod mock;

pub use docker::DockerCli;
pub use error::{Result, SandboxError};
pub use executor::{ExecutionArtifact, Sandbox, SandboxExecutor};
pub use mock::MockSandbox;
