use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// Container not found and could not be created, or the runtime itself
    /// is unreachable. Fatal to the cycle.
    #[error("Sandbox unavailable: {0}")]
    Unavailable(String),

    /// Script injection or verification failed. Fatal to the cycle.
    #[error("Sandbox I/O failed: {0}")]
    Io(String),

    /// Host-side filesystem failure while materializing the script.
    #[error("Host I/O error: {0}")]
    HostIo(#[from] std::io::Error),

    /// The script exited non-zero; the combined output is the regen fuel.
    #[error("Script failed, output:\n{output}")]
    Exec { output: String },

    /// Wall-clock deadline exceeded.
    #[error("Script ran too long, killed after {secs}s")]
    Timeout { secs: u64 },
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// True for the fault classes the retry envelope can recover from by
    /// regenerating code; `Io`/`Unavailable` faults terminate the cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SandboxError::Exec { .. } | SandboxError::Timeout { .. }
        )
    }
}
