//! Top-level server error, mapped to the process exit codes spec §6
//! defines: `0` clean shutdown, `1` startup failure, `2` fatal runtime.

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("startup failed: {0}")]
    Startup(#[source] anyhow::Error),

    #[error("fatal runtime error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl ServerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::Startup(_) => 1,
            ServerError::Fatal(_) => 2,
        }
    }
}
