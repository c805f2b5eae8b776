use thiserror::Error;

#[derive(Error, Debug)]
pub enum GomodError {
    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("Command execution failed: {0}")]
    Execution(String),

    #[error("Command '{program}' timed out after {seconds}s")]
    ExecutionTimeout { program: String, seconds: u64 },

    #[error("Filesystem operation failed: {0}")]
    Filesystem(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, GomodError>;
