use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("malformed change-event frame at line {line}: {message}")]
    Frame { line: usize, message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn frame(line: usize, message: impl Into<String>) -> Self {
        Self::Frame {
            line,
            message: message.into(),
        }
    }
}
