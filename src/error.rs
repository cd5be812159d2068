use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("{0}")]
  Provider(String),

  #[error("executable not found: {0}")]
  NotFound(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("unsupported platform: {0}")]
  UnsupportedPlatform(String),

  #[error("invalid query: {0}")]
  InvalidQuery(String),

  #[error("invalid value for setting '{key}': {reason}")]
  InvalidSetting { key: String, reason: String },

  #[error("background task failed: {0}")]
  TaskFailed(String),
}

impl CoreError {
  pub fn provider(msg: impl Into<String>) -> Self {
    Self::Provider(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, CoreError>;
