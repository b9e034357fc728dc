#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeterError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("history source error: {0}")]
    HistorySource(String),
}

impl MeterError {
    /// Short label used for metric dimensions and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
            Self::HistorySource(_) => "history_source",
        }
    }
}
