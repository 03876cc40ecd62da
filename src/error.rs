/// Creates an anyhow error with the current file and line number
#[macro_export]
macro_rules! file_error {
    ($($arg:tt)*) => {
        anyhow!(
            "[{}:{}] {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*)
        )
    };
}

/// Failure to turn a raw bus payload into typed data. The caller keeps
/// whatever it had before.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The payload is not JSON, or not the expected top-level shape.
    #[error("invalid json in {section}: {message}")]
    InvalidJson { section: String, message: String },
    /// One section (or one element in it) failed to parse.
    #[error("failed to parse section {section}: {message}")]
    InvalidSection { section: String, message: String },
}

impl ParseError {
    pub fn invalid_json(section: &str, message: impl std::fmt::Display) -> Self {
        Self::InvalidJson {
            section: section.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_section(section: &str, message: impl std::fmt::Display) -> Self {
        Self::InvalidSection {
            section: section.to_string(),
            message: message.to_string(),
        }
    }

    pub fn section(&self) -> &str {
        match self {
            Self::InvalidJson { section, .. } | Self::InvalidSection { section, .. } => section,
        }
    }
}
