use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tickview_core::ValidationError),

    #[error(transparent)]
    Source(#[from] tickview_core::SourceError),

    #[error(transparent)]
    Core(#[from] tickview_core::CoreError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Source(_) => 3,
            Self::Core(_) => 4,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickview_core::SourceError;

    #[test]
    fn rejections_print_verbatim() {
        let error = CliError::from(SourceError::rejected("Insufficient cash"));
        assert_eq!(error.to_string(), "Insufficient cash");
        assert_eq!(error.exit_code(), 3);
    }
}
