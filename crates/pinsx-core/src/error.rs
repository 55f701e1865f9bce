use std::path::PathBuf;
use thiserror::Error;

pub const EXIT_OK: i32 = 0;
pub const EXIT_PROPERTY_VIOLATED: i32 = 1;
pub const EXIT_PROVIDER_FAILURE: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{}", format_model_load(.path, .message))]
    ModelLoad {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("invalid descriptor: {0}")]
    DescriptorInvalid(String),

    #[error("malformed state vector: {0}")]
    MalformedState(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl ProviderError {
    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: None,
            message: message.into(),
        }
    }

    pub fn model_load_at(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::DescriptorInvalid(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedState(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    /// Attaches `path` to a `ModelLoad` error that does not carry one yet.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::ModelLoad {
                path: None,
                message,
            } => Self::ModelLoad {
                path: Some(path.into()),
                message,
            },
            other => other,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::ModelLoad { .. } => "model_load",
            Self::DescriptorInvalid(_) => "descriptor_invalid",
            Self::MalformedState(_) => "malformed_state",
            Self::Evaluation(_) => "evaluation",
        }
    }
}

fn format_model_load(path: &Option<PathBuf>, message: &str) -> String {
    match path {
        Some(path) => format!("failed to load model {}: {message}", path.display()),
        None => format!("failed to load model: {message}"),
    }
}

/// Interprets the exit code of an exploration run: `Ok(true)` when the checked
/// property holds, `Ok(false)` when it is violated.
pub fn interpret_exit_code(exit_code: i32) -> Result<bool, ProviderError> {
    match exit_code {
        EXIT_OK => Ok(true),
        EXIT_PROPERTY_VIOLATED => Ok(false),
        EXIT_PROVIDER_FAILURE => Err(ProviderError::evaluation(
            "model checking failed due to a provider error",
        )),
        other => Err(ProviderError::evaluation(format!(
            "exploration exited with an unexpected exit code: {other}"
        ))),
    }
}
