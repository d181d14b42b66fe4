use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single language-model invocation.
#[derive(Error, Debug)]
pub enum ModelInvocationError {
    #[error("language model call failed: {0}")]
    Provider(String),

    #[error("language model returned an empty response")]
    EmptyResponse,

    #[error("{stage} output failed schema validation: {reason}")]
    Schema { stage: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("invoice extraction failed: {0}")]
    Extraction(String),

    #[error("knowledge base retrieval failed: {0}")]
    Retrieval(String),

    #[error(transparent)]
    ModelInvocation(#[from] ModelInvocationError),

    #[error("prompt template `{template}` is missing a value for placeholder `{placeholder}`")]
    TemplateBinding {
        template: &'static str,
        placeholder: String,
    },

    #[error("failed to write upload to {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClaimError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimError::Extraction(_) => "extraction_error",
            ClaimError::Retrieval(_) => "retrieval_error",
            ClaimError::ModelInvocation(ModelInvocationError::Schema { .. }) => {
                "model_schema_error"
            }
            ClaimError::ModelInvocation(_) => "model_invocation_error",
            ClaimError::TemplateBinding { .. } => "template_binding_error",
            ClaimError::FileWrite { .. } => "file_write_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
