//! Compilation requests and their outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A document to compile together with the caller's compiler flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub document: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl CompileRequest {
    pub fn new(document: impl Into<String>, options: Vec<String>) -> Result<Self, DomainError> {
        let document = document.into();
        if document.is_empty() {
            return Err(DomainError::validation("document must not be empty"));
        }
        Ok(Self { document, options })
    }
}

/// Compiled output handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    /// Path of the artifact inside the job workspace at the time it was read.
    pub location: String,
}

/// Stage at which a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolchainNotFound,
    WorkspacePrepareFailed,
    CompilerInvocationFailed,
    Timeout,
    OutputArtifactMissing,
    ArtifactReadFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ToolchainNotFound => "toolchain_not_found",
            FailureKind::WorkspacePrepareFailed => "workspace_prepare_failed",
            FailureKind::CompilerInvocationFailed => "compiler_invocation_failed",
            FailureKind::Timeout => "timeout",
            FailureKind::OutputArtifactMissing => "output_artifact_missing",
            FailureKind::ArtifactReadFailed => "artifact_read_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one compilation job. Exactly one variant is ever produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationResult {
    Artifact(Artifact),
    Failure { kind: FailureKind, message: String },
}

impl CompilationResult {
    pub fn artifact(bytes: Vec<u8>, location: impl Into<String>) -> Self {
        Self::Artifact(Artifact {
            bytes,
            mime_type: PDF_MIME_TYPE,
            location: location.into(),
        })
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Artifact(_))
    }

    /// Label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Artifact(_) => "succeeded",
            Self::Failure { kind, .. } => kind.as_str(),
        }
    }
}
