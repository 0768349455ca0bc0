//! The `convert_latex_to_pdf` tool: schema, argument parsing, result encoding.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::domain::compile::{CompilationResult, CompileRequest};

pub const CONVERT_LATEX_TO_PDF: &str = "convert_latex_to_pdf";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: CONVERT_LATEX_TO_PDF,
        description: "Converts a given LaTeX ready document to PDF",
        input_schema: json!({
            "type": "object",
            "properties": {
                "document": {
                    "type": "string",
                    "description": "LaTeX document to convert"
                },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Options for the conversion, e.g., compiler options -mltex, -etex"
                }
            },
            "required": ["document"]
        }),
    }]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
    Resource { resource: BlobResource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobResource {
    pub uri: String,
    pub mime_type: String,
    /// Base64 (standard alphabet, padded) encoding of the artifact.
    pub blob: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }
}

impl From<CompilationResult> for CallToolResult {
    fn from(result: CompilationResult) -> Self {
        match result {
            CompilationResult::Artifact(artifact) => Self {
                content: vec![
                    Content::Text {
                        text: artifact.location.clone(),
                    },
                    Content::Resource {
                        resource: BlobResource {
                            uri: artifact.location,
                            mime_type: artifact.mime_type.to_string(),
                            blob: STANDARD.encode(&artifact.bytes),
                        },
                    },
                ],
                is_error: false,
            },
            CompilationResult::Failure { message, .. } => Self::error(message),
        }
    }
}

/// Pull a [`CompileRequest`] out of tool-call arguments.
///
/// The error string is meant for the caller and ends up in an `isError` result.
pub fn parse_compile_arguments(arguments: Option<&Value>) -> Result<CompileRequest, String> {
    let empty = Map::new();
    let arguments = match arguments {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err("arguments must be an object".to_string()),
    };

    let document = match arguments.get("document") {
        None | Some(Value::Null) => {
            return Err(r#"required argument "document" not found"#.to_string());
        }
        Some(Value::String(document)) => document.clone(),
        Some(_) => return Err(r#"argument "document" is not a string"#.to_string()),
    };

    let options = match arguments.get("options") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| r#"argument "options" must be an array of strings"#.to_string())?,
        Some(_) => return Err(r#"argument "options" must be an array of strings"#.to_string()),
    };

    if document.is_empty() {
        return Err(r#"argument "document" must not be empty"#.to_string());
    }
    CompileRequest::new(document, options).map_err(|err| err.to_string())
}
