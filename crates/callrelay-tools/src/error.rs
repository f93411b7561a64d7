use thiserror::Error;

/// Failures while running a tool against an external collaborator.
///
/// The detail stays in the logs; the agent only ever sees the generic
/// message of the tool that failed.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("knowledge base error: {0}")]
    Knowledge(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("unknown meeting location: {0}")]
    UnknownLocation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid collaborator response: {0}")]
    Parse(#[from] serde_json::Error),
}
