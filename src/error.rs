use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OktawaveError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("HTTP request failed while {context}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode API response for {operation}: {message}")]
    Decode { operation: String, message: String },

    #[error("{message}")]
    ApiFault { message: String },

    #[error("login failed: the API accepted the logon call but returned no client id")]
    #[diagnostic(help("check your Oktawave login and password"))]
    AuthenticationFailed,

    #[error("OCI {id} not found")]
    OciNotFound { id: i64 },

    #[error("OCI {id} has no IPv4 address")]
    NoIpAddress { id: i64 },

    #[error("incorrect OCI class '{name}' (available: {available})")]
    UnknownClass { name: String, available: String },

    #[error("timed out waiting for OCI creation to finish{}", oci_id.map(|id| format!(" (instance id {id})")).unwrap_or_default())]
    #[diagnostic(help("check the instance at admin.oktawave.com and bootstrap manually"))]
    CreationTimeout { oci_id: Option<i64> },

    #[error("failed to deploy instance: no creation job was ever observed")]
    #[diagnostic(help("check the instance at admin.oktawave.com and bootstrap manually"))]
    CreationUnresolved,

    #[error("bootstrap failed: {message}")]
    Bootstrap { message: String },

    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}
