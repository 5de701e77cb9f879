use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

/// Error type returned by caller-supplied capabilities (resource resolver, transform, pre-eval hook).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// Every failure the evaluator can report. All of them abort the enclosing `eval` call.
#[derive(Debug, Error)]
pub enum EvalError {
    // Scope token is not one of local/global/resource
    #[error("unknown scope '{scope}'")]
    UnknownScope { scope: String },

    // Scope is recognized but the evaluator was built without it
    #[error("{scope} scope is not configured")]
    ScopeNotConfigured { scope: String },

    #[error("path '{path}' not found in {scope} scope")]
    PathNotFound { scope: String, path: String },

    // Ordered from the outermost in-progress reference to the repeated one
    #[error("cyclic reference detected: {}", chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },

    #[error("max reference depth exceeded: {limit}")]
    DepthExceeded { limit: usize },

    #[error("key conflict: '{key}' already exists")]
    KeyConflict { key: String },

    // Directive-specific payload rejection
    #[error("invalid {directive}: {message}")]
    Validation { directive: String, message: String },

    #[error("inline merge failed: {0}")]
    InlineMerge(String),

    #[error("multiple directives are not allowed in a map: {}", keys.join(", "))]
    MultipleDirectives { keys: Vec<String> },

    // Registration-time failures
    #[error("invalid directive: {0}")]
    InvalidDirective(String),

    #[error("directive '{name}' is already registered")]
    DuplicateDirective { name: String },

    #[error("failed to resolve resource '{id}': {source}")]
    ResourceResolution {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to transform {component}: {source}")]
    Transform {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error("pre-evaluation hook failed: {0}")]
    PreEval(#[source] BoxError),

    // Transcoder and I/O errors pass through unchanged
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub(crate) fn validation(directive: &str, message: impl Into<String>) -> Self {
        EvalError::Validation {
            directive: directive.to_string(),
            message: message.into(),
        }
    }
}

// Type alias for results that use `EvalError` as the error type
pub type Result<T> = std::result::Result<T, EvalError>;
