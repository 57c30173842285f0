use std::path::PathBuf;

/// Template load / parse failures.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// TOML parse / deserialization error.
    #[error("template parse error (toml): {0}")]
    Toml(#[from] toml::de::Error),

    #[error("template parse error (json): {0}")]
    Json(#[from] serde_json::Error),

    #[error("template parse error (yaml): {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Unknown declared type on a template field.
    #[error("field '{field}': unknown type '{value}'")]
    UnknownType { field: String, value: String },

    /// Pattern validator that does not compile.
    #[error("field '{field}': invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        field: String,
        pattern: String,
        reason: String,
    },

    /// Validator option with a value of the wrong shape.
    #[error("field '{field}': invalid value for validator '{option}'")]
    InvalidValidator { field: String, option: String },

    #[error("template '{0}' declares no fields")]
    NoFields(String),

    #[error("unsupported template format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the matching machinery itself. A field without a match is
/// not an error.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("template has no fields to match")]
    EmptyTemplate,

    #[error("source field '{field}': confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { field: String, value: f64 },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
}

/// Matcher configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Field analysis errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input is not valid for a given strategy.
    #[error("{method}: {reason}")]
    Syntax { method: String, reason: String },

    /// Strategy ran but recognised no fields.
    #[error("{0}: no fields found")]
    Empty(String),

    /// Every strategy failed; carries each method's reason.
    #[error("no analysis strategy succeeded ({})", failures.join("; "))]
    NoStrategySucceeded { failures: Vec<String> },
}
