//! `notefy-recon`: field matching and reconciliation engine.
//!
//! Pure engine crate: receives templates and extracted fields, returns
//! matched, filled and validated records. File export and the command line
//! live in `notefy-io` and `notefy-cli`.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod matcher;
pub mod model;
pub mod reconcile;
pub mod similarity;
pub mod transform;
pub mod validator;

pub use analyzer::{analyze_file, analyze_source, Analysis, AnalysisMethod};
pub use cache::SmartOperationCache;
pub use config::{ClaimPolicy, MatchConfig};
pub use connector::connect_data;
pub use error::{AnalyzeError, ConfigError, MatchError, TemplateError};
pub use matcher::find_matches;
pub use model::{
    ConnectedDocument, ExtractedField, FieldSpec, FieldType, Record, Reconciliation, SourceFields, Template,
    ValidationReport, Validator,
};
pub use reconcile::reconcile_data;
pub use transform::{transform, TransformedRecord};
pub use validator::FieldValidator;
