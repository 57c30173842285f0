//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, bad format)   |
//! | 3       | Universal        | File could not be read or written        |
//! | 4       | Universal        | Input could not be parsed                |
//! | 10-19   | validate         | Record failed template validation        |
//! | 20-29   | pipeline         | Processing stopped or partially failed   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use notefy_io::ExportError;
use notefy_recon::{AnalyzeError, TemplateError};

use notefy_cli::pipeline::PipelineError;

// =============================================================================
// Universal (0-4)
// =============================================================================

/// Success - command completed and every field validated.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, unknown export format, unsupported file type.
pub const EXIT_USAGE: u8 = 2;

/// A file could not be opened, read or written.
pub const EXIT_IO: u8 = 3;

/// A template, config, source or reference file is malformed.
pub const EXIT_PARSE: u8 = 4;

// =============================================================================
// Validate (10-19)
// =============================================================================

/// At least one field broke a validator.
pub const EXIT_VALIDATION_FAILED: u8 = 10;

/// At least one required field is absent. Takes precedence over 10.
pub const EXIT_MISSING_REQUIRED: u8 = 11;

// =============================================================================
// Pipeline (20-29)
// =============================================================================

/// Matching or export failed for a reason other than bad input, or a batch
/// had failing items.
pub const EXIT_PIPELINE: u8 = 20;

pub fn template_exit_code(err: &TemplateError) -> u8 {
    match err {
        TemplateError::Io { .. } => EXIT_IO,
        TemplateError::UnsupportedFormat(_) => EXIT_USAGE,
        _ => EXIT_PARSE,
    }
}

pub fn export_exit_code(err: &ExportError) -> u8 {
    match err {
        ExportError::Read { .. } | ExportError::Write { .. } => EXIT_IO,
        ExportError::UnknownFormat(_) => EXIT_USAGE,
        ExportError::Json { .. } | ExportError::NotAnObject(_) => EXIT_PARSE,
        ExportError::Yaml { .. } | ExportError::Csv { .. } => EXIT_PIPELINE,
    }
}

/// Map a pipeline failure to its exit code.
pub fn pipeline_exit_code(err: &PipelineError) -> u8 {
    match err {
        PipelineError::Template(e) => template_exit_code(e),
        PipelineError::Analyze(AnalyzeError::Io { .. }) => EXIT_IO,
        PipelineError::Analyze(_) => EXIT_PARSE,
        PipelineError::Export(e) => export_exit_code(e),
        PipelineError::SourceFormat { .. } => EXIT_PARSE,
        PipelineError::Match(_) | PipelineError::ExportPanicked(_) => EXIT_PIPELINE,
    }
}

/// Exit code for a finished validation: 11 beats 10 beats 0.
pub fn validation_exit_code(missing_required: usize, invalid_fields: usize) -> u8 {
    if missing_required > 0 {
        EXIT_MISSING_REQUIRED
    } else if invalid_fields > 0 {
        EXIT_VALIDATION_FAILED
    } else {
        EXIT_SUCCESS
    }
}
