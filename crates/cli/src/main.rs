// Notefy CLI - template filling, reconciliation and export

mod exit_codes;

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use notefy_cli::pipeline::{self, ProcessOutcome, ProcessRequest, SystemIntegrator};
use notefy_io::ExportFormat;
use notefy_recon::analyzer::analyze_file;
use notefy_recon::matcher::find_matches;
use notefy_recon::reconcile::reconcile_data;
use notefy_recon::{AnalyzeError, ClaimPolicy, ConfigError, MatchConfig};

use exit_codes::{
    export_exit_code, pipeline_exit_code, validation_exit_code, EXIT_IO, EXIT_PARSE, EXIT_PIPELINE,
    EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "notefy")]
#[command(about = "Fill document templates from extracted fields, reconcile and export")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Matcher config (TOML). Built-in defaults when omitted.
    #[arg(long, global = true, env = "NOTEFY_CONFIG")]
    config: Option<PathBuf>,

    /// Let each source field fill at most one template field
    #[arg(long, global = true)]
    exclusive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one document
    #[command(after_help = "\
Examples:
  notefy process -t paciente.toml -s extraido.json
  notefy process -t paciente.toml -s extraido.json -o salida --format json,csv
  notefy process -t modelo.py -s extraido.json --reference previo.json --json")]
    Process {
        /// Template file (.toml/.json/.yaml), or any file to analyze into one
        #[arg(long, short = 't')]
        template: PathBuf,

        /// Extracted fields (JSON)
        #[arg(long, short = 's')]
        source: PathBuf,

        /// Existing record to reconcile the result against (JSON)
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Export directory (omit to skip export)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Export formats, comma-separated
        #[arg(long, value_delimiter = ',', default_value = "json,yaml,csv,notify")]
        format: Vec<FormatArg>,

        /// Output file stem (default: source file stem)
        #[arg(long)]
        stem: Option<String>,

        /// Print the outcome as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Run the pipeline for many documents against one template
    #[command(after_help = "\
Examples:
  notefy batch -t paciente.toml -o salida docs/*.json
  notefy batch -t paciente.toml docs/a.json docs/b.json --json")]
    Batch {
        #[arg(long, short = 't')]
        template: PathBuf,

        /// Extracted-field files (JSON)
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        #[arg(long, value_delimiter = ',', default_value = "json,yaml,csv,notify")]
        format: Vec<FormatArg>,

        #[arg(long)]
        json: bool,
    },

    /// Show how extracted fields map onto a template
    Match {
        #[arg(long, short = 't')]
        template: PathBuf,

        #[arg(long, short = 's')]
        source: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Merge two flat JSON records
    #[command(after_help = "\
Examples:
  notefy reconcile nuevo.json previo.json
  notefy reconcile nuevo.json previo.json --similarity 0.9 --json")]
    Reconcile {
        source: PathBuf,

        target: PathBuf,

        /// Minimum name ratio for pairing differently-named fields
        #[arg(long)]
        similarity: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Derive a field schema from a model, schema or text file
    Analyze {
        file: PathBuf,

        /// Print the result as a loadable template
        #[arg(long)]
        as_template: bool,

        #[arg(long)]
        json: bool,
    },

    /// Check a flat JSON record against a template
    Validate {
        #[arg(long, short = 't')]
        template: PathBuf,

        record: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Yaml,
    Csv,
    Notify,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Yaml => ExportFormat::Yaml,
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Notify => ExportFormat::Notify,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  notefy-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref(), cli.exclusive).and_then(|config| match cli.command {
        Commands::Process {
            template,
            source,
            reference,
            out,
            format,
            stem,
            json,
        } => {
            let request = ProcessRequest {
                template,
                source,
                reference,
                output_dir: out,
                formats: format.into_iter().map(ExportFormat::from).collect(),
                stem,
            };
            cmd_process(config, request, json)
        }
        Commands::Batch {
            template,
            sources,
            out,
            format,
            json,
        } => {
            let formats: Vec<ExportFormat> = format.into_iter().map(ExportFormat::from).collect();
            let requests = sources
                .into_iter()
                .map(|source| ProcessRequest {
                    template: template.clone(),
                    source,
                    reference: None,
                    output_dir: out.clone(),
                    formats: formats.clone(),
                    stem: None,
                })
                .collect();
            cmd_batch(config, requests, json)
        }
        Commands::Match { template, source, json } => cmd_match(config, &template, &source, json),
        Commands::Reconcile {
            source,
            target,
            similarity,
            json,
        } => cmd_reconcile(&config, &source, &target, similarity, json),
        Commands::Analyze { file, as_template, json } => cmd_analyze(&file, as_template, json),
        Commands::Validate { template, record, json } => cmd_validate(config, &template, &record, json),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(EXIT_PARSE, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// In `--json` mode a failure still yields exactly one JSON value on stdout.
fn fail(json: bool, code: u8, err: impl Display) -> CliError {
    if json {
        println!("{}", ProcessOutcome::error_json(&err));
    }
    CliError::new(code, err.to_string())
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::new(EXIT_PIPELINE, e.to_string()))?;
    println!("{text}");
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn load_config(path: Option<&Path>, exclusive: bool) -> Result<MatchConfig, CliError> {
    let mut config = match path {
        None => MatchConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
            MatchConfig::from_toml(&text).map_err(|e| match e {
                ConfigError::Parse(_) => CliError::parse(e.to_string()),
                ConfigError::Validation(_) => CliError::args(e.to_string())
                    .with_hint("weights must sum to 1 and thresholds lie in [0, 1]"),
            })?
        }
    };
    if exclusive {
        config.claim_policy = ClaimPolicy::Exclusive;
    }
    config.validate().map_err(|e| CliError::args(e.to_string()))?;
    Ok(config)
}

// ============================================================================
// process / batch
// ============================================================================

fn cmd_process(config: MatchConfig, request: ProcessRequest, json: bool) -> Result<u8, CliError> {
    let integrator = SystemIntegrator::new(config);
    let outcome = integrator
        .process_document(&request)
        .map_err(|e| fail(json, pipeline_exit_code(&e), &e))?;

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome_summary(&outcome);
    }
    Ok(validation_exit_code(outcome.missing_required.len(), outcome.validation_errors.len()))
}

fn print_outcome_summary(outcome: &ProcessOutcome) {
    let r = &outcome.report;
    eprintln!("template:   {} ({})", outcome.template, outcome.document_type);
    if let Some(method) = outcome.analysis_method {
        eprintln!("analysis:   {method}");
    }
    eprintln!(
        "fields:     {} total, {} matched by type, average confidence {:.2}",
        r.total_fields, r.valid_fields, r.average_confidence
    );
    if !r.low_confidence_fields.is_empty() {
        eprintln!("low:        {}", r.low_confidence_fields.join(", "));
    }
    if let Some(rec) = &outcome.reconciliation {
        eprintln!(
            "reconciled: {} fields, {} conflicts",
            rec.fields_reconciled,
            rec.conflicts.len()
        );
    }
    for (field, errors) in &outcome.validation_errors {
        eprintln!("invalid:    {field}: {}", errors.join("; "));
    }
    for path in &outcome.exported {
        eprintln!("wrote       {}", path.display());
    }
}

fn cmd_batch(config: MatchConfig, requests: Vec<ProcessRequest>, json: bool) -> Result<u8, CliError> {
    let integrator = SystemIntegrator::new(config);
    let report = integrator.process_batch(&requests);

    for item in &report.items {
        eprintln!("{}", item.status_line());
    }
    eprintln!("{}/{} processed", report.succeeded, report.total);

    if json {
        print_json(&report)?;
    }
    Ok(if report.failed > 0 { EXIT_PIPELINE } else { EXIT_SUCCESS })
}

// ============================================================================
// match
// ============================================================================

fn cmd_match(config: MatchConfig, template: &Path, source: &Path, json: bool) -> Result<u8, CliError> {
    let integrator = SystemIntegrator::new(config);
    let (template, _) = integrator
        .load_template(template)
        .map_err(|e| fail(json, pipeline_exit_code(&e), &e))?;
    let source = integrator
        .load_source(source)
        .map_err(|e| fail(json, pipeline_exit_code(&e), &e))?;
    let output = find_matches(&source, &template, integrator.config())
        .map_err(|e| fail(json, EXIT_PIPELINE, &e))?;

    if json {
        print_json(&output)?;
        return Ok(EXIT_SUCCESS);
    }
    for m in output.matches.values() {
        let mark = if m.type_match { "" } else { "  (type differs)" };
        eprintln!("{:<24} <- {:<24} {:>6.2}{mark}", m.template_field, m.pdf_field, m.confidence);
    }
    for name in &output.unmatched_template_fields {
        eprintln!("{:<24} <- (none)", name);
    }
    eprintln!(
        "{}/{} matched, average confidence {:.2}",
        output.stats.matched_fields, output.stats.total_template_fields, output.stats.average_confidence
    );
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// reconcile
// ============================================================================

fn cmd_reconcile(
    config: &MatchConfig,
    source: &Path,
    target: &Path,
    similarity: Option<f64>,
    json: bool,
) -> Result<u8, CliError> {
    let ratio = similarity.unwrap_or(config.reconcile_similarity);
    if !(0.0..=1.0).contains(&ratio) {
        return Err(fail(json, EXIT_USAGE, format!("--similarity must be in [0, 1], got {ratio}")));
    }
    let source = notefy_io::read_json(source).map_err(|e| fail(json, export_exit_code(&e), &e))?;
    let target = notefy_io::read_json(target).map_err(|e| fail(json, export_exit_code(&e), &e))?;
    let merged = reconcile_data(&source, &target, ratio);

    if json {
        print_json(&merged)?;
        return Ok(EXIT_SUCCESS);
    }
    eprintln!(
        "{} fields paired, {} conflicts, confidence {:.1}",
        merged.metadata.fields_reconciled,
        merged.metadata.conflicts.len(),
        merged.metadata.confidence
    );
    for c in &merged.metadata.conflicts {
        eprintln!(
            "  {} / {}: {} vs {} -> {} ({})",
            c.source_field, c.target_field, c.source_value, c.target_value, c.resolved, c.resolution
        );
    }
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// analyze
// ============================================================================

fn cmd_analyze(file: &Path, as_template: bool, json: bool) -> Result<u8, CliError> {
    let analysis = analyze_file(file).map_err(|e| {
        let code = match e {
            AnalyzeError::Io { .. } => EXIT_IO,
            _ => EXIT_PARSE,
        };
        fail(json, code, &e)
    })?;

    if as_template {
        let name = file.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let template = analysis
            .into_template(name, stem)
            .map_err(|e| fail(json, EXIT_PARSE, &e))?;
        print_json(&template)?;
        return Ok(EXIT_SUCCESS);
    }

    if json {
        print_json(&analysis)?;
        return Ok(EXIT_SUCCESS);
    }
    eprintln!("method: {} (score {:.2})", analysis.metadata.method, analysis.metadata.score);
    for (name, f) in &analysis.fields {
        let ty = f.field_type.map(|t| t.to_string()).unwrap_or_else(|| "?".into());
        let req = if f.required { " required" } else { "" };
        eprintln!("  {name}: {ty}{req}");
    }
    for alt in &analysis.metadata.alternatives {
        eprintln!("  also: {} (score {:.2})", alt.method, alt.score);
    }
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// validate
// ============================================================================

fn cmd_validate(config: MatchConfig, template: &Path, record: &Path, json: bool) -> Result<u8, CliError> {
    let integrator = SystemIntegrator::new(config);
    let (template, _) = integrator
        .load_template(template)
        .map_err(|e| fail(json, pipeline_exit_code(&e), &e))?;
    let record = notefy_io::read_json(record).map_err(|e| fail(json, export_exit_code(&e), &e))?;
    let (errors, missing) = pipeline::validate_record(&record, &template);

    if json {
        print_json(&json!({
            "valid": errors.is_empty(),
            "errors": errors,
            "missing_required": missing,
        }))?;
    } else if errors.is_empty() {
        eprintln!("{}: all {} fields valid", template.nombre_archivo, template.campos.len());
    } else {
        for (field, msgs) in &errors {
            eprintln!("{field}: {}", msgs.join("; "));
        }
    }
    Ok(validation_exit_code(missing.len(), errors.len()))
}
