use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use graphql_tools::parser::parse_schema;
use hive_usage_sdk::agent::recorder::{ExecutionOutcome, RecordStatus, RecorderError, UsageRecorder};
use hive_usage_sdk::agent::report::ClientInfo;
use hive_usage_sdk::collector::{CollectorOptions, OperationDefinition, UsageCollector};
use hive_usage_sdk::processor::{OperationProcessor, ProcessingError};
use hive_usage_sdk::schema::SchemaDocument;
use hive_usage_sdk::sender::{AgentError, HiveSender};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::args::{CollectArgs, Command, ReportArgs};
use crate::config::{UsageCliConfig, UsageConfigError};

const DOCUMENT_EXTENSIONS: &[&str] = &["graphql", "gql"];

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] UsageConfigError),
    #[error("failed to initialize the logger: {0}")]
    Logger(#[from] tracing_subscriber::filter::ParseError),
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to walk '{}': {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("failed to write the artifact: {0}")]
    Write(std::io::Error),
    #[error("failed to parse schema '{}': {message}", path.display())]
    SchemaParse { path: PathBuf, message: String },
    #[error("failed to parse variables '{}': {source}", path.display())]
    Variables {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("variables file '{}' must contain a JSON object", .0.display())]
    VariablesNotObject(PathBuf),
    #[error("no documents found in {0:?}")]
    NoDocuments(Vec<PathBuf>),
    #[error("failed to process '{}': {source}", path.display())]
    Processing {
        path: PathBuf,
        source: ProcessingError,
    },
    #[error("failed to serialize the artifact: {0}")]
    Serialize(serde_json::Error),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

pub async fn run(command: Command, config: UsageCliConfig) -> Result<(), CliError> {
    match command {
        Command::Collect(args) => {
            let process_variables = args.process_variables || config.collector.process_variables;
            let definitions = collect(&args, process_variables)?;
            let mut artifact =
                serde_json::to_string_pretty(&definitions).map_err(CliError::Serialize)?;
            artifact.push('\n');

            match &args.out {
                Some(path) => std::fs::write(path, artifact).map_err(CliError::Write)?,
                None => std::io::stdout()
                    .write_all(artifact.as_bytes())
                    .map_err(CliError::Write)?,
            }

            info!("collected {} operation(s)", definitions.len());
            Ok(())
        }
        Command::Report(args) => {
            let summary = report(&args, &config).await?;
            info!(
                "reported {} operation(s), {} sampled out, {} dropped",
                summary.recorded, summary.sampled_out, summary.dropped
            );
            Ok(())
        }
    }
}

/// Collects one definition per distinct operation key, in document order.
pub fn collect(
    args: &CollectArgs,
    process_variables: bool,
) -> Result<Vec<OperationDefinition>, CliError> {
    let options = CollectorOptions::default().process_variables(process_variables);
    let processor = OperationProcessor::new(UsageCollector::with_options(
        load_schema(&args.schema)?,
        options,
    ));
    let variables = args.variables.as_deref().map(load_variables).transpose()?;

    let mut seen = HashSet::new();
    let mut definitions = Vec::new();

    for (path, source) in load_documents(&args.documents)? {
        let processed = processor
            .process_with_variables(&source, variables.as_ref())
            .map_err(|source| CliError::Processing {
                path: path.clone(),
                source,
            })?;

        match processed {
            Some(definition) if seen.insert(definition.key.clone()) => {
                definitions.push(definition.as_ref().clone())
            }
            Some(definition) => debug!(
                "'{}' duplicates operation {}",
                path.display(),
                definition.key
            ),
            None => debug!("'{}' is an introspection query, skipping", path.display()),
        }
    }

    Ok(definitions)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub recorded: usize,
    pub sampled_out: usize,
    pub dropped: usize,
}

/// Replays every document as one successful execution, then flushes the recorder.
pub async fn report(args: &ReportArgs, config: &UsageCliConfig) -> Result<ReportSummary, CliError> {
    let usage = &config.usage_reporting;
    let processor = OperationProcessor::new(UsageCollector::with_options(
        load_schema(&args.schema)?,
        CollectorOptions::default().process_variables(config.collector.process_variables),
    ));
    let documents = load_documents(&args.documents)?;

    let client_version = usage
        .client_version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    let mut sender = HiveSender::builder()
        .endpoint(usage.endpoint.clone())
        .client_name(usage.client_name.clone())
        .client_version(client_version.clone())
        .connect_timeout(usage.connect_timeout)
        .request_timeout(usage.request_timeout)
        .accept_invalid_certs(usage.accept_invalid_certs);
    if let Some(token) = &usage.access_token {
        sender = sender.token(token.clone());
    }
    if let Some(target_id) = &usage.target_id {
        sender = sender.target_id(target_id.clone());
    }

    let recorder = UsageRecorder::builder()
        .sample_rate(usage.sample_rate.as_f64())
        .send_interval(usage.flush_interval)
        .max_size(usage.buffer_size)
        .sender(sender.build()?)
        .build()?;

    let client = ClientInfo::new(Some(usage.client_name.clone()), Some(client_version));
    let mut summary = ReportSummary::default();

    for (path, source) in documents {
        let processed = match processor.process(&source) {
            Ok(processed) => processed,
            Err(e) => {
                warn!("skipping '{}': {}", path.display(), e);
                summary.dropped += 1;
                continue;
            }
        };
        let Some(operation) = processed else {
            debug!("'{}' is an introspection query, skipping", path.display());
            continue;
        };

        let status = recorder
            .collect(operation, client.clone())
            .complete(ExecutionOutcome::ok())
            .await;

        match status {
            RecordStatus::Recorded => summary.recorded += 1,
            RecordStatus::SampledOut => summary.sampled_out += 1,
            RecordStatus::Dropped => summary.dropped += 1,
        }
    }

    recorder.dispose().await;

    Ok(summary)
}

fn load_schema(path: &Path) -> Result<Arc<SchemaDocument>, CliError> {
    let sdl = read_file(path)?;
    let schema = parse_schema::<String>(&sdl)
        .map_err(|e| CliError::SchemaParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .into_static();

    Ok(Arc::new(schema))
}

fn load_variables(path: &Path) -> Result<Map<String, JsonValue>, CliError> {
    let raw = read_file(path)?;
    let value: JsonValue = serde_json::from_str(&raw).map_err(|source| CliError::Variables {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Err(CliError::VariablesNotObject(path.to_path_buf())),
    }
}

/// Reads every document under `paths`. Directories are walked recursively in file name
/// order, so the output order is stable.
fn load_documents(paths: &[PathBuf]) -> Result<Vec<(PathBuf, String)>, CliError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            // explicitly named files are taken whatever their extension
            files.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|source| CliError::Walk {
                path: path.clone(),
                source,
            })?;

            if entry.file_type().is_file() && has_document_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    if files.is_empty() {
        return Err(CliError::NoDocuments(paths.to_vec()));
    }

    files
        .into_iter()
        .map(|path| read_file(&path).map(|source| (path, source)))
        .collect()
}

fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext))
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}
