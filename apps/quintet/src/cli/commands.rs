//! # CLI Command Implementations

use super::Backend;
use crate::api::{
    self, AssertRequest, ExplainResponse, FactJson, QueryRequest, QueryResponse, StatementJson,
    StatusResponse, SubjectJson, ValueJson,
};
use crate::config::ServerConfig;
use quintet_core::{
    Engine, EngineConfig, QuintetError, ReadOptions, Session, Subject,
    export::{canonical_checksum, compute_blake3_hash, export_canonical, import_canonical},
    formats::{MAX_PERSISTENCE_PAYLOAD_SIZE, engine_from_bytes, engine_to_bytes},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for statement files (100 MB).
const MAX_STATEMENT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum file size for import (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), QuintetError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| QuintetError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(QuintetError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it is a regular file.
///
/// Resolves `..` and symlinks before anything is read.
fn validate_file_path(path: &Path) -> Result<PathBuf, QuintetError> {
    let canonical = path.canonicalize().map_err(|e| {
        QuintetError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(QuintetError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, QuintetError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        QuintetError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(QuintetError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| QuintetError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// DATABASE HANDLE
// =============================================================================

/// Where and how the database lives.
#[derive(Debug, Clone)]
pub struct Store {
    pub path: PathBuf,
    pub backend: Backend,
    pub engine: EngineConfig,
}

impl Store {
    /// Open the database, creating an empty one if absent.
    pub fn open(&self) -> Result<Session, QuintetError> {
        match self.backend {
            Backend::Redb => Session::with_redb(&self.path, self.engine.clone()),
            Backend::File => {
                if !self.path.exists() {
                    return Ok(Session::with_engine(Engine::with_config(self.engine.clone())));
                }
                validate_file_size(&self.path, MAX_PERSISTENCE_PAYLOAD_SIZE as u64)?;
                let data = std::fs::read(&self.path)
                    .map_err(|e| QuintetError::IoError(format!("Read db: {}", e)))?;

                // Snapshot first, then a canonical export dropped in place.
                let engine = engine_from_bytes(&data, self.engine.clone())
                    .or_else(|_| import_canonical(&data, self.engine.clone()))
                    .map_err(|_| {
                        QuintetError::DeserializationError(
                            "Could not parse database file".to_string(),
                        )
                    })?;
                Ok(Session::with_engine(engine))
            }
        }
    }

    /// Persist the session. The redb journal is already current.
    pub fn save(&self, session: &Session) -> Result<(), QuintetError> {
        if session.is_persistent() {
            return Ok(());
        }
        let data = engine_to_bytes(session.engine())?;
        std::fs::write(&self.path, &data)
            .map_err(|e| QuintetError::IoError(format!("Write db: {}", e)))
    }
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

/// Parse a subject argument: JSON notation when it parses, a symbol name
/// otherwise.
pub fn parse_subject(text: &str) -> Result<SubjectJson, QuintetError> {
    let subject = serde_json::from_str::<SubjectJson>(text)
        .unwrap_or_else(|_| SubjectJson::Symbol(text.to_string()));
    subject.to_subject()?;
    Ok(subject)
}

/// Parse a value argument, with the same fallback as `parse_subject`.
pub fn parse_value(text: &str) -> Result<ValueJson, QuintetError> {
    let value = serde_json::from_str::<ValueJson>(text)
        .unwrap_or_else(|_| ValueJson::Subject(SubjectJson::Symbol(text.to_string())));
    value.to_value()?;
    Ok(value)
}

/// One statement or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatementsInput {
    Many(Vec<StatementJson>),
    One(StatementJson),
}

/// Parse a JSON statement document.
pub fn parse_statements(source: &[u8]) -> Result<AssertRequest, QuintetError> {
    let input: StatementsInput = serde_json::from_slice(source)
        .map_err(|e| QuintetError::InvalidStatement(format!("JSON: {}", e)))?;
    let statements = match input {
        StatementsInput::Many(statements) => statements,
        StatementsInput::One(statement) => vec![statement],
    };
    Ok(AssertRequest { statements })
}

fn reader_options(reader: Option<&str>) -> ReadOptions {
    ReadOptions {
        reader: reader.filter(|name| !name.is_empty()).map(Subject::symbol),
        ..ReadOptions::default()
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(store: &Store, server: ServerConfig) -> Result<(), QuintetError> {
    let session = store.open()?;

    println!("Quintet Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", server.host);
    println!("  Port:     {}", server.port);
    println!("  Backend:  {}", store.backend.name());
    println!("  Database: {:?}", store.path);
    println!("  Tick:     {} ms", server.tick_ms);
    println!();
    println!("Endpoints:");
    println!("  POST   /facts              - Append statements");
    println!("  POST   /facts/retract      - Withdraw values");
    println!("  POST   /query              - Query a subject");
    println!("  POST   /explain            - Explain an evaluation");
    println!("  POST   /subscriptions      - Register a trigger");
    println!("  DELETE /subscriptions/{{id}} - Remove a trigger");
    println!("  GET    /firings            - Drain trigger firings");
    println!("  GET    /status             - Store counters");
    println!("  GET    /export             - Canonical export");
    println!("  GET    /health             - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let persistent = session.is_persistent();
    if !persistent {
        tracing::warn!("File backend: writes made through the server are saved on shutdown");
    }
    let state = api::AppState::with_config(session, server);
    let served = api::run_server(state.clone()).await;
    if !persistent {
        store.save(&*state.session.read().await)?;
    }
    served
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store counters.
pub fn cmd_status(store: &Store, json: bool) -> Result<(), QuintetError> {
    let session = store.open()?;
    let status = StatusResponse::from(session.engine().status());

    if json {
        print_json(&serde_json::json!({
            "database": store.path.to_string_lossy(),
            "backend": store.backend.name(),
            "status": status,
        }));
        return Ok(());
    }

    println!("Quintet Status");
    println!("==============");
    println!("Database: {:?}", store.path);
    println!("Backend:  {}", store.backend.name());
    println!();
    println!("Facts:         {}", status.facts);
    println!("Targets:       {}", status.targets);
    println!("Properties:    {}", status.properties);
    println!("Symbols:       {}", status.symbols);
    println!("Texts:         {}", status.texts);
    println!("Generated:     {}", status.generated);
    println!("Subscriptions: {}", status.subscriptions);
    println!("Now:           {}", status.now);

    Ok(())
}

// =============================================================================
// ASSERT / RETRACT COMMANDS
// =============================================================================

/// Append statements from a file or inline JSON.
pub fn cmd_assert(
    store: &Store,
    json: bool,
    file: Option<&Path>,
    statement: Option<&str>,
) -> Result<(), QuintetError> {
    let request = match (file, statement) {
        (Some(file), _) => {
            let validated = validate_file_path(file)?;
            validate_file_size(&validated, MAX_STATEMENT_FILE_SIZE)?;
            let contents = std::fs::read(&validated)
                .map_err(|e| QuintetError::IoError(format!("Read file: {}", e)))?;
            parse_statements(&contents)?
        }
        (None, Some(inline)) => parse_statements(inline.as_bytes())?,
        (None, None) => {
            return Err(QuintetError::InvalidStatement(
                "Provide --file or --statement".to_string(),
            ));
        }
    };
    let statements = request.to_statements()?;
    tracing::info!(count = statements.len(), "asserting statements");

    let mut session = store.open()?;
    let result = session.assert_batch(statements);
    // A rejected batch may have appended the statements before it.
    store.save(&session)?;
    let ids = result?;

    if json {
        print_json(&api::AssertResponse::success(ids.iter().map(|id| id.0).collect()));
    } else {
        println!("Appended {} facts", ids.len());
        println!("Store now has {} facts", session.engine().status().facts);
    }
    Ok(())
}

/// Append a tombstone.
pub fn cmd_retract(
    store: &Store,
    json: bool,
    target: &str,
    property: &str,
    value: Option<&str>,
) -> Result<(), QuintetError> {
    let request = api::RetractRequest {
        target: parse_subject(target)?,
        property: parse_subject(property)?,
        value: value.map(parse_value).transpose()?,
    };
    let (target, property, value) = request.to_parts()?;

    let mut session = store.open()?;
    let id = session.retract(target, property, value)?;
    store.save(&session)?;

    if json {
        print_json(&api::RetractResponse::success(id.0));
    } else {
        println!("Retracted as fact {}", id.0);
    }
    Ok(())
}

// =============================================================================
// QUERY / EXPLAIN COMMANDS
// =============================================================================

fn print_facts(response: &QueryResponse) {
    for fact in &response.facts {
        let shown = match (&fact.value, &fact.pattern, &fact.error) {
            (Some(value), _, _) => serde_json::to_string(value).unwrap_or_default(),
            (_, Some(pattern), _) => pattern.clone(),
            (_, _, Some(error)) => format!("<error {}: {}>", error.kind, error.message),
            _ => String::new(),
        };
        println!(
            "  #{} {}/{} {} {}",
            fact.fact,
            serde_json::to_string(&fact.target).unwrap_or_default(),
            serde_json::to_string(&fact.property).unwrap_or_default(),
            fact.operator,
            shown
        );
    }
}

/// Run a query.
pub fn cmd_query(
    store: &Store,
    json: bool,
    request: &QueryRequest,
    reader: Option<&str>,
) -> Result<(), QuintetError> {
    let session = store.open()?;
    let options = ReadOptions {
        force: request.force,
        all: request.all,
        as_of: request.as_of.map(quintet_core::Timestamp),
        include_system_meta: request.include_system_meta,
        ..reader_options(reader)
    };
    let response = api::execute_query(&session, request, options)?;

    if json {
        print_json(&response);
        return Ok(());
    }

    if !response.found {
        println!("No results");
        return Ok(());
    }
    if !response.targets.is_empty() {
        println!("Targets ({}):", response.targets.len());
        for target in &response.targets {
            println!("  {}", serde_json::to_string(target).unwrap_or_default());
        }
    }
    println!("Facts ({}):", response.facts.len());
    print_facts(&response);
    Ok(())
}

/// Explain an evaluation.
pub fn cmd_explain(
    store: &Store,
    json: bool,
    subject: &str,
    reader: Option<&str>,
) -> Result<(), QuintetError> {
    let session = store.open()?;
    let subject = parse_subject(subject)?.to_subject()?;
    let explanation = session.engine().explain(&subject, reader_options(reader))?;

    if json {
        print_json(&ExplainResponse::success(&explanation));
        return Ok(());
    }

    println!("Requirements of {}:", subject);
    for requirement in &explanation.requirements {
        println!("  {}", requirement);
    }
    println!();
    println!("Trace:");
    for event in &explanation.events {
        println!("  {:?}", event);
    }
    println!();
    let accepted: Vec<String> = explanation
        .accepted()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Accepted: {}", accepted.join(", "));
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT COMMANDS
// =============================================================================

/// Export the log.
pub fn cmd_export(store: &Store, output: &Path, format: &str) -> Result<(), QuintetError> {
    let validated_output = validate_output_path(output)?;
    let session = store.open()?;
    let engine = session.engine();

    let data = match format {
        "canonical" => {
            let data = export_canonical(engine)?;
            println!("Checksum: {}", canonical_checksum(engine)?);
            data
        }
        "json" => {
            let facts: Vec<FactJson> = engine.store().facts().iter().map(FactJson::from).collect();
            serde_json::to_vec_pretty(&facts)
                .map_err(|e| QuintetError::SerializationError(e.to_string()))?
        }
        _ => {
            return Err(QuintetError::SerializationError(format!(
                "Unknown format: {}. Use: canonical, json",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| QuintetError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Import a canonical export, replacing the file database.
pub fn cmd_import(store: &Store, input: &Path) -> Result<(), QuintetError> {
    if store.backend == Backend::Redb {
        return Err(QuintetError::SerializationError(
            "Import to redb not supported. Use the file backend.".to_string(),
        ));
    }

    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;
    let data = std::fs::read(&validated_path)
        .map_err(|e| QuintetError::IoError(format!("Read file: {}", e)))?;

    let session = Session::with_engine(import_canonical(&data, store.engine.clone())?);
    store.save(&session)?;

    println!("Imported {} facts", session.engine().status().facts);
    Ok(())
}

// =============================================================================
// INIT / HASH COMMANDS
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(store: &Store, force: bool) -> Result<(), QuintetError> {
    if store.path.exists() {
        if !force {
            return Err(QuintetError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&store.path)
            .map_err(|e| QuintetError::IoError(format!("Remove db: {}", e)))?;
    }

    let session = store.open()?;
    store.save(&session)?;
    println!(
        "Initialized new {} database at {:?}",
        store.backend.name(),
        store.path
    );
    Ok(())
}

/// Print the BLAKE3 hash and checksum of the canonical export.
pub fn cmd_hash(store: &Store, json: bool) -> Result<(), QuintetError> {
    let session = store.open()?;
    let engine = session.engine();
    let hash = compute_blake3_hash(&export_canonical(engine)?);
    let checksum = canonical_checksum(engine)?;
    let facts = engine.status().facts;

    if json {
        print_json(&serde_json::json!({
            "hash": hash,
            "algorithm": "blake3",
            "checksum": checksum,
            "facts": facts,
        }));
    } else {
        println!("BLAKE3:   {}", hash);
        println!("Checksum: {}", checksum);
        println!("Facts:    {}", facts);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
