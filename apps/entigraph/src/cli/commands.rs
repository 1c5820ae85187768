//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::PassArg;
use crate::config::AppConfig;
use entigraph_core::{
    BootstrapReport, CollectionKey, EntigraphError, GarbageCollector, GcPass, GcReport,
    PersistenceRuntime, RedbStorage, Session, SessionStatus, WriteReport,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum payload file size for ingestion (100 MB).
const MAX_INGEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), EntigraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| EntigraphError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(EntigraphError::InvalidConfig(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, EntigraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        EntigraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(EntigraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, EntigraphError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        EntigraphError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(EntigraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| EntigraphError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl serde::Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// STORE LIFECYCLE
// =============================================================================

/// A bootstrapped store: restored session, its persistence runtime and GC.
pub struct Store {
    pub config: AppConfig,
    pub session: Session,
    pub runtime: PersistenceRuntime<RedbStorage>,
    pub gc: GarbageCollector,
    pub bootstrap: BootstrapReport,
}

impl Store {
    /// Write every pending change and release the database.
    pub fn close(mut self) -> Result<WriteReport, EntigraphError> {
        self.runtime.flush(&self.session)
    }
}

/// Load the configuration, open the database and restore the session.
pub fn open_store(config_path: &Path, db_path: &Path) -> Result<Store, EntigraphError> {
    let config = AppConfig::load(config_path)?;
    let registry = config.registry()?;
    let gc = config.garbage_collector(&registry)?;
    let mut session = Session::new(registry)?;

    let storage = RedbStorage::open(db_path)?;
    let mut runtime = PersistenceRuntime::new(storage, config.persist.clone())?;
    let bootstrap = runtime.bootstrap(&mut session, &gc)?;

    if let Some(reason) = &bootstrap.wiped {
        tracing::warn!(reason = ?reason, "stored data was discarded during bootstrap");
    }

    Ok(Store {
        config,
        session,
        runtime,
        gc,
        bootstrap,
    })
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty store and stamp its version.
pub fn cmd_init(config_path: &Path, db_path: &Path, force: bool) -> Result<(), EntigraphError> {
    if db_path.exists() {
        if !force {
            return Err(EntigraphError::InvalidConfig(format!(
                "Database '{}' already exists (use --force to replace it)",
                db_path.display()
            )));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| EntigraphError::IoError(format!("Remove db: {}", e)))?;
    }

    let store = open_store(config_path, db_path)?;
    let schemas = store.session.entities().registry().len();
    let namespace = store.config.persist.namespace.clone();
    let version = store.config.persist.version;
    store.close()?;

    println!("Initialized store at {:?}", db_path);
    println!("  Namespace: {}", namespace);
    println!("  Version:   {}", version);
    println!("  Schemas:   {}", schemas);
    Ok(())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// Where an ingested payload goes.
#[derive(Debug, Clone)]
pub struct IngestTarget {
    pub type_key: String,
    pub collection: Option<String>,
    pub group: Option<String>,
    pub append: bool,
    pub limit: u32,
}

/// Merge a payload file, optionally setting or appending a collection page.
pub fn cmd_ingest(
    config_path: &Path,
    db_path: &Path,
    json_mode: bool,
    file: &Path,
    target: &IngestTarget,
) -> Result<(), EntigraphError> {
    let file = validate_file_path(file)?;
    validate_file_size(&file, MAX_INGEST_FILE_SIZE)?;
    let text = std::fs::read_to_string(&file)
        .map_err(|e| EntigraphError::IoError(format!("Read payload: {}", e)))?;
    let payload: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| EntigraphError::DeserializationError(format!("Payload JSON: {}", e)))?;

    let mut store = open_store(config_path, db_path)?;
    let before = store.session.entities().len();

    let collection = match &target.collection {
        Some(name) => {
            let key = match &target.group {
                Some(group) => CollectionKey::grouped(name.clone(), group.clone()),
                None => CollectionKey::new(name.clone()),
            };
            let collection = if target.append {
                store.session.append_collection(
                    key.clone(),
                    &target.type_key,
                    target.limit,
                    &payload,
                )?
            } else {
                store
                    .session
                    .set_collection(key.clone(), &target.type_key, target.limit, &payload)?
            };
            Some(serde_json::json!({
                "key": key.to_string(),
                "items": collection.items().len(),
                "page_number": collection.page_number(),
                "has_no_more": collection.has_no_more(),
            }))
        }
        None => {
            let report = store.session.merge(&target.type_key, &payload)?;
            tracing::info!(
                type_key = %target.type_key,
                ids = report.ids.len(),
                written = report.written.len(),
                skipped = report.skipped,
                "payload merged"
            );
            None
        }
    };

    let after = store.session.entities().len();
    let write = store.close()?;

    if json_mode {
        print_json(&serde_json::json!({
            "file": file.to_string_lossy(),
            "type": target.type_key,
            "records_before": before,
            "records_after": after,
            "collection": collection,
            "written_channels": write.written,
        }));
        return Ok(());
    }

    println!("Ingested {:?} as '{}'", file, target.type_key);
    println!("  Records: {} -> {}", before, after);
    if let Some(collection) = collection {
        println!("  Collection: {}", collection);
    }
    println!("  Channels written: {:?}", write.written);
    Ok(())
}

// =============================================================================
// GC COMMAND
// =============================================================================

/// Run the selected GC passes, in graph, TTL, LRU order.
pub fn cmd_gc(
    config_path: &Path,
    db_path: &Path,
    json_mode: bool,
    pass: PassArg,
) -> Result<(), EntigraphError> {
    let passes: &[GcPass] = match pass {
        PassArg::Graph => &[GcPass::Graph],
        PassArg::Ttl => &[GcPass::Ttl],
        PassArg::Lru => &[GcPass::Lru],
        PassArg::All => &[GcPass::Graph, GcPass::Ttl, GcPass::Lru],
    };

    let mut store = open_store(config_path, db_path)?;
    let startup = store.bootstrap.gc.clone();
    let mut report = GcReport::default();
    for pass in passes {
        report.merge(store.gc.run(store.session.entities_mut(), *pass));
    }
    store.close()?;

    if json_mode {
        print_json(&serde_json::json!({
            "startup": startup,
            "passes": passes.iter().map(GcPass::name).collect::<Vec<_>>(),
            "removed": report,
        }));
        return Ok(());
    }

    println!("Garbage Collection");
    println!("==================");
    println!("Evicted at startup: {}", startup.total());
    println!("Evicted by passes:  {}", report.total());
    for (type_key, ids) in &report.removed {
        println!("  {:<16} {}", type_key.as_str(), ids.len());
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store size, graph shape and bucket pressure.
pub fn cmd_status(config_path: &Path, db_path: &Path, json_mode: bool) -> Result<(), EntigraphError> {
    let store = open_store(config_path, db_path)?;
    let status = SessionStatus::from_session(&store.session, store.gc.config());
    let namespace = store.config.persist.namespace.clone();
    store.close()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": db_path.to_string_lossy(),
            "namespace": namespace,
            "status": status,
        }));
        return Ok(());
    }

    let metrics = &status.snapshot;
    println!("entigraph Store Status");
    println!("======================");
    println!("Database:  {:?}", db_path);
    println!("Namespace: {}", namespace);
    println!();
    println!("Records:      {}", metrics.record_count);
    println!("References:   {}", metrics.edge_count);
    println!(
        "Density:      {} per thousand",
        metrics.density_per_thousand
    );
    println!(
        "Nodes:        {} root, {} internal, {} leaf, {} isolated",
        metrics.roots, metrics.internal, metrics.leaves, metrics.isolated
    );
    println!("Collections:  {}", status.collections);
    println!("State fields: {}", status.state_fields);
    println!();
    for (type_key, pressure) in &status.pressure {
        let marker = if pressure.is_over() { " (over limit)" } else { "" };
        println!(
            "  {:<16} {:>6} / {:<6} {:>3}%{}",
            type_key.as_str(),
            pressure.records,
            pressure.max,
            pressure.percent,
            marker
        );
    }
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write the JSON wire snapshot of the entity store.
pub fn cmd_export(config_path: &Path, db_path: &Path, output: &Path) -> Result<(), EntigraphError> {
    let output = validate_output_path(output)?;
    let store = open_store(config_path, db_path)?;
    let snapshot = store.session.entities().snapshot().to_json();
    let records = store.session.entities().len();
    store.close()?;

    let data = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| EntigraphError::SerializationError(e.to_string()))?;
    std::fs::write(&output, &data)
        .map_err(|e| EntigraphError::IoError(format!("Write export: {}", e)))?;

    println!("Exported {} records to {:?}", records, output);
    Ok(())
}

// =============================================================================
// WATCH COMMAND
// =============================================================================

/// Run TTL and LRU passes on an interval, persisting through the throttled
/// observer, until Ctrl+C. A write deferred by the throttle goes out as soon
/// as its window is over.
pub async fn cmd_watch(
    config_path: &Path,
    db_path: &Path,
    interval: Option<u64>,
) -> Result<(), EntigraphError> {
    let mut store = open_store(config_path, db_path)?;
    let secs = interval
        .unwrap_or(store.config.maintenance.interval_secs)
        .max(1);

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    // The first tick completes immediately; startup GC already ran.
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(interval_secs = secs, db = ?db_path, "maintenance loop started");
    loop {
        let deferred_ms = store
            .runtime
            .due_at()
            .map_or(0, |due| due.saturating_sub(store.session.entities().now()));
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(deferred_ms)),
                if store.runtime.has_pending() => {
                if let Some(write) = store.runtime.flush_if_due(&store.session)? {
                    tracing::debug!(written = ?write.written, "deferred write");
                }
            }
            _ = ticker.tick() => {
                let mut report = store.gc.process_ttl(store.session.entities_mut());
                report.merge(store.gc.process_lru(store.session.entities_mut()));
                if let Some(write) = store.runtime.observe(&store.session)? {
                    tracing::debug!(written = ?write.written, "maintenance write");
                }
                tracing::debug!(evicted = report.total(), "maintenance tick");
            }
            signal = &mut shutdown => {
                signal.map_err(|e| EntigraphError::IoError(format!("Signal handler: {}", e)))?;
                break;
            }
        }
    }

    let write = store.close()?;
    tracing::info!(written = ?write.written, "maintenance loop stopped");
    Ok(())
}
