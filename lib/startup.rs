use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::engine::{EngineError, RecordEngine};

const BACKPRESSURE_DATABASE_TYPE: &str = "postgresql";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("engine introspection failed during {operation}: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: EngineError,
    },
    #[error("engine returned malformed {operation} document: {source}")]
    Malformed {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("introspection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LicenseInfo {
    #[serde(default)]
    pub customer: String,
    #[serde(default, rename = "licenseType")]
    pub license_type: String,
    #[serde(default, rename = "recordLimit")]
    pub record_limit: i64,
    #[serde(default, rename = "expireDate")]
    pub expire_date: String,
    #[serde(default)]
    pub contract: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    #[serde(default, rename = "VERSION")]
    pub version: String,
    #[serde(default, rename = "BUILD_DATE")]
    pub build_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigEntry {
    #[serde(rename = "CONFIG_ID")]
    pub config_id: i64,
    #[serde(default, rename = "CONFIG_COMMENTS")]
    pub comments: String,
    #[serde(default, rename = "SYS_CREATE_DT")]
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct ConfigList {
    #[serde(default, rename = "CONFIGS")]
    configs: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DatabaseDetail {
    #[serde(default, rename = "Type")]
    pub database_type: String,
    #[serde(default, rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DatabaseInfo {
    #[serde(default, rename = "Hybrid Mode")]
    pub hybrid_mode: bool,
    #[serde(default, rename = "Database Details")]
    pub databases: Vec<DatabaseDetail>,
}

/// Everything learned about the engine before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupInfo {
    pub license: LicenseInfo,
    pub version: VersionInfo,
    pub active_config_id: i64,
    /// The entry for `active_config_id`, if the engine listed it.
    pub active_config: Option<ConfigEntry>,
    pub database: DatabaseInfo,
}

impl StartupInfo {
    /// Backpressure is only needed when a database backend can fall behind the workers.
    pub fn requires_governor(&self) -> bool {
        self.database.databases.iter().any(|db| {
            db.database_type
                .eq_ignore_ascii_case(BACKPRESSURE_DATABASE_TYPE)
        })
    }
}

fn engine_call<T>(
    operation: &'static str,
    call: impl FnOnce() -> Result<T, EngineError>,
) -> Result<T, StartupError> {
    call().map_err(|source| StartupError::Engine { operation, source })
}

fn parse_document<T: for<'de> Deserialize<'de>>(
    operation: &'static str,
    raw: &str,
) -> Result<T, StartupError> {
    serde_json::from_str(raw).map_err(|source| StartupError::Malformed { operation, source })
}

fn introspect(engine: &dyn RecordEngine) -> Result<StartupInfo, StartupError> {
    let license = parse_document("license", &engine_call("license", || engine.license())?)?;
    let version = parse_document("version", &engine_call("version", || engine.version())?)?;
    let active_config_id = engine_call("getActiveConfigID", || engine.active_config_id())?;
    let configs: ConfigList =
        parse_document("getConfigList", &engine_call("getConfigList", || engine.config_list())?)?;
    let database = parse_document(
        "getDbInfo",
        &engine_call("getDbInfo", || engine.database_info())?,
    )?;

    let active_config = configs
        .configs
        .into_iter()
        .find(|entry| entry.config_id == active_config_id);

    Ok(StartupInfo {
        license,
        version,
        active_config_id,
        active_config,
        database,
    })
}

/// Runs the blocking introspection calls off the async runtime.
pub async fn gather_startup_info(
    engine: Arc<dyn RecordEngine>,
) -> Result<StartupInfo, StartupError> {
    tokio::task::spawn_blocking(move || introspect(engine.as_ref())).await?
}

pub fn log_startup_info(info: &StartupInfo) {
    let (config_comments, config_created) = info
        .active_config
        .as_ref()
        .map_or(("", ""), |config| {
            (config.comments.as_str(), config.created_at.as_str())
        });

    info!(
        event = "engine_version",
        engine_version = %info.version.version,
        engine_build_date = %info.version.build_date,
        active_config_id = info.active_config_id,
        config_comments,
        config_created,
        hybrid_mode = info.database.hybrid_mode,
        "Version & Configuration: engine {} ({}), config id {} ({}; created {}), hybrid mode {}",
        info.version.version,
        info.version.build_date,
        info.active_config_id,
        config_comments,
        config_created,
        info.database.hybrid_mode
    );
    for database in &info.database.databases {
        info!(
            event = "engine_database",
            database_type = %database.database_type,
            database_name = %database.name,
            "Database: {} - {}",
            database.database_type,
            database.name
        );
    }
    info!(
        event = "engine_license",
        customer = %info.license.customer,
        license_type = %info.license.license_type,
        record_limit = info.license.record_limit,
        expiration = %info.license.expire_date,
        contract = %info.license.contract,
        "License: {} ({}), record limit {}, expires {}, contract {}",
        info.license.customer,
        info.license.license_type,
        info.license.record_limit,
        info.license.expire_date,
        info.license.contract
    );
}
