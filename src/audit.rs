//! Audit trail sink for handoffs.
//!
//! The bus writes handoff records to an external memory/knowledge store as
//! named entities with free-text observations. The store is advisory: the
//! bus stays correct when it is unavailable, so failures here surface as
//! warnings, never as handoff failures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The two operations the bus needs from a memory/knowledge store.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Create a named entity with a type tag and initial observations.
    async fn create_entity(
        &self,
        name: &str,
        entity_type: &str,
        observations: Vec<String>,
    ) -> Result<()>;

    /// Append observations to an existing entity.
    async fn append_observations(&self, name: &str, observations: Vec<String>) -> Result<()>;
}

/// Sink that records nothing. Default for tests and embedders without a
/// knowledge store.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn create_entity(&self, _: &str, _: &str, _: Vec<String>) -> Result<()> {
        Ok(())
    }

    async fn append_observations(&self, _: &str, _: Vec<String>) -> Result<()> {
        Ok(())
    }
}

/// A stored audit entity.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuditEntity {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File-backed audit store: one JSON file per entity under a base directory.
#[derive(Debug)]
pub struct FileAuditSink {
    base_dir: PathBuf,
    // Serializes writers to the same entity file.
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    /// Create a sink rooted at `base_dir` (created on demand).
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().join("entities"),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a sink at the default per-user data location.
    pub fn default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("dev", "agentwire", "agentwire")
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        Ok(Self::new(dirs.data_dir().join("audit")))
    }

    fn entity_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{}.json", safe))
    }

    fn load(&self, name: &str) -> Result<Option<AuditEntity>> {
        let path = self.entity_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, entity: &AuditEntity) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.entity_path(&entity.name);
        let content = serde_json::to_string_pretty(entity)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Read back an entity, for inspection and tests.
    pub fn get_entity(&self, name: &str) -> Result<Option<AuditEntity>> {
        self.load(name)
    }

    /// Count stored entities by type.
    pub fn entity_counts(&self) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        if !self.base_dir.exists() {
            return Ok(counts);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "json") {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    if let Ok(entity) = serde_json::from_str::<AuditEntity>(&content) {
                        *counts.entry(entity.entity_type).or_insert(0) += 1;
                    }
                }
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn create_entity(
        &self,
        name: &str,
        entity_type: &str,
        observations: Vec<String>,
    ) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Audit("audit write lock poisoned".to_string()))?;

        // Creating an existing entity folds the new observations in rather
        // than clobbering history.
        let entity = match self.load(name)? {
            Some(mut existing) => {
                existing.observations.extend(observations);
                existing.updated_at = Utc::now();
                existing
            }
            None => {
                let now = Utc::now();
                AuditEntity {
                    name: name.to_string(),
                    entity_type: entity_type.to_string(),
                    observations,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        self.save(&entity)?;
        tracing::debug!("Audit entity saved: {}", name);
        Ok(())
    }

    async fn append_observations(&self, name: &str, observations: Vec<String>) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Audit("audit write lock poisoned".to_string()))?;

        let mut entity = self
            .load(name)?
            .ok_or_else(|| Error::Audit(format!("Entity not found: {}", name)))?;
        entity.observations.extend(observations);
        entity.updated_at = Utc::now();
        self.save(&entity)?;
        Ok(())
    }
}
