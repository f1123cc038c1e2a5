use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::config::Task;
use crate::contexts::ModelSelection;
use crate::error::{PipelineError, Result};

/// One registry entry: either a bare model name or an object naming the
/// model and, optionally, its fallback.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ModelEntry {
    Name(String),
    Detailed {
        model: Option<String>,
        fallback: Option<String>,
    },
}

/// File-backed task-to-model registry.
/// Loads the mapping from a YAML file keyed by task name.
#[derive(Clone, Debug)]
pub struct ModelRegistry {
    registry_path: PathBuf,
    defaults: ModelSelection,
}

impl ModelRegistry {
    /// Creates a new ModelRegistry
    ///
    /// # Arguments
    /// * `registry_path` - Path to the registry file (a missing file is an empty registry)
    /// * `defaults` - Models used for any task or field the registry does not name
    pub fn new(registry_path: impl Into<PathBuf>, defaults: ModelSelection) -> Self {
        Self {
            registry_path: registry_path.into(),
            defaults,
        }
    }

    fn load_registry(&self) -> Result<HashMap<String, ModelEntry>> {
        if !self.registry_path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.registry_path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read model registry {}: {}",
                self.registry_path.display(),
                e
            ))
        })?;

        parse_registry(&content)
    }

    /// Models for `task`. An explicit override replaces the primary model;
    /// otherwise the registry entry applies, then the defaults.
    pub fn selection_for(&self, task: Task, model_override: Option<&str>) -> Result<ModelSelection> {
        let registry = self.load_registry()?;
        let mut selection = self.defaults.clone();

        match registry.get(task.registry_key()) {
            Some(ModelEntry::Name(model)) => selection.primary = model.clone(),
            Some(ModelEntry::Detailed { model, fallback }) => {
                if let Some(model) = model {
                    selection.primary = model.clone();
                }
                if let Some(fallback) = fallback {
                    selection.fallback = fallback.clone();
                }
            }
            None => {}
        }

        if let Some(model) = model_override {
            selection.primary = model.to_string();
        }

        Ok(selection)
    }
}

/// Parses the YAML registry file into a HashMap.
/// Supports both the short format (string) and the long format (object with model and fallback).
fn parse_registry(yaml_content: &str) -> Result<HashMap<String, ModelEntry>> {
    let has_entries = yaml_content.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    });
    if !has_entries {
        return Ok(HashMap::new());
    }
    let registry: Option<HashMap<String, ModelEntry>> = serde_yaml::from_str(yaml_content)?;
    Ok(registry.unwrap_or_default())
}
