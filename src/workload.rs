use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{BindCommand, CommandSpec};
use crate::database::Backend;
use crate::error::{ConfigError, ConfigResult};
use crate::params::FakerRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupFrequency {
    #[default]
    #[serde(alias = "never", alias = "NEVER")]
    Never,
    #[serde(alias = "once", alias = "ONCE")]
    Once,
    #[serde(alias = "always", alias = "ALWAYS")]
    Always,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkload {
    #[serde(rename = "type")]
    backend: Backend,
    #[serde(default)]
    startup_frequency: Option<StartupFrequency>,
    #[serde(default, rename = "runStartUp")]
    run_startup: Option<bool>,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(rename = "taskName")]
    name: String,
    #[serde(rename = "taskWeight", default = "default_weight")]
    weight: u64,
    command: serde_json::Value,
}

fn default_weight() -> u64 {
    1
}

/// One named, weighted operation template.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub weight: u64,
    pub command: CommandSpec,
}

impl Task {
    pub fn batch_size(&self) -> usize {
        self.command.batch_size()
    }
}

/// A validated workload. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Workload {
    pub name: String,
    pub backend: Backend,
    pub startup_frequency: StartupFrequency,
    pub tasks: Vec<Task>,
}

impl Workload {
    /// Parses a workload from JSON text.
    pub fn from_json(name: &str, text: &str, faker: &FakerRegistry) -> ConfigResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse {
                path: PathBuf::from(name),
                message: e.to_string(),
            })?;
        Self::from_value(name, value, faker)
    }

    /// Parses a workload from TOML text.
    pub fn from_toml(name: &str, text: &str, faker: &FakerRegistry) -> ConfigResult<Self> {
        let parsed: toml::Value = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from(name),
            message: e.to_string(),
        })?;
        let value = serde_json::to_value(parsed).map_err(|e| ConfigError::Parse {
            path: PathBuf::from(name),
            message: e.to_string(),
        })?;
        Self::from_value(name, value, faker)
    }

    /// Parses a workload from YAML text.
    pub fn from_yaml(name: &str, text: &str, faker: &FakerRegistry) -> ConfigResult<Self> {
        let value: serde_json::Value = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from(name),
            message: e.to_string(),
        })?;
        Self::from_value(name, value, faker)
    }

    pub fn from_value(
        name: &str,
        value: serde_json::Value,
        faker: &FakerRegistry,
    ) -> ConfigResult<Self> {
        let raw: RawWorkload = serde_json::from_value(value).map_err(|e| ConfigError::Parse {
            path: PathBuf::from(name),
            message: e.to_string(),
        })?;

        let startup_frequency = match (raw.startup_frequency, raw.run_startup) {
            (Some(frequency), _) => frequency,
            (None, Some(true)) => StartupFrequency::Once,
            (None, _) => StartupFrequency::Never,
        };

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(raw.tasks.len());
        for raw_task in raw.tasks {
            let task_name = raw_task.name.trim().to_string();
            if !seen.insert(task_name.clone()) {
                return Err(ConfigError::DuplicateTask(task_name));
            }
            if raw_task.weight == 0 {
                warn!(workload = name, task = %task_name, "task has zero weight and will never run");
            }
            let command = CommandSpec::compile(raw.backend, &task_name, raw_task.command, faker)?;
            tasks.push(Task {
                name: task_name,
                weight: raw_task.weight,
                command,
            });
        }

        if tasks.iter().all(|t| t.weight == 0) {
            return Err(ConfigError::NoSelectableTasks);
        }

        Ok(Self {
            name: name.to_string(),
            backend: raw.backend,
            startup_frequency,
            tasks,
        })
    }

    /// Loads a `.json`, `.yaml`/`.yml` or `.toml` workload file, named by its
    /// file stem.
    pub fn load(path: &Path, faker: &FakerRegistry) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("workload")
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let workload = match extension.as_deref() {
            Some("json") => Self::from_json(&name, &text, faker),
            Some("yaml") | Some("yml") => Self::from_yaml(&name, &text, faker),
            Some("toml") => Self::from_toml(&name, &text, faker),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
        .map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        info!(
            workload = %workload.name,
            backend = %workload.backend,
            tasks = workload.tasks.len(),
            "loaded workload"
        );
        Ok(workload)
    }

    /// Loads every workload file in `dir`, sorted by file name. Files with
    /// other extensions are ignored.
    pub fn load_dir(dir: &Path, faker: &FakerRegistry) -> ConfigResult<Vec<Self>> {
        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(str::to_ascii_lowercase)
                        .as_deref(),
                    Some("json") | Some("yaml") | Some("yml") | Some("toml")
                )
            })
            .collect();
        paths.sort();
        paths.iter().map(|p| Self::load(p, faker)).collect()
    }

    /// Path of this workload's startup script inside `dir`.
    pub fn startup_script_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!(
            "{}_startup.{}",
            self.name,
            self.backend.script_extension()
        ))
    }

    /// Reads the startup script if present. A missing script is logged and
    /// treated as nothing to run.
    pub fn load_startup_script(&self, dir: &Path) -> ConfigResult<Option<String>> {
        let path = self.startup_script_path(dir);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(workload = %self.name, path = %path.display(), "startup script not found");
                Ok(None)
            }
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
