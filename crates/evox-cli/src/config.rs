use evox_fleet::{AutoscaleConfig, DispatchConfig, RoleTemplate, RoleTemplates, ScheduleConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `evox.toml`. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct EvoxConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub autoscale: AutoscaleConfig,
    /// Overrides and additions to the built-in role templates.
    #[serde(default)]
    pub templates: Vec<RoleTemplate>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Default for EvoxConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dispatch: DispatchConfig::default(),
            autoscale: AutoscaleConfig::default(),
            templates: Vec::new(),
            schedule: ScheduleConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl EvoxConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        };
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Built-in templates with the configured ones layered on top.
    pub fn role_templates(&self) -> RoleTemplates {
        self.templates
            .iter()
            .cloned()
            .fold(RoleTemplates::builtin(), |table, mut template| {
                template.name_prefix = template.name_prefix.to_uppercase();
                table.with_template(template)
            })
    }

    /// Snapshot file backing the store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("evox.json")
    }

    pub fn standup_dir(&self) -> PathBuf {
        self.data_dir.join("standups")
    }
}
