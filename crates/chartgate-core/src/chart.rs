//! Chart definition and loading

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::archive::read_metadata_from_archive;
use crate::error::{CoreError, Result};

/// Chart metadata file name
pub const CHART_FILE: &str = "Chart.yaml";

/// Legacy (apiVersion v1) dependency file name
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";

/// Contents of a `Chart.yaml`
///
/// Only the fields chartgate reads or rewrites are typed. Everything else is
/// kept in `extra` so that a repackaged chart carries the original metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (v1 or v2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Chart name (required)
    #[serde(default, deserialize_with = "scalar::string")]
    pub name: String,

    /// Chart version (required)
    #[serde(default, deserialize_with = "scalar::string")]
    pub version: String,

    /// Application version
    #[serde(
        default,
        deserialize_with = "scalar::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_version: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Dependencies (apiVersion v2 charts)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,

    /// Remaining fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ChartMetadata {
    /// Parse and validate a `Chart.yaml` document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let metadata: Self = serde_yaml::from_str(yaml)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Parse from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| CoreError::InvalidChart {
            message: format!("Chart.yaml is not valid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.version.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "version".to_string(),
            });
        }
        Ok(())
    }
}

/// A dependency declared in `Chart.yaml` or `requirements.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartDependency {
    /// Chart name in the dependency repository
    pub name: String,

    /// Version constraint
    #[serde(default, deserialize_with = "scalar::string")]
    pub version: String,

    /// Repository URL, `@name`/`alias:name` reference, `file://` path, or empty
    #[serde(default)]
    pub repository: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Contents of a legacy `requirements.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<ChartDependency>,
}

/// Where a loaded chart came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    /// Unpacked chart directory
    Directory(PathBuf),
    /// Existing `.tgz` chart archive
    Archive(PathBuf),
}

/// A chart loaded from disk, ready to be overridden and packaged
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub metadata: ChartMetadata,
    pub source: ChartSource,
}

impl LoadedChart {
    /// Load a chart from a directory or an existing archive
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::ChartNotFound {
                path: path.display().to_string(),
            });
        }

        if path.is_dir() {
            let metadata = read_chart_file(path)?;
            tracing::debug!(chart = %metadata.name, version = %metadata.version, "loaded chart directory");
            Ok(Self {
                metadata,
                source: ChartSource::Directory(path.to_path_buf()),
            })
        } else {
            let metadata = read_metadata_from_archive(path)?;
            tracing::debug!(chart = %metadata.name, version = %metadata.version, "loaded chart archive");
            Ok(Self {
                metadata,
                source: ChartSource::Archive(path.to_path_buf()),
            })
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Override the chart version. No semver validation is applied.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.metadata.version = version.into();
    }

    /// Override the application version
    pub fn set_app_version(&mut self, app_version: impl Into<String>) {
        self.metadata.app_version = Some(app_version.into());
    }
}

/// Check that `path` is a chart directory with a usable `Chart.yaml`
pub fn is_chart_dir(path: &Path) -> Result<ChartMetadata> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return Err(CoreError::InvalidChartDir {
            path: path.display().to_string(),
            message: "not a directory".to_string(),
        });
    }
    if !path.join(CHART_FILE).exists() {
        return Err(CoreError::InvalidChartDir {
            path: path.display().to_string(),
            message: format!("no {} exists in directory", CHART_FILE),
        });
    }
    read_chart_file(path)
}

/// Read the dependencies declared in a legacy `requirements.yaml`
///
/// A missing file means no dependencies.
pub fn load_requirements(chart_dir: &Path) -> Result<Vec<ChartDependency>> {
    let path = chart_dir.join(REQUIREMENTS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let requirements: Requirements = serde_yaml::from_str(&content)?;
    Ok(requirements.dependencies)
}

fn read_chart_file(dir: &Path) -> Result<ChartMetadata> {
    let content = std::fs::read_to_string(dir.join(CHART_FILE)).map_err(|e| {
        CoreError::InvalidChartDir {
            path: dir.display().to_string(),
            message: format!("cannot read {}: {}", CHART_FILE, e),
        }
    })?;
    ChartMetadata::from_yaml(&content)
}

/// YAML scalars that should be read as strings (`version: 1.0`, `appVersion: 2`)
mod scalar {
    use super::*;
    use serde::de::Error;
    use serde_yaml::Value;

    fn stringify<E: Error>(value: Value) -> std::result::Result<Option<String>, E> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            other => Err(E::custom(format!("expected a scalar, found {:?}", other))),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
        Ok(stringify(Value::deserialize(d)?)?.unwrap_or_default())
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<String>, D::Error> {
        stringify(Value::deserialize(d)?)
    }
}
