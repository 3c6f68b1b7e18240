//! File-backed config source with SHA-256 change detection.
//!
//! [`FileSource`] implements [`ConfigSource`] for any supported file
//! format, chosen by extension when the source is opened. The file is
//! re-read on every [`has_changed`](ConfigSource::has_changed) poll, so
//! edits are picked up by the hot-reload loop without a restart.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{parse_config_str, sha256_hex};
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::CacheGateError;

/// Extensions this build can parse, paired with the source name reported in logs.
const FORMATS: &[(&str, &str)] = &[
    #[cfg(feature = "yaml")]
    ("yaml", "yaml"),
    #[cfg(feature = "yaml")]
    ("yml", "yaml"),
    #[cfg(feature = "json")]
    ("json", "json"),
    #[cfg(feature = "toml")]
    ("toml", "toml"),
];

#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    ext: &'static str,
    name: &'static str,
}

impl FileSource {
    /// Open a source for `path`, failing if its extension is not a format
    /// compiled into this build.
    pub fn open(path: &Path) -> Result<Self, CacheGateError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        FORMATS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|&(ext, name)| Self {
                path: path.to_path_buf(),
                ext,
                name,
            })
            .ok_or_else(|| CacheGateError::UnsupportedFormat(ext.to_string()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse `content` in this source's format without validating it.
    pub fn parse(&self, content: &str) -> Result<Config, CacheGateError> {
        parse_config_str(self.ext, content, &self.path.display().to_string())
    }

    async fn read_content(&self) -> Result<String, CacheGateError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheGateError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                CacheGateError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), CacheGateError> {
        let content = self.read_content().await?;
        let config = self.parse(&content)?;

        if let Err(errors) = validate(&config) {
            return Err(CacheGateError::ConfigValidation { errors });
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, CacheGateError> {
        let content = self.read_content().await?;
        let hash = sha256_hex(content.as_bytes());
        Ok(*current != ConfigVersion::Hash(hash))
    }
}
