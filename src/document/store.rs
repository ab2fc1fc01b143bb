//! Flat files in the configuration directory.

use std::path::{Path, PathBuf};

use super::{CONFIG_EXTENSION, ConfigDocument, flat_file, stem, with_extension};
use crate::catalog::ModuleCatalog;
use crate::errors::ConfigError;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Normalized file name for `name`. Anything that could escape the
    /// configuration directory is rejected.
    pub fn file_name(name: &str) -> Result<String, ConfigError> {
        let name = name.trim();
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(ConfigError::InvalidConfigName {
                name: name.to_string(),
            });
        }
        Ok(with_extension(name))
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, ConfigError> {
        Ok(self.dir.join(Self::file_name(name)?))
    }

    /// Write `doc` under its source name and return the absolute path.
    pub async fn save(&self, doc: &ConfigDocument) -> Result<PathBuf, ConfigError> {
        let path = self.path_for(doc.source_name())?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ConfigError::WriteFailed {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, flat_file::encode(doc))
            .await
            .map_err(|source| ConfigError::WriteFailed {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Saved config");
        Ok(std::path::absolute(&path).unwrap_or(path))
    }

    /// Read and decode a stored config. Modules missing from `catalog` are rejected.
    pub async fn load(
        &self,
        name: &str,
        catalog: &ModuleCatalog,
    ) -> Result<ConfigDocument, ConfigError> {
        let file_name = Self::file_name(name)?;
        let path = self.dir.join(&file_name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::ConfigNotFound {
                    name: stem(&file_name).to_string(),
                });
            }
            Err(source) => return Err(ConfigError::ReadFailed { path, source }),
        };
        let doc = flat_file::decode(&file_name, &text)?;
        catalog.check_known(&doc)?;
        Ok(doc)
    }

    /// Stems of every stored config, sorted. A missing directory lists nothing.
    pub async fn list(&self) -> Result<Vec<String>, ConfigError> {
        let read_failed = |source| ConfigError::ReadFailed {
            path: self.dir.clone(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_failed(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION)
                && path.is_file()
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
