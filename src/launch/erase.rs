//! Guarded recursive delete used by erase-then-restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::errors::LaunchError;

/// Refuses to delete the filesystem root, any protected directory, or
/// anything that contains one.
#[derive(Debug, Clone, Default)]
pub struct DeleteGuard {
    protected: Vec<PathBuf>,
}

impl DeleteGuard {
    pub fn new(protected: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            protected: protected.into_iter().collect(),
        }
    }

    /// Canonical target, or `None` when nothing exists at `target`.
    pub async fn check(&self, target: &Path) -> Result<Option<PathBuf>, LaunchError> {
        let resolved = match tokio::fs::canonicalize(target).await {
            Ok(p) => p,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LaunchError::EraseFailed {
                    path: target.to_path_buf(),
                    source,
                });
            }
        };

        if resolved.parent().is_none() || self.is_protected(&resolved).await {
            tracing::warn!(path = %resolved.display(), "Refusing destructive delete");
            return Err(LaunchError::DestructiveDeleteRefused { path: resolved });
        }
        Ok(Some(resolved))
    }

    async fn is_protected(&self, resolved: &Path) -> bool {
        for dir in &self.protected {
            let dir = tokio::fs::canonicalize(dir)
                .await
                .unwrap_or_else(|_| dir.clone());
            if dir.starts_with(resolved) {
                return true;
            }
        }
        false
    }

    /// Remove `target` and everything under it.
    pub async fn erase(&self, target: &Path) -> Result<(), LaunchError> {
        let Some(resolved) = self.check(target).await? else {
            tracing::debug!(path = %target.display(), "Nothing to erase");
            return Ok(());
        };

        let is_dir = tokio::fs::metadata(&resolved)
            .await
            .is_ok_and(|m| m.is_dir());
        let result = if is_dir {
            tokio::fs::remove_dir_all(&resolved).await
        } else {
            tokio::fs::remove_file(&resolved).await
        };
        match result {
            Ok(()) => {
                tracing::info!(path = %resolved.display(), "Erased pipeline directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LaunchError::EraseFailed {
                path: resolved,
                source,
            }),
        }
    }
}
