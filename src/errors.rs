//! Typed error hierarchy for blj-web.
//!
//! Two top-level enums cover the two fallible subsystems:
//! - `ConfigError`: flat-file decoding, catalog lookups and the config store
//! - `LaunchError`: launch-command building, destructive restarts and sessions
//!
//! Validation outcomes are not errors in this sense; they are reported as a
//! [`crate::validation::ValidationFailure`] which `LaunchError` can wrap.

use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ValidationFailure;

/// Errors from the configuration document layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Malformed flat file at line {line_number}: {line:?}")]
    MalformedFlatFile { line_number: usize, line: String },

    #[error("Unknown module {id}")]
    UnknownModule { id: String },

    #[error("Module {id} is listed more than once")]
    DuplicateModule { id: String },

    #[error("Invalid module id {id:?}")]
    InvalidModuleId { id: String },

    #[error("Invalid parameter key {key:?}")]
    InvalidParamKey { key: String },

    #[error("Value of parameter {key} must be a single line")]
    MultiLineValue { key: String },

    #[error("Got {keys} parameter keys but {values} parameter values")]
    ParamLengthMismatch { keys: usize, values: usize },

    #[error("Invalid config name {name:?}")]
    InvalidConfigName { name: String },

    #[error("Config {name} not found")]
    ConfigNotFound { name: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from building and starting a pipeline launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("No config file name available for this launch")]
    MissingConfigFileName,

    #[error("Refusing to delete protected path {path}")]
    DestructiveDeleteRefused { path: PathBuf },

    #[error("Failed to erase {path}: {source}")]
    EraseFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {program}: {message}")]
    ProcessSpawnFailure { program: String, message: String },

    #[error("A launch is already in progress for run {run_id}")]
    SessionBusy { run_id: String },

    #[error("Restart path is required for {action}")]
    MissingRestartPath { action: String },

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationKind;

    #[test]
    fn config_error_malformed_carries_line() {
        let err = ConfigError::MalformedFlatFile {
            line_number: 3,
            line: "garbage".to_string(),
        };
        match &err {
            ConfigError::MalformedFlatFile { line_number, line } => {
                assert_eq!(*line_number, 3);
                assert_eq!(line, "garbage");
            }
            _ => panic!("Expected MalformedFlatFile"),
        }
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn config_error_read_failed_carries_path() {
        let path = PathBuf::from("/config/gui/demo.properties");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::ReadFailed {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            ConfigError::ReadFailed { path: p, source } => {
                assert_eq!(p, &path);
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected ReadFailed"),
        }
    }

    #[test]
    fn launch_error_converts_from_validation_failure() {
        let failure = ValidationFailure::missing_parameter(None, "input.dirPaths");
        let err: LaunchError = failure.into();
        match &err {
            LaunchError::Validation(f) => {
                assert_eq!(f.kind, ValidationKind::MissingRequiredParameter);
                assert_eq!(f.offending_parameter.as_deref(), Some("input.dirPaths"));
            }
            _ => panic!("Expected LaunchError::Validation"),
        }
    }

    #[test]
    fn launch_error_converts_from_config_error() {
        let err: LaunchError = ConfigError::UnknownModule { id: "x".into() }.into();
        assert!(matches!(
            err,
            LaunchError::Config(ConfigError::UnknownModule { .. })
        ));
    }

    #[test]
    fn destructive_delete_refused_names_path() {
        let err = LaunchError::DestructiveDeleteRefused {
            path: PathBuf::from("/"),
        };
        assert_eq!(err.to_string(), "Refusing to delete protected path /");
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ConfigError::DuplicateModule { id: "m".into() });
        assert_std_error(&LaunchError::MissingConfigFileName);
    }
}
