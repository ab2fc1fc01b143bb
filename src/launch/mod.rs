//! Turning a validated configuration into the argv of the pipeline tool.

pub mod erase;

pub use erase::DeleteGuard;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::ConfigDocument;
use crate::errors::LaunchError;

pub const DEFAULT_PROGRAM: &str = "biolockj";
pub const DEFAULT_EXECUTION_FLAG: &str = "--docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchAction {
    #[default]
    LaunchNew,
    RestartFromCheckPoint,
    EraseThenRestart,
}

impl LaunchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LaunchNew => "launchNew",
            Self::RestartFromCheckPoint => "restartFromCheckPoint",
            Self::EraseThenRestart => "eraseThenRestart",
        }
    }

    /// Whether the action needs a restart directory.
    pub fn needs_restart_path(&self) -> bool {
        matches!(self, Self::RestartFromCheckPoint | Self::EraseThenRestart)
    }
}

impl std::fmt::Display for LaunchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaunchAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "launchNew" => Ok(Self::LaunchNew),
            "restartFromCheckPoint" => Ok(Self::RestartFromCheckPoint),
            "eraseThenRestart" => Ok(Self::EraseThenRestart),
            _ => Err(format!("Invalid launch action: {}", s)),
        }
    }
}

/// Everything needed to start one run.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub action: LaunchAction,
    pub restart_path: Option<PathBuf>,
    pub document: ConfigDocument,
    /// Values the browser already mapped to short flags.
    pub passthrough: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    pub argv: Vec<String>,
}

impl LaunchCommand {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// A process command with both output pipes captured.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(self.program());
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

#[derive(Debug, Clone)]
pub struct LaunchCommandBuilder {
    program: String,
    execution_flag: String,
    /// Parameter key to short flag, in argv order.
    short_flags: Vec<(String, String)>,
    /// Keys passed as-is; every other short-flag value is reduced to its directory.
    verbatim: Vec<String>,
}

impl Default for LaunchCommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_EXECUTION_FLAG)
    }
}

impl LaunchCommandBuilder {
    pub fn new(program: impl Into<String>, execution_flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            execution_flag: execution_flag.into(),
            short_flags: vec![
                ("input.dirPaths".to_string(), "i".to_string()),
                ("metadata.filePath".to_string(), "m".to_string()),
            ],
            verbatim: vec!["input.dirPaths".to_string()],
        }
    }

    pub fn with_short_flags(mut self, flags: Vec<(String, String)>) -> Self {
        self.short_flags = flags;
        self
    }

    pub fn with_verbatim(mut self, keys: Vec<String>) -> Self {
        self.verbatim = keys;
        self
    }

    /// `(short, value)` for every whitelisted key present in `doc`.
    pub fn short_flag_values(&self, doc: &ConfigDocument) -> Vec<(String, String)> {
        self.short_flags
            .iter()
            .filter_map(|(key, short)| {
                let value = doc.get_non_empty(key)?;
                let value = if self.verbatim.contains(key) {
                    value.to_string()
                } else {
                    containing_dir(value)
                };
                Some((short.clone(), value))
            })
            .collect()
    }

    pub fn build(
        &self,
        doc: &ConfigDocument,
        config_path: Option<&Path>,
        action: LaunchAction,
        restart_path: Option<&Path>,
    ) -> Result<LaunchCommand, LaunchError> {
        let config_path = config_path.ok_or(LaunchError::MissingConfigFileName)?;

        let mut argv = vec![self.program.clone()];
        for (short, value) in self.short_flag_values(doc) {
            argv.push(format!("-{short}={value}"));
        }

        let config_flag = if doc.get("pipeline.env").map(str::trim) == Some("aws") {
            "-aws"
        } else {
            "-c"
        };
        argv.push(format!("{config_flag}={}", config_path.display()));
        argv.push(self.execution_flag.clone());

        if action == LaunchAction::RestartFromCheckPoint {
            let restart = restart_path.ok_or_else(|| LaunchError::MissingRestartPath {
                action: action.to_string(),
            })?;
            argv.push(format!("-r={}", restart.display()));
        }

        Ok(LaunchCommand { argv })
    }

    /// Build from a full request, noting passthrough values that disagree
    /// with what the document yields.
    pub fn build_request(
        &self,
        request: &LaunchRequest,
        config_path: Option<&Path>,
    ) -> Result<LaunchCommand, LaunchError> {
        let computed = self.short_flag_values(&request.document);
        for (short, value) in &request.passthrough {
            match computed.iter().find(|(s, _)| s == short) {
                Some((_, ours)) if ours != value => tracing::warn!(
                    flag = %short,
                    submitted = %value,
                    computed = %ours,
                    "Launch flag differs from config, using config value"
                ),
                None => tracing::warn!(flag = %short, "Ignoring unrecognized launch flag"),
                _ => {}
            }
        }
        self.build(
            &request.document,
            config_path,
            request.action,
            request.restart_path.as_deref(),
        )
    }
}

fn containing_dir(value: &str) -> String {
    match Path::new(value).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.display().to_string(),
        _ => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ConfigDocument {
        let mut doc = ConfigDocument::new("run1.properties");
        doc.push_module("biolockj.module.seq.Rarefier").unwrap();
        doc.set_param("input.dirPaths", "/data/seqs").unwrap();
        doc.set_param("metadata.filePath", "/data/meta/metadata.tsv").unwrap();
        doc.set_param("pipeline.env", "local").unwrap();
        doc
    }

    fn cfg() -> PathBuf {
        PathBuf::from("/blj/resources/config/gui/run1.properties")
    }

    #[test]
    fn test_launch_new_argv() {
        let cmd = LaunchCommandBuilder::default()
            .build(&doc(), Some(&cfg()), LaunchAction::LaunchNew, None)
            .unwrap();
        assert_eq!(
            cmd.argv,
            vec![
                "biolockj",
                "-i=/data/seqs",
                "-m=/data/meta",
                "-c=/blj/resources/config/gui/run1.properties",
                "--docker",
            ]
        );
        assert_eq!(cmd.program(), "biolockj");
        assert_eq!(cmd.args().len(), 4);
    }

    #[test]
    fn test_aws_env_uses_aws_flag() {
        let mut d = doc();
        d.set_param("pipeline.env", "aws").unwrap();
        let cmd = LaunchCommandBuilder::default()
            .build(&d, Some(&cfg()), LaunchAction::LaunchNew, None)
            .unwrap();
        assert!(cmd.argv.contains(&format!("-aws={}", cfg().display())));
        assert!(!cmd.argv.iter().any(|a| a.starts_with("-c=")));
    }

    #[test]
    fn test_restart_appends_restart_dir() {
        let restart = PathBuf::from("/pipelines/run1_2024Jan5");
        let cmd = LaunchCommandBuilder::default()
            .build(
                &doc(),
                Some(&cfg()),
                LaunchAction::RestartFromCheckPoint,
                Some(&restart),
            )
            .unwrap();
        assert_eq!(cmd.argv.last().unwrap(), "-r=/pipelines/run1_2024Jan5");
    }

    #[test]
    fn test_restart_without_dir_fails() {
        let err = LaunchCommandBuilder::default()
            .build(&doc(), Some(&cfg()), LaunchAction::RestartFromCheckPoint, None)
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingRestartPath { .. }));
    }

    #[test]
    fn test_erase_then_restart_launches_fresh() {
        let restart = PathBuf::from("/pipelines/run1_2024Jan5");
        let cmd = LaunchCommandBuilder::default()
            .build(
                &doc(),
                Some(&cfg()),
                LaunchAction::EraseThenRestart,
                Some(&restart),
            )
            .unwrap();
        assert!(!cmd.argv.iter().any(|a| a.starts_with("-r=")));
    }

    #[test]
    fn test_missing_config_path() {
        let err = LaunchCommandBuilder::default()
            .build(&doc(), None, LaunchAction::LaunchNew, None)
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingConfigFileName));
    }

    #[test]
    fn test_value_without_directory_becomes_dot() {
        let mut d = doc();
        d.set_param("metadata.filePath", "metadata.tsv").unwrap();
        let flags = LaunchCommandBuilder::default().short_flag_values(&d);
        assert_eq!(flags[1], ("m".to_string(), ".".to_string()));
    }

    #[test]
    fn test_absent_keys_are_skipped() {
        let mut d = ConfigDocument::new("x");
        d.set_param("input.dirPaths", "/in").unwrap();
        let cmd = LaunchCommandBuilder::new("blj", "--local")
            .build(&d, Some(Path::new("/c.properties")), LaunchAction::LaunchNew, None)
            .unwrap();
        assert_eq!(cmd.argv, vec!["blj", "-i=/in", "-c=/c.properties", "--local"]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = LaunchCommandBuilder::default();
        let a = builder.build(&doc(), Some(&cfg()), LaunchAction::LaunchNew, None).unwrap();
        let b = builder.build(&doc(), Some(&cfg()), LaunchAction::LaunchNew, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_build_request_prefers_document_values() {
        let request = LaunchRequest {
            action: LaunchAction::LaunchNew,
            restart_path: None,
            document: doc(),
            passthrough: BTreeMap::from([("i".to_string(), "/elsewhere".to_string())]),
        };
        let cmd = LaunchCommandBuilder::default()
            .build_request(&request, Some(&cfg()))
            .unwrap();
        assert_eq!(cmd.argv[1], "-i=/data/seqs");
    }

    #[test]
    fn test_launch_action_serde_names() {
        let action: LaunchAction = serde_json::from_str("\"eraseThenRestart\"").unwrap();
        assert_eq!(action, LaunchAction::EraseThenRestart);
        assert_eq!(
            "restartFromCheckPoint".parse::<LaunchAction>().unwrap(),
            LaunchAction::RestartFromCheckPoint
        );
        assert!("relaunch".parse::<LaunchAction>().is_err());
    }
}
