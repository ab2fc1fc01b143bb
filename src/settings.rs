//! Server settings.
//!
//! Layers, later wins:
//! 1. built-in defaults
//! 2. `blj-web.toml` in the working directory, or the file given by `--settings`
//! 3. environment (`BLJ_CONFIG`, `BLJ`, `HOST_BLJ`, `BLJ_PROJ`, `BLJ_LOG_DIR`)
//! 4. command-line flags
//!
//! # File format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [paths]
//! config_dir = "/blj/resources/config/gui"
//! pipelines_dir = "/pipelines"
//! host_blj_dir = "/home/me/biolockj"
//! protected = ["/home/me"]
//!
//! [launcher]
//! program = "biolockj"
//! execution_flag = "--docker"
//! verbatim = ["input.dirPaths"]
//!
//! [launcher.short_flags]
//! "input.dirPaths" = "i"
//! "metadata.filePath" = "m"
//!
//! [sessions]
//! progress_poll_ms = 1000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::launch::{DEFAULT_EXECUTION_FLAG, DEFAULT_PROGRAM, LaunchCommandBuilder};

pub const SETTINGS_FILE: &str = "blj-web.toml";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where the GUI's configs live inside an installation.
const GUI_CONFIG_SUBDIR: [&str; 3] = ["resources", "config", "gui"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSettings {
    pub program: String,
    pub execution_flag: String,
    pub short_flags: BTreeMap<String, String>,
    pub verbatim: Vec<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            execution_flag: DEFAULT_EXECUTION_FLAG.to_string(),
            short_flags: BTreeMap::from([
                ("input.dirPaths".to_string(), "i".to_string()),
                ("metadata.filePath".to_string(), "m".to_string()),
            ]),
            verbatim: vec!["input.dirPaths".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Permissive CORS and bind on all interfaces.
    pub dev: bool,
    pub config_dir: PathBuf,
    pub pipelines_dir: PathBuf,
    /// Installation directory as seen by this server.
    pub blj_dir: Option<PathBuf>,
    /// Installation directory as seen by the pipeline tool.
    pub host_blj_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    /// Directories erase-then-restart must never touch, besides the ones above.
    pub protected: Vec<PathBuf>,
    pub launcher: LauncherSettings,
    pub progress_poll: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dev: false,
            config_dir: PathBuf::from("config"),
            pipelines_dir: PathBuf::from("/pipelines"),
            blj_dir: None,
            host_blj_dir: None,
            log_dir: None,
            protected: Vec::new(),
            launcher: LauncherSettings::default(),
            progress_poll: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsToml {
    server: Option<ServerSection>,
    paths: Option<PathsSection>,
    launcher: Option<LauncherSection>,
    sessions: Option<SessionsSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsSection {
    config_dir: Option<PathBuf>,
    pipelines_dir: Option<PathBuf>,
    blj_dir: Option<PathBuf>,
    host_blj_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    protected: Option<Vec<PathBuf>>,
}

#[derive(Debug, Default, Deserialize)]
struct LauncherSection {
    program: Option<String>,
    execution_flag: Option<String>,
    short_flags: Option<BTreeMap<String, String>>,
    verbatim: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionsSection {
    progress_poll_ms: Option<u64>,
}

impl ServerSettings {
    /// Defaults, then the settings file, then the process environment.
    ///
    /// An explicit `path` must exist; the implicit `blj-web.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(SETTINGS_FILE)).filter(|p| p.exists()),
        };
        if let Some(file) = file {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            settings
                .apply_toml(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
        }
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let toml: SettingsToml = toml::from_str(content)?;

        if let Some(server) = toml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
        }
        if let Some(paths) = toml.paths {
            if let Some(dir) = paths.config_dir {
                self.config_dir = dir;
            }
            if let Some(dir) = paths.pipelines_dir {
                self.pipelines_dir = dir;
            }
            if paths.blj_dir.is_some() {
                self.blj_dir = paths.blj_dir;
            }
            if paths.host_blj_dir.is_some() {
                self.host_blj_dir = paths.host_blj_dir;
            }
            if paths.log_dir.is_some() {
                self.log_dir = paths.log_dir;
            }
            if let Some(protected) = paths.protected {
                self.protected = protected;
            }
        }
        if let Some(launcher) = toml.launcher {
            if let Some(program) = launcher.program {
                self.launcher.program = program;
            }
            if let Some(flag) = launcher.execution_flag {
                self.launcher.execution_flag = flag;
            }
            if let Some(flags) = launcher.short_flags {
                self.launcher.short_flags = flags;
            }
            if let Some(verbatim) = launcher.verbatim {
                self.launcher.verbatim = verbatim;
            }
        }
        if let Some(sessions) = toml.sessions {
            if let Some(ms) = sessions.progress_poll_ms {
                self.progress_poll = Duration::from_millis(ms);
            }
        }
        Ok(())
    }

    /// Overlay environment variables read through `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("BLJ") {
            self.blj_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("HOST_BLJ") {
            self.host_blj_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("BLJ_CONFIG") {
            self.config_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("BLJ_PROJ") {
            self.pipelines_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("BLJ_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Path of a persisted config as the pipeline tool will see it.
    ///
    /// With a host installation directory the tool runs in a container that
    /// mounts the host path, so the host path wins over `local`.
    pub fn launch_config_path(&self, file_name: &str, local: &Path) -> PathBuf {
        match &self.host_blj_dir {
            Some(host) => GUI_CONFIG_SUBDIR
                .iter()
                .fold(host.clone(), |p, part| p.join(part))
                .join(file_name),
            None => local.to_path_buf(),
        }
    }

    /// Relative restart paths are taken from the pipelines root.
    pub fn resolve_restart_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.pipelines_dir.join(path)
        }
    }

    /// Directories a destructive restart must never remove.
    pub fn protected_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.config_dir.clone(), self.pipelines_dir.clone()];
        dirs.extend(self.blj_dir.iter().cloned());
        dirs.extend(self.host_blj_dir.iter().cloned());
        dirs.extend(self.log_dir.iter().cloned());
        dirs.extend(self.protected.iter().cloned());
        dirs
    }

    pub fn launch_builder(&self) -> LaunchCommandBuilder {
        LaunchCommandBuilder::new(&self.launcher.program, &self.launcher.execution_flag)
            .with_short_flags(
                self.launcher
                    .short_flags
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
            .with_verbatim(self.launcher.verbatim.clone())
    }

    /// Address to bind. Dev mode listens on all interfaces.
    pub fn bind_host(&self) -> &str {
        if self.dev { "0.0.0.0" } else { &self.host }
    }
}
