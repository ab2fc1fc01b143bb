use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::{JoinHandle, JoinSet};

use super::events::{Broadcaster, SessionEvent};
use super::progress::{DEFAULT_POLL_INTERVAL, ProgressWatcher};
use super::{ProcessSession, SessionRegistry, SessionState};
use crate::errors::LaunchError;
use crate::launch::{DeleteGuard, LaunchCommand};
use crate::pipelines;

const READ_CHUNK: usize = 8 * 1024;

/// How long output may keep flowing after the process itself has exited.
/// Background children of the tool can hold the pipes open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Starts pipeline processes and supervises them until exit.
///
/// The child handle is owned by the supervising task alone; everything the
/// outside world sees goes through the session's state and channels.
#[derive(Debug, Clone)]
pub struct ProcessOrchestrator {
    registry: SessionRegistry,
    guard: DeleteGuard,
    pipelines_dir: PathBuf,
    poll_interval: Duration,
}

impl ProcessOrchestrator {
    pub fn new(registry: SessionRegistry, guard: DeleteGuard, pipelines_dir: PathBuf) -> Self {
        Self {
            registry,
            guard,
            pipelines_dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Erase `erase` if given, then spawn `command` for `run_id`.
    ///
    /// Returns once the process is running. Failures after the session has
    /// moved to `Launching` are also published to its log subscribers.
    pub async fn launch(
        &self,
        run_id: &str,
        command: LaunchCommand,
        erase: Option<&Path>,
    ) -> Result<Arc<ProcessSession>, LaunchError> {
        let session = self.registry.begin_launch(run_id, &command)?;

        if let Some(target) = erase
            && let Err(e) = self.guard.erase(target).await
        {
            fail_before_start(&session, &e);
            return Err(e);
        }

        let child = match command.to_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = LaunchError::ProcessSpawnFailure {
                    program: command.program().to_string(),
                    message: e.to_string(),
                };
                fail_before_start(&session, &err);
                return Err(err);
            }
        };

        session.transition(SessionState::Running);
        tracing::info!(run_id, pid = ?child.id(), command = %command, "Pipeline launched");

        let project_dir = pipelines::project_dir(
            &self.pipelines_dir,
            run_id,
            chrono::Local::now().date_naive(),
        );
        let watcher = ProgressWatcher::new(project_dir, self.poll_interval)
            .spawn(session.progress().clone());
        tokio::spawn(supervise(Arc::clone(&session), child, watcher));

        Ok(session)
    }
}

fn fail_before_start(session: &ProcessSession, err: &LaunchError) {
    tracing::error!(run_id = session.run_id(), error = %err, "Pipeline did not start");
    session.transition(SessionState::Failed {
        error: err.to_string(),
    });
    session.logs().publish(SessionEvent::Log(err.to_string()));
    session.logs().publish(SessionEvent::Close { exit_code: None });
}

async fn supervise(session: Arc<ProcessSession>, mut child: Child, watcher: JoinHandle<()>) {
    let mut readers = JoinSet::new();
    if let Some(out) = child.stdout.take() {
        readers.spawn(forward_output(out, session.logs().clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.spawn(forward_output(err, session.logs().clone()));
    }

    let status = child.wait().await;
    drain_readers(session.run_id(), readers).await;

    let (state, exit_code) = match status {
        Ok(status) => match status.code() {
            Some(code) => (SessionState::Completed { exit_code: code }, Some(code)),
            None => (
                SessionState::Failed {
                    error: format!("Pipeline terminated without exit code ({status})"),
                },
                None,
            ),
        },
        Err(e) => (
            SessionState::Failed {
                error: format!("Failed to wait for pipeline: {e}"),
            },
            None,
        ),
    };
    watcher.abort();

    tracing::info!(run_id = session.run_id(), ?exit_code, status = state.as_str(), "Pipeline exited");
    session.transition(state);
    session.logs().publish(SessionEvent::Close { exit_code });
}

/// Wait for the output readers, cancelling them once the grace period is
/// over. No reader can publish after this returns, so `close` stays last.
async fn drain_readers(run_id: &str, mut readers: JoinSet<()>) {
    let all_done = async {
        while let Some(result) = readers.join_next().await {
            if let Err(e) = result {
                tracing::warn!(run_id, error = %e, "Output reader panicked");
            }
        }
    };
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, all_done).await.is_ok() {
        return;
    }

    tracing::warn!(run_id, "Pipeline exited but its output is still open, detaching");
    readers.shutdown().await;
}

/// Publish everything read from `reader` as log chunks.
async fn forward_output<R: AsyncRead + Unpin>(mut reader: R, sink: Broadcaster<SessionEvent>) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut pending = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pipeline output");
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);
        let text = take_utf8(&mut pending);
        if !text.is_empty() {
            tracing::debug!(bytes = text.len(), "Pipeline output");
            sink.publish(SessionEvent::Log(text));
        }
    }
    if !pending.is_empty() {
        sink.publish(SessionEvent::Log(
            String::from_utf8_lossy(&pending).into_owned(),
        ));
    }
}

/// Take the decodable prefix of `bytes`, leaving a trailing partial
/// character in place for the next read.
fn take_utf8(bytes: &mut Vec<u8>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.to_string();
            bytes.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let rest = bytes.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(bytes).into_owned();
            *bytes = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            bytes.clear();
            text
        }
    }
}
