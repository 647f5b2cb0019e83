//! Desktop agent backend driven through request/reply files.
//!
//! Each attempt gets its own session directory holding `<id>.req.md`. The
//! agent is launched with `<command> chat -r <message>` and is expected to
//! write `<id>.res.tmp.md`, then rename it to `<id>.res.md`. The launcher's
//! stderr goes to `<id>.launch.log`. Session directories are left in place
//! for inspection.

use super::poll::ReplyPoller;
use super::BackendAdapter;
use crate::errors::{FailureDetail, RunErrorKind};
use crate::model::AttemptOutcome;
use crate::prompt::PreparedPrompt;
use crate::targets::AgentSettings;
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};

pub const REQUEST_FILE_ENV: &str = "SPECEVAL_REQUEST_FILE";
pub const REPLY_FILE_ENV: &str = "SPECEVAL_REPLY_FILE";
pub const REPLY_TMP_FILE_ENV: &str = "SPECEVAL_REPLY_TMP_FILE";

/// Paths of one attempt's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFiles {
    pub dir: PathBuf,
    pub request: PathBuf,
    pub reply_tmp: PathBuf,
    pub reply: PathBuf,
    pub launch_log: PathBuf,
}

pub struct AgentAdapter {
    settings: AgentSettings,
    seq: AtomicU64,
}

impl AgentAdapter {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            seq: AtomicU64::new(0),
        }
    }

    /// Fresh, never reused directory under the session root.
    pub async fn prepare_session(&self, test_id: &str) -> std::io::Result<SessionFiles> {
        let name = sanitize_id(test_id);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let dir = self
            .settings
            .session_root
            .join(format!("{}-{}-{}", name, stamp, seq));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(SessionFiles {
            request: dir.join(format!("{}.req.md", name)),
            reply_tmp: dir.join(format!("{}.res.tmp.md", name)),
            reply: dir.join(format!("{}.res.md", name)),
            launch_log: dir.join(format!("{}.launch.log", name)),
            dir,
        })
    }

    fn launch_message(files: &SessionFiles) -> String {
        format!(
            "#file:{} Follow the instructions in this request file exactly.",
            files.request.display()
        )
    }

    /// Starts the launcher without waiting for it. Nothing is piped, so a
    /// child it leaves behind cannot hold the attempt open.
    async fn spawn(&self, files: &SessionFiles) -> anyhow::Result<Child> {
        let log = tokio::fs::File::create(&files.launch_log)
            .await
            .with_context(|| format!("failed to create {}", files.launch_log.display()))?
            .into_std()
            .await;

        let mut cmd = Command::new(&self.settings.command);
        cmd.arg("chat")
            .arg("-r")
            .arg(Self::launch_message(files))
            .env(REQUEST_FILE_ENV, &files.request)
            .env(REPLY_FILE_ENV, &files.reply)
            .env(REPLY_TMP_FILE_ENV, &files.reply_tmp)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .kill_on_drop(true);
        if let Some(dir) = workspace_dir(&self.settings.workspace) {
            cmd.current_dir(dir);
        }

        cmd.spawn()
            .with_context(|| format!("failed to launch '{}'", self.settings.command))
    }

    /// A non-zero exit is an error whose cause is the launcher's stderr.
    async fn check_exit(
        &self,
        status: std::io::Result<ExitStatus>,
        files: &SessionFiles,
    ) -> anyhow::Result<()> {
        let status =
            status.with_context(|| format!("failed to wait for '{}'", self.settings.command))?;
        if status.success() {
            return Ok(());
        }
        let summary = format!("'{}' exited with {}", self.settings.command, status);
        let stderr = tokio::fs::read_to_string(&files.launch_log)
            .await
            .unwrap_or_default();
        if stderr.trim().is_empty() {
            anyhow::bail!(summary);
        }
        Err(anyhow::anyhow!("{}", stderr.trim()).context(summary))
    }

    async fn run_attempt(&self, prompt: &PreparedPrompt, deadline: Duration) -> AttemptOutcome {
        let files = match self.prepare_session(&prompt.test_id).await {
            Ok(f) => f,
            Err(e) => {
                let err = anyhow::Error::new(e).context("failed to create agent session directory");
                return AttemptOutcome::Error(self.detail(RunErrorKind::Io, &err));
            }
        };
        let request = build_request(prompt, &files);
        if let Err(e) = tokio::fs::write(&files.request, request).await {
            let err = anyhow::Error::new(e)
                .context(format!("failed to write {}", files.request.display()));
            return AttemptOutcome::Error(self.detail(RunErrorKind::Io, &err));
        }

        let poller = ReplyPoller::new(&files.reply, self.settings.poll_interval, deadline);
        tracing::debug!(
            test_id = %prompt.test_id,
            session = %files.dir.display(),
            "launching agent"
        );

        let mut child = match self.spawn(&files).await {
            Ok(child) => child,
            Err(err) => return AttemptOutcome::Error(self.detail(RunErrorKind::Launch, &err)),
        };

        // Poll while the launcher runs. A launcher still running when polling
        // ends is killed on drop.
        let polling = poller.wait();
        tokio::pin!(polling);
        let polled = tokio::select! {
            status = child.wait() => {
                if let Err(err) = self.check_exit(status, &files).await {
                    return AttemptOutcome::Error(self.detail(RunErrorKind::Launch, &err));
                }
                polling.await
            }
            polled = &mut polling => polled,
        };

        match polled {
            Ok(Some(bytes)) => self.parse_reply(bytes, &files.reply),
            Ok(None) => {
                tracing::warn!(
                    test_id = %prompt.test_id,
                    reply = %files.reply.display(),
                    deadline_ms = deadline.as_millis() as u64,
                    "no agent reply before deadline"
                );
                AttemptOutcome::Timeout
            }
            Err(e) => {
                let err = anyhow::Error::new(e)
                    .context(format!("failed to read {}", files.reply.display()));
                AttemptOutcome::Error(self.detail(RunErrorKind::Io, &err))
            }
        }
    }

    fn parse_reply(&self, bytes: Vec<u8>, path: &Path) -> AttemptOutcome {
        match String::from_utf8(bytes) {
            Ok(text) if !text.trim().is_empty() => AttemptOutcome::Success(text.trim_end().to_string()),
            Ok(_) => AttemptOutcome::Error(
                FailureDetail::new(
                    RunErrorKind::ReplyParse,
                    format!("agent reply {} is blank", path.display()),
                )
                .with_provider(self.provider_name()),
            ),
            Err(e) => {
                let err = anyhow::Error::new(e)
                    .context(format!("agent reply {} is not valid UTF-8", path.display()));
                AttemptOutcome::Error(self.detail(RunErrorKind::ReplyParse, &err))
            }
        }
    }

    fn detail(&self, kind: RunErrorKind, err: &anyhow::Error) -> FailureDetail {
        FailureDetail::from_anyhow(kind, err).with_provider(self.provider_name())
    }
}

#[async_trait]
impl BackendAdapter for AgentAdapter {
    async fn dispatch(&self, prompt: &PreparedPrompt, deadline: Duration) -> AttemptOutcome {
        self.run_attempt(prompt, deadline).await
    }

    fn provider_name(&self) -> &str {
        "vscode"
    }

    fn model_name(&self) -> &str {
        "copilot"
    }
}

fn workspace_dir(workspace: &Path) -> Option<&Path> {
    if workspace.is_dir() {
        Some(workspace)
    } else {
        workspace.parent().filter(|p| p.is_dir())
    }
}

/// Keeps ASCII letters, digits, `-` and `_`; everything else becomes `_`.
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Instructions the agent must follow before answering. Empty without
/// guideline files.
pub fn build_preread_block(guidelines: &[PathBuf]) -> String {
    if guidelines.is_empty() {
        return String::new();
    }
    let mut out = String::from("## 1. Mandatory Pre-Read\n\n");
    out.push_str("Read every file below in full before doing anything else:\n\n");
    for path in guidelines {
        out.push_str(&format!("- `#file:{}`\n", path.display()));
    }
    out.push_str("\nThen confirm each one on its own line, in this form:\n\n");
    for path in guidelines {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        out.push_str(&format!("INSTRUCTIONS_READ: [{}] SHA256=<hex>\n", name));
    }
    out
}

pub fn build_request(prompt: &PreparedPrompt, files: &SessionFiles) -> String {
    let guideline_paths: Vec<PathBuf> = prompt.guidelines.iter().map(|g| g.path.clone()).collect();
    let preread = build_preread_block(&guideline_paths);
    let mut section = if preread.is_empty() { 1 } else { 2 };

    let mut out = format!("# Evaluation request: {}\n\n", prompt.test_id);
    if !preread.is_empty() {
        out.push_str(&preread);
        out.push('\n');
    }

    out.push_str(&format!("## {}. Task\n\n{}\n\n", section, prompt.task()));
    section += 1;

    out.push_str(&format!(
        "## {}. Reply\n\nWrite your complete answer to `{}`. When it is final, rename that \
         file to `{}`. Do not write anything else to either path.\n",
        section,
        files.reply_tmp.display(),
        files.reply.display()
    ));
    out
}
