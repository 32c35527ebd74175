//! Execution sandbox adapter.
//!
//! Installs the dependencies a generation stage declared, then runs the
//! generated Python in a separate interpreter process against the run's
//! working directory. Every attempt is appended to a persistent execution
//! log. Faults never escape this component: installation failures, spawn
//! failures, and runtime errors all come back as a `Failure` outcome.
//!
//! No timeout is applied to installation or execution; lifecycle control is
//! left to the caller.

use std::process::Stdio;

use augur_core::config::PipelineConfig;
use augur_core::error::AugurError;
use augur_core::stage::ExecutionOutcome;
use augur_core::workdir::WorkingDirectory;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const SUCCESS_BANNER: &str = "Code executed successfully after installing libraries.";

/// Runs generated code against a working directory.
pub struct Sandbox {
    python_bin: String,
    denylist: Vec<String>,
}

impl Sandbox {
    pub fn new(python_bin: impl Into<String>, denylist: Vec<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
            denylist: denylist.into_iter().map(|d| d.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.python_bin.clone(), config.builtin_denylist.clone())
    }

    /// Installs `libraries` in order, then executes `code`.
    ///
    /// Any installation failure short-circuits the call: the code body is
    /// never invoked if a dependency could not be installed.
    pub async fn execute(
        &self,
        code: &str,
        libraries: &[String],
        workdir: &WorkingDirectory,
    ) -> ExecutionOutcome {
        if let Err(e) = tokio::fs::create_dir_all(workdir.path()).await {
            return ExecutionOutcome::failure(format!(
                "Failed to create working directory: {e}"
            ));
        }

        for library in libraries {
            if self.denylist.contains(&library.trim().to_ascii_lowercase()) {
                tracing::debug!(%library, "skipping built-in library");
                continue;
            }
            if let Err(e) = self.install(library).await {
                let message = e.to_string();
                self.log(workdir, &message).await;
                return ExecutionOutcome::failure(message);
            }
        }

        let formatted = self.format_code(code).await;
        self.log(workdir, &format!("Executing code:\n{formatted}")).await;

        match self.run_script(code, workdir).await {
            Ok(()) => {
                self.log(workdir, SUCCESS_BANNER).await;
                ExecutionOutcome::success(SUCCESS_BANNER)
            }
            Err(trace) => {
                let message = format!("Error during code execution:\n{trace}");
                self.log(workdir, &message).await;
                ExecutionOutcome::failure(message)
            }
        }
    }

    async fn install(&self, library: &str) -> Result<(), AugurError> {
        tracing::info!(%library, "installing dependency");
        let output = Command::new(&self.python_bin)
            .args(["-m", "pip", "install", library])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AugurError::DependencyInstall {
                library: library.to_string(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AugurError::DependencyInstall {
                library: library.to_string(),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    /// Best-effort pretty-print for the execution log. Falls back to the raw
    /// text when `black` is unavailable or rejects the code.
    async fn format_code(&self, code: &str) -> String {
        let child = Command::new(&self.python_bin)
            .args(["-m", "black", "-q", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let Ok(mut child) = child else {
            return code.to_string();
        };
        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(code.as_bytes()).await.is_err() {
                return code.to_string();
            }
        }
        match child.wait_with_output().await {
            Ok(output) if output.status.success() && !output.stdout.is_empty() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            _ => code.to_string(),
        }
    }

    /// Runs the code in a fresh interpreter process with the working
    /// directory as its current directory.
    async fn run_script(&self, code: &str, workdir: &WorkingDirectory) -> Result<(), String> {
        let script = tempfile::Builder::new()
            .prefix("augur-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| format!("Failed to stage script: {e}"))?;
        std::fs::write(script.path(), code).map_err(|e| format!("Failed to stage script: {e}"))?;

        let output = Command::new(&self.python_bin)
            .arg(script.path())
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("Failed to spawn interpreter: {e}"))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.trim().is_empty() {
                Err(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                Err(stderr.into_owned())
            }
        }
    }

    /// Appends a timestamped record to the execution log. Logging failures
    /// are swallowed; the log is diagnostic, not load-bearing.
    async fn log(&self, workdir: &WorkingDirectory, content: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let entry = format!("\n[{timestamp}]\n{content}\n{}\n", "-".repeat(40));

        let result = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(workdir.execution_log_path())
            .await;
        match result {
            Ok(mut file) => {
                if let Err(e) = file.write_all(entry.as_bytes()).await {
                    tracing::warn!(error = %e, "failed to append execution log");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to open execution log"),
        }
    }
}
