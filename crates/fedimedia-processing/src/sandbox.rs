//! Capability-scoped execution of external media tools.
//!
//! Every invocation lists the exact paths the child may touch. On Linux the
//! list is enforced with a Landlock ruleset applied in the child between fork
//! and exec; the runtime paths (binaries, shared libraries, loader config) are
//! always readable and executable. Enforcement is best-effort: kernels without
//! Landlock run the tool unconfined with a warning.

use fedimedia_core::MediaConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::{ProcessingError, ProcessingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

/// One filesystem grant for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub path: PathBuf,
    pub access: AccessMode,
}

impl Capability {
    pub fn read(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: AccessMode::Read,
        }
    }

    pub fn read_write(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: AccessMode::ReadWrite,
        }
    }
}

#[derive(Debug)]
pub struct SandboxOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime_paths: Vec<PathBuf>,
    timeout: Duration,
}

impl Sandbox {
    /// Runtime paths that do not exist on this host are dropped.
    pub fn new(runtime_paths: Vec<PathBuf>, timeout: Duration) -> Self {
        let runtime_paths = runtime_paths.into_iter().filter(|p| p.exists()).collect();
        Self {
            runtime_paths,
            timeout,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.sandbox_runtime_paths.clone(), config.sandbox_timeout())
    }

    pub fn runtime_paths(&self) -> &[PathBuf] {
        &self.runtime_paths
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `binary` with `args`, confined to `capabilities`.
    ///
    /// A non-zero exit is returned as output, not as an error, so callers can
    /// inspect stdout (ffprobe reports failures as JSON).
    pub async fn run(
        &self,
        binary: &str,
        args: &[String],
        capabilities: &[Capability],
    ) -> ProcessingResult<SandboxOutput> {
        let start = Instant::now();

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.confine(&mut cmd, binary, capabilities);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| ProcessingError::Spawn {
                binary: binary.to_string(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(binary, timeout = ?self.timeout, "Sandboxed process timed out");
                return Err(ProcessingError::Timeout {
                    binary: binary.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        tracing::debug!(
            binary,
            status = %output.status,
            capabilities = capabilities.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Sandboxed process finished"
        );

        Ok(SandboxOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Like [`Sandbox::run`] but a non-zero exit becomes `ProcessFailed`.
    pub async fn run_checked(
        &self,
        binary: &str,
        args: &[String],
        capabilities: &[Capability],
    ) -> ProcessingResult<SandboxOutput> {
        let output = self.run(binary, args, capabilities).await?;
        if !output.success {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(binary, status = %output.status, stderr = %stderr, "Sandboxed process failed");
            return Err(ProcessingError::ProcessFailed {
                binary: binary.to_string(),
                status: output.status,
                stderr,
            });
        }
        Ok(output)
    }

    fn readable_paths(&self, binary: &str) -> Vec<PathBuf> {
        let mut paths = self.runtime_paths.clone();
        let bin = Path::new(binary);
        if bin.is_absolute() {
            if let Some(parent) = bin.parent() {
                paths.push(parent.to_path_buf());
            }
        }
        paths
    }

    #[cfg(target_os = "linux")]
    fn confine(&self, cmd: &mut Command, binary: &str, capabilities: &[Capability]) {
        let runtime = self.readable_paths(binary);
        match linux::build_ruleset(&runtime, capabilities) {
            Ok(ruleset) => {
                let mut ruleset = Some(ruleset);
                // SAFETY: the closure only issues the prctl/landlock syscalls
                // for a ruleset fd opened before fork and does not allocate.
                unsafe {
                    cmd.pre_exec(move || match ruleset.take() {
                        Some(r) => r
                            .restrict_self()
                            .map(|_| ())
                            .map_err(|_| std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
                        None => Ok(()),
                    });
                }
            }
            Err(err) => {
                tracing::warn!(?err, binary, "Landlock not enabled; running without sandbox");
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn confine(&self, _cmd: &mut Command, binary: &str, _capabilities: &[Capability]) {
        tracing::debug!(
            binary,
            paths = self.readable_paths(binary).len(),
            "Filesystem sandbox unavailable on this platform"
        );
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::{AccessMode, Capability};
    use landlock::{
        path_beneath_rules, Access, AccessFs, Ruleset, RulesetAttr, RulesetCreated,
        RulesetCreatedAttr, RulesetError, ABI,
    };
    use std::path::PathBuf;

    pub(super) fn build_ruleset(
        runtime: &[PathBuf],
        capabilities: &[Capability],
    ) -> Result<RulesetCreated, RulesetError> {
        let abi = ABI::V1;
        let access_all = AccessFs::from_all(abi);
        let access_read = AccessFs::from_read(abi);

        let readable: Vec<PathBuf> = runtime
            .iter()
            .cloned()
            .chain(
                capabilities
                    .iter()
                    .filter(|c| c.access == AccessMode::Read)
                    .map(|c| c.path.clone()),
            )
            .collect();
        let writable: Vec<PathBuf> = capabilities
            .iter()
            .filter(|c| c.access == AccessMode::ReadWrite)
            .map(|c| c.path.clone())
            .collect();

        Ruleset::default()
            .handle_access(access_all)?
            .create()?
            .add_rules(path_beneath_rules(readable, access_read))?
            .add_rules(path_beneath_rules(writable, access_all))
    }
}
