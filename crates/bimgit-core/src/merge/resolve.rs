//! Domain-aware conflict resolution.
//!
//! When both sides of a merge changed a domain file, the merge engine hands
//! the three versions to a [`ConflictResolver`]. [`CommandResolver`] runs an
//! external merge tool in a scratch directory:
//!
//! ```text
//! <program> [args…] <base> <ours> <theirs> -o <out>
//! ```
//!
//! The child is polled until it exits or the deadline passes, in which case
//! it is killed and the attempt reports [`ToolError::Timeout`].

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from a conflict resolver.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The resolver program could not be started.
    #[error("merge tool `{program}` unavailable: {message}")]
    Unavailable { program: String, message: String },

    /// The resolver did not finish in time and was killed.
    #[error("merge tool timed out after {}s", .limit.as_secs())]
    Timeout { limit: Duration },

    /// The resolver ran but did not produce a merged file.
    #[error("merge tool failed (exit {}): {stderr}", .status.map_or_else(|| "signal".to_owned(), |c| c.to_string()))]
    Failed { status: Option<i32>, stderr: String },

    /// Scratch-file I/O failed.
    #[error("merge tool I/O: {0}")]
    Io(#[from] io::Error),
}

/// Capability that merges three versions of one file.
///
/// `base` is empty when the file did not exist in the merge base.
pub trait ConflictResolver: Send + Sync {
    fn resolve(
        &self,
        path: &str,
        base: &[u8],
        ours: &[u8],
        theirs: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ToolError>;
}

/// Resolver backed by an external merge program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResolver {
    program: String,
    args: Vec<String>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_LIMIT: usize = 4096;

impl CommandResolver {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ConflictResolver for CommandResolver {
    #[instrument(skip_all, fields(program = %self.program, path = %path))]
    fn resolve(
        &self,
        path: &str,
        base: &[u8],
        ours: &[u8],
        theirs: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ToolError> {
        let scratch = tempfile::tempdir()?;
        let dir = scratch.path();
        let suffix = Path::new(path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let base_path = dir.join(format!("base{suffix}"));
        let ours_path = dir.join(format!("ours{suffix}"));
        let theirs_path = dir.join(format!("theirs{suffix}"));
        let out_path = dir.join(format!("merged{suffix}"));
        let stderr_path = dir.join("stderr.log");
        fs::write(&base_path, base)?;
        fs::write(&ours_path, ours)?;
        fs::write(&theirs_path, theirs)?;

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&base_path)
            .arg(&ours_path)
            .arg(&theirs_path)
            .arg("-o")
            .arg(&out_path)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(File::create(&stderr_path)?)
            .spawn()
            .map_err(|e| ToolError::Unavailable {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Timeout { limit: timeout });
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        debug!(status = ?status.code(), elapsed_ms = start.elapsed().as_millis(), "merge tool exited");

        if status.success() {
            match fs::read(&out_path) {
                Ok(merged) => return Ok(merged),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let mut stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
        if stderr.len() > STDERR_LIMIT {
            let mut cut = STDERR_LIMIT;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        if status.success() {
            stderr = format!("no output file written. {stderr}");
        }
        Err(ToolError::Failed {
            status: status.code(),
            stderr: stderr.trim().to_owned(),
        })
    }
}
