//! `mpy-cross` bridge
//!
//! Compiles one source file at a time into a private temporary directory, so
//! the output location never depends on the working directory.

use super::reader::MpyFile;
use crate::result::{CoverageError, CoverageResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

/// Default compiler binary, looked up on `PATH`
pub const DEFAULT_MPY_CROSS: &str = "mpy-cross";

/// Default per-file compile timeout
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Output of one successful compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    /// Source that was compiled
    pub source: PathBuf,
    /// `.mpy` image
    pub image: Vec<u8>,
}

impl CompiledUnit {
    /// Parse the image
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::CompileFailure`] when the image is malformed
    /// or contains native code.
    pub fn parse(&self) -> CoverageResult<MpyFile> {
        MpyFile::parse(&self.image).map_err(|e| {
            CoverageError::compile_failure(self.source.display().to_string(), e.to_string())
        })
    }
}

/// Something that turns a source file into a compiled unit
pub trait Compiler {
    /// Compile `source`
    ///
    /// # Errors
    ///
    /// [`CoverageError::ToolMissing`] when the compiler itself is absent;
    /// [`CoverageError::CompileFailure`] for a failure scoped to `source`.
    fn compile(&self, source: &Path) -> CoverageResult<CompiledUnit>;
}

/// The MicroPython cross compiler
#[derive(Debug, Clone)]
pub struct MpyCross {
    binary: PathBuf,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl Default for MpyCross {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_MPY_CROSS),
            timeout: DEFAULT_COMPILE_TIMEOUT,
            extra_args: Vec::new(),
        }
    }
}

impl MpyCross {
    /// Use the binary found on `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom binary path
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the per-file timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pass an extra flag (for example `-march=armv7m`)
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Binary that will be invoked
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn tool_missing(&self) -> CoverageError {
        CoverageError::ToolMissing {
            tool: self.binary.display().to_string(),
            hint: "Install mpy-cross (pip install mpy-cross) or pass --mpy-cross <path>".to_string(),
        }
    }

    async fn run(&self, source: &Path, output: &Path) -> CoverageResult<()> {
        let file = source.display().to_string();
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(&self.extra_args)
            .arg("-o")
            .arg(output)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => self.tool_missing(),
            _ => CoverageError::Io(e),
        })?;

        let out = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                CoverageError::compile_failure(
                    file.as_str(),
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })??;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let message = match stderr.trim() {
                "" => format!("exited with {}", out.status),
                text => text.to_string(),
            };
            return Err(CoverageError::compile_failure(file, message));
        }
        Ok(())
    }
}

impl Compiler for MpyCross {
    fn compile(&self, source: &Path) -> CoverageResult<CompiledUnit> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("unit.mpy");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(source, &output))?;

        let image = std::fs::read(&output).map_err(|e| {
            CoverageError::compile_failure(
                source.display().to_string(),
                format!("no output produced: {e}"),
            )
        })?;
        debug!(source = %source.display(), bytes = image.len(), "compiled");
        Ok(CompiledUnit {
            source: source.to_path_buf(),
            image,
        })
    }
}
