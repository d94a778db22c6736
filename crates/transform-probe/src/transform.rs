//! The transform capability a canary exercises.
//!
//! The probe controller does not know how content is converted. It hands a
//! source and a target path to a [`Transformer`] and times the call.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::process::Command;
use tracing::debug;

use crate::error::TransformError;

/// Performs one real transformation from `source` into `target`.
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        source: &Path,
        target: &Path,
    ) -> impl Future<Output = Result<(), TransformError>> + Send;
}

impl<T: Transformer> Transformer for Arc<T> {
    fn transform(
        &self,
        source: &Path,
        target: &Path,
    ) -> impl Future<Output = Result<(), TransformError>> + Send {
        (**self).transform(source, target)
    }
}

/// Runs an external program for each transform.
///
/// `{source}` and `{target}` in the arguments are replaced with the canary
/// file paths, e.g. `convert {source} -resize 64x64 {target}`.
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
}

impl CommandTransformer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, source: &Path, target: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let target = target.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{source}", &source).replace("{target}", &target))
            .collect()
    }
}

impl Transformer for CommandTransformer {
    async fn transform(&self, source: &Path, target: &Path) -> Result<(), TransformError> {
        let args = self.render_args(source, target);
        debug!(program = %self.program, ?args, "running transform command");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TransformError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TransformError::ExitStatus {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
