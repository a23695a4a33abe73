//! Staging of the input file

use crate::core::{StepContext, Tasklet};
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Copies the `input.file` job parameter into the staging directory
pub struct FilePreparationTasklet {
    staging_dir: PathBuf,
}

impl FilePreparationTasklet {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }
}

#[async_trait]
impl Tasklet for FilePreparationTasklet {
    async fn execute(&mut self, ctx: &StepContext) -> anyhow::Result<()> {
        let source = Path::new(ctx.require_string("input.file")?);
        let file_name = source
            .file_name()
            .with_context(|| format!("'{}' does not name a file", source.display()))?;
        let target = self.staging_dir.join(file_name);

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.staging_dir.display()))?;
        let bytes = tokio::fs::copy(source, &target).await.with_context(|| {
            format!("Failed to copy {} to {}", source.display(), target.display())
        })?;

        info!(step = %ctx.step_name, bytes, "Staged {}", target.display());
        Ok(())
    }
}
