//! Records of skipped billing lines

use crate::billing::model::BillingData;
use crate::core::{ItemError, SkipListener};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Appends the raw input of every item skipped while reading to a file,
/// one per line, and logs process-phase skips
pub struct SkipFileListener {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl SkipFileListener {
    /// `None` disables the file and only logs
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.lock.lock().await;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl SkipListener<BillingData> for SkipFileListener {
    async fn on_skip_in_read(&self, error: &ItemError) {
        let line = error.input.as_deref().unwrap_or(&error.message);
        if let Err(e) = self.append(line).await {
            warn!("Failed to record skipped line: {}", e);
        }
    }

    async fn on_skip_in_process(&self, item: &BillingData, error: &ItemError) {
        info!(
            account_id = item.account_id,
            phone_number = %item.phone_number,
            "Skipped billing line: {}",
            error
        );
    }
}
