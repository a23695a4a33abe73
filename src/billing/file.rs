//! Flat-file source and sink

use crate::billing::model::{BillingData, ReportingData};
use crate::core::{ItemError, ItemReader, ItemWriter, StepContext};
use anyhow::Context;
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info};

/// Where a file adapter finds its path
#[derive(Debug, Clone)]
pub enum FileLocation {
    /// A fixed path
    Path(PathBuf),
    /// The string job parameter with this name
    Parameter(String),
    /// The file named by a string job parameter, relocated into a directory
    StagedParameter { parameter: String, dir: PathBuf },
}

impl FileLocation {
    fn resolve(&self, ctx: &StepContext) -> anyhow::Result<PathBuf> {
        match self {
            FileLocation::Path(path) => Ok(path.clone()),
            FileLocation::Parameter(name) => Ok(PathBuf::from(ctx.require_string(name)?)),
            FileLocation::StagedParameter { parameter, dir } => {
                let source = PathBuf::from(ctx.require_string(parameter)?);
                let file_name = source
                    .file_name()
                    .with_context(|| format!("'{}' does not name a file", source.display()))?;
                Ok(dir.join(file_name))
            }
        }
    }
}

/// Reads comma-delimited billing records, one per line, without a header.
///
/// The file is loaded whole when the step opens it.
pub struct BillingFileReader {
    location: FileLocation,
    reader: Option<csv::Reader<Cursor<Vec<u8>>>>,
    record: StringRecord,
}

impl BillingFileReader {
    pub fn new(location: FileLocation) -> Self {
        Self {
            location,
            reader: None,
            record: StringRecord::new(),
        }
    }
}

/// Parse one flat-file record
pub fn parse_billing_record(record: &StringRecord) -> Result<BillingData, String> {
    if record.len() != BillingData::FIELD_COUNT {
        return Err(format!(
            "expected {} fields, found {}",
            BillingData::FIELD_COUNT,
            record.len()
        ));
    }

    fn field<T: std::str::FromStr>(record: &StringRecord, index: usize, name: &str) -> Result<T, String> {
        let raw = record.get(index).unwrap_or_default().trim();
        raw.parse()
            .map_err(|_| format!("invalid {} '{}'", name, raw))
    }

    Ok(BillingData {
        data_year: field(record, 0, "dataYear")?,
        data_month: field(record, 1, "dataMonth")?,
        account_id: field(record, 2, "accountId")?,
        phone_number: record.get(3).unwrap_or_default().trim().to_string(),
        data_usage: field(record, 4, "dataUsage")?,
        call_duration: field(record, 5, "callDuration")?,
        sms_count: field(record, 6, "smsCount")?,
    })
}

#[async_trait]
impl ItemReader<BillingData> for BillingFileReader {
    async fn open(&mut self, ctx: &StepContext) -> anyhow::Result<()> {
        let path = self.location.resolve(ctx)?;
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        info!(
            step = %ctx.step_name,
            bytes = content.len(),
            "Reading billing records from {}",
            path.display()
        );
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(content));
        self.reader = Some(reader);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<BillingData>, ItemError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ItemError::internal("reader is not open"))?;

        let line = reader.position().line();
        match reader.read_record(&mut self.record) {
            Ok(false) => Ok(None),
            Ok(true) => {
                let line = self.record.position().map_or(line, |p| p.line());
                let raw = self.record.iter().collect::<Vec<_>>().join(",");
                parse_billing_record(&self.record).map(Some).map_err(|reason| {
                    ItemError::parse(format!("Parsing error at line: {}, {}", line, reason))
                        .with_input(raw)
                })
            }
            Err(e) => Err(ItemError::parse(format!("Parsing error at line: {}, {}", line, e))),
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Writes report lines, one chunk per append.
///
/// A failed chunk is truncated away so the file only ever holds committed
/// chunks.
pub struct ReportFileWriter {
    location: FileLocation,
    path: Option<PathBuf>,
    file: Option<tokio::fs::File>,
}

impl ReportFileWriter {
    pub fn new(location: FileLocation) -> Self {
        Self {
            location,
            path: None,
            file: None,
        }
    }
}

/// Render report lines: the billing fields followed by the total
pub fn format_report_lines(items: &[ReportingData]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for item in items {
        let mut fields = item.billing_data.to_fields().to_vec();
        fields.push(item.billing_total.to_string());
        writer.write_record(&fields)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// The error for a failed chunk append, noting when the file could not be
/// truncated back to its last committed length
fn write_failure(err: std::io::Error, committed: u64, restored: std::io::Result<()>) -> ItemError {
    let mut message = format!("Failed to write report chunk: {}", err);
    if let Err(restore_err) = restored {
        error!(
            committed,
            "Report file could not be rolled back, it may hold a partial chunk: {}",
            restore_err
        );
        message.push_str(&format!(
            "; rollback to {} bytes failed: {}",
            committed, restore_err
        ));
    }
    ItemError::sink_write(message)
}

async fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

#[async_trait]
impl ItemWriter<ReportingData> for ReportFileWriter {
    async fn open(&mut self, ctx: &StepContext) -> anyhow::Result<()> {
        let path = self.location.resolve(ctx)?;
        create_parent_dir(&path).await?;
        let file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!(step = %ctx.step_name, "Writing report to {}", path.display());
        self.file = Some(file);
        self.path = Some(path);
        Ok(())
    }

    async fn write(&mut self, items: &[ReportingData]) -> Result<(), ItemError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ItemError::sink_write("report file is not open"))?;

        let bytes = format_report_lines(items)
            .map_err(|e| ItemError::sink_write(format!("Failed to format report lines: {}", e)))?;

        let committed = file
            .metadata()
            .await
            .map_err(|e| ItemError::sink_write(e.to_string()))?
            .len();

        let result = async {
            file.write_all(&bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            // put the file back the way the last commit left it
            let restored = async {
                file.set_len(committed).await?;
                file.seek(std::io::SeekFrom::Start(committed)).await?;
                Ok::<(), std::io::Error>(())
            }
            .await;
            return Err(write_failure(e, committed, restored));
        }

        debug!(lines = items.len(), "Appended report chunk");
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all().await.with_context(|| {
                format!(
                    "Failed to sync {}",
                    self.path.as_deref().unwrap_or(Path::new("report")).display()
                )
            })?;
        }
        Ok(())
    }
}
