//! Test: The billing job end to end

use billing_batch::billing::job::{
    FILE_INGESTION_STEP, FILE_PREPARATION_STEP, REPORT_GENERATION_STEP,
};
use billing_batch::billing::table::count_billing_rows;
use billing_batch::billing::{
    BillingJobBuilder, FlakyPricingService, JobConfig, Pricing, PricingService,
};
use billing_batch::core::{BatchError, BatchStatus};
use billing_batch::execution::JobExecutor;
use billing_batch::persistence::store::connect;
use billing_batch::persistence::SqliteJobRepository;
use billing_batch::{JobExecution, JobParameters, JobRepository};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const BAD_LINES: [&str; 3] = ["2023,1,oops", "garbage", "2023,1,42,555-0042,lots,1,1"];

/// January 2023 line for account 1000 + i, billing 1.1 * i + 1
fn billing_line(i: u32) -> String {
    format!("2023,1,{},555-{:04},{}.0,{},10\n", 1000 + i, i, i * 10, i * 2)
}

/// 200 lines for January 2023, one for February, and the bad lines spread in
/// between. Lines 136..=200 reach 150.
fn billing_file(dir: &Path) -> PathBuf {
    let mut content = String::new();
    for i in 1..=200 {
        content.push_str(&billing_line(i));
        match i {
            20 => content.push_str(&format!("{}\n", BAD_LINES[0])),
            90 => content.push_str(&format!("{}\n", BAD_LINES[1])),
            150 => content.push_str(&format!("{}\n", BAD_LINES[2])),
            _ => {}
        }
    }
    content.push_str("2023,2,9999,555-9999,50000.0,900,900\n");

    let path = dir.join("billing-2023-01.csv");
    std::fs::write(&path, content).unwrap();
    path
}

struct Fixture {
    dir: TempDir,
    config: JobConfig,
    pool: SqlitePool,
    repository: Arc<SqliteJobRepository>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = JobConfig {
            staging_dir: dir.path().join("staging"),
            ..JobConfig::default()
        };
        let pool = connect("sqlite::memory:").await.unwrap();
        let repository = Arc::new(SqliteJobRepository::with_pool(pool.clone()).await.unwrap());
        Self {
            dir,
            config,
            pool,
            repository,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn parameters(&self, input: &Path) -> JobParameters {
        JobParameters::builder()
            .add_string("input.file", input.display().to_string())
            .add_string("output.file", self.path("report.csv").display().to_string())
            .add_string("skip.file", self.path("skipped.psv").display().to_string())
            .add_int("data.year", 2023)
            .add_int("data.month", 1)
            .build()
    }

    async fn run(
        &self,
        pricing: Arc<dyn PricingService>,
        parameters: JobParameters,
    ) -> Result<JobExecution, BatchError> {
        let mut job = BillingJobBuilder::new(&self.config, self.pool.clone())
            .pricing(pricing)
            .build(&parameters);
        JobExecutor::new(self.repository.clone())
            .run(&mut job, parameters)
            .await
    }

    fn report_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.path("report.csv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn reliable() -> Arc<dyn PricingService> {
    Arc::new(FlakyPricingService::reliable(Pricing::default()))
}

#[tokio::test]
async fn test_billing_job_with_reliable_pricing() {
    let fixture = Fixture::new().await;
    let input = billing_file(fixture.dir.path());

    let execution = fixture
        .run(reliable(), fixture.parameters(&input))
        .await
        .unwrap();

    assert_eq!(execution.status, BatchStatus::Completed, "{:?}", execution.failure_exceptions);
    assert!(fixture.config.staging_dir.join("billing-2023-01.csv").exists());

    let ingestion = execution.step_execution(FILE_INGESTION_STEP).unwrap();
    assert_eq!(ingestion.read_count, 201);
    assert_eq!(ingestion.write_count, 201);
    assert_eq!(ingestion.read_skip_count, 3);
    assert_eq!(ingestion.commit_count, 3);
    assert_eq!(count_billing_rows(&fixture.pool).await.unwrap(), 201);

    let skipped = std::fs::read_to_string(fixture.path("skipped.psv")).unwrap();
    assert_eq!(skipped.lines().collect::<Vec<_>>(), BAD_LINES.to_vec());

    let report = execution.step_execution(REPORT_GENERATION_STEP).unwrap();
    assert_eq!(report.read_count, 200);
    assert_eq!(report.filter_count, 135);
    assert_eq!(report.write_count, 65);
    assert_eq!(report.retry_count, 0);

    let lines = fixture.report_lines();
    assert_eq!(lines.len() as u64, report.write_count);
    assert!(lines[0].starts_with("2023,1,1136,555-0136,1360,272,10,"));
    for line in &lines {
        let total: f64 = line.rsplit(',').next().unwrap().parse().unwrap();
        assert!(total >= 150.0, "{}", line);
    }
}

#[tokio::test]
async fn test_billing_job_with_flaky_pricing_retries() {
    let fixture = Fixture::new().await;
    let input = billing_file(fixture.dir.path());
    let pricing = Arc::new(FlakyPricingService::new(Pricing::default(), 1.0 / 7.0));

    let execution = fixture
        .run(pricing, fixture.parameters(&input))
        .await
        .unwrap();

    assert_eq!(execution.status, BatchStatus::Completed, "{:?}", execution.failure_exceptions);
    let report = execution.step_execution(REPORT_GENERATION_STEP).unwrap();
    assert!(report.retry_count > 0);
    assert_eq!(report.process_skip_count, 0);
    assert_eq!(report.write_count, 65);
    assert_eq!(fixture.report_lines().len(), 65);
}

#[tokio::test]
async fn test_billing_job_restarts_after_missing_input() {
    let fixture = Fixture::new().await;
    let input = fixture.path("billing-2023-01.csv");
    let parameters = fixture.parameters(&input);

    let first = fixture.run(reliable(), parameters.clone()).await.unwrap();
    assert_eq!(first.status, BatchStatus::Failed);
    assert_eq!(first.step_executions.len(), 1);
    assert!(first.failure_exceptions[0].contains("Failed to copy"));

    billing_file(fixture.dir.path());
    let second = fixture.run(reliable(), parameters.clone()).await.unwrap();
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(fixture.report_lines().len(), 65);

    let history = fixture
        .repository
        .instance_executions(&second.job_name, &second.instance_key)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);

    let third = fixture.run(reliable(), parameters).await;
    assert!(matches!(
        third,
        Err(BatchError::JobInstanceAlreadyComplete { .. })
    ));
}

#[tokio::test]
async fn test_billing_job_fails_past_parse_skip_limit() {
    let fixture = Fixture::new().await;
    let mut content = String::new();
    for i in 0..11 {
        content.push_str(&format!("not,a,record,{}\n", i));
    }
    let input = fixture.path("broken.csv");
    std::fs::write(&input, content).unwrap();

    let execution = fixture
        .run(reliable(), fixture.parameters(&input))
        .await
        .unwrap();

    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(execution.failed_step().unwrap().step_name, FILE_INGESTION_STEP);
    assert!(execution.failure_exceptions[0].contains("skip limit of 10"));
    assert!(execution.step_execution(REPORT_GENERATION_STEP).is_none());
    assert_eq!(count_billing_rows(&fixture.pool).await.unwrap(), 0);
}

/// Rows committed before an ingestion failure are not inserted again on restart
#[tokio::test]
async fn test_restarted_ingestion_does_not_duplicate_rows() {
    let fixture = Fixture::new().await;
    let good: String = (1..=150).map(billing_line).collect();
    let mut broken = good.clone();
    for i in 0..11 {
        broken.push_str(&format!("not,a,record,{}\n", i));
    }
    let input = fixture.path("billing-2023-01.csv");
    std::fs::write(&input, broken).unwrap();
    let parameters = fixture.parameters(&input);

    let first = fixture.run(reliable(), parameters.clone()).await.unwrap();
    assert_eq!(first.status, BatchStatus::Failed);
    assert_eq!(first.failed_step().unwrap().step_name, FILE_INGESTION_STEP);
    assert_eq!(count_billing_rows(&fixture.pool).await.unwrap(), 100);

    // the staging step already completed, so the staged copy is what gets re-read
    let staged = fixture.config.staging_dir.join("billing-2023-01.csv");
    std::fs::write(&staged, good).unwrap();
    let second = fixture.run(reliable(), parameters).await.unwrap();

    assert_eq!(second.status, BatchStatus::Completed, "{:?}", second.failure_exceptions);
    assert!(second.step_execution(FILE_PREPARATION_STEP).is_none());
    assert_eq!(count_billing_rows(&fixture.pool).await.unwrap(), 150);
    let report = second.step_execution(REPORT_GENERATION_STEP).unwrap();
    assert_eq!(report.read_count, 150);
    // lines 136..=150 reach the threshold
    assert_eq!(report.write_count, 15);
    assert_eq!(fixture.report_lines().len(), 15);
}
