use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::client::Connection;
use super::error::{OpenEoError, Result};

/// Delay before the first status poll after starting a job.
const FIRST_POLL_DELAY: Duration = Duration::from_secs(5);

/// Number of error log entries reported when a job fails.
const MAX_FAILURE_LOGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Canceled,
    Finished,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Canceled | JobStatus::Finished | JobStatus::Error
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Canceled => "canceled",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Deserialize)]
struct JobMetadata {
    status: JobStatus,
    #[serde(default)]
    progress: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    assets: BTreeMap<String, Asset>,
}

/// Polls `status` until it reports a terminal state.
///
/// `sleep` is called with the first-poll delay, then with `interval` between polls.
pub(crate) fn wait_until_terminal<S, W>(
    mut status: S,
    mut sleep: W,
    interval: Duration,
) -> Result<JobStatus>
where
    S: FnMut() -> Result<JobStatus>,
    W: FnMut(Duration),
{
    sleep(FIRST_POLL_DELAY);
    let mut previous = None;
    loop {
        let current = status()?;
        if previous != Some(current) {
            info!("Job status: {}", current);
            previous = Some(current);
        }
        if current.is_terminal() {
            return Ok(current);
        }
        sleep(interval);
    }
}

/// Handle to a batch job on the back-end.
pub struct BatchJob<'a> {
    connection: &'a Connection,
    job_id: String,
}

impl<'a> BatchJob<'a> {
    pub fn new(connection: &'a Connection, job_id: String) -> Self {
        Self {
            connection,
            job_id,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn start(&self) -> Result<()> {
        self.connection
            .post_json(&format!("/jobs/{}/results", self.job_id), &Value::Null)?;
        info!("Started job {}", self.job_id);
        Ok(())
    }

    pub fn status(&self) -> Result<JobStatus> {
        let metadata: JobMetadata = self.connection.get_json(&format!("/jobs/{}", self.job_id))?;
        if let Some(progress) = metadata.progress {
            debug!("Job {} progress: {:.0}%", self.job_id, progress);
        }
        Ok(metadata.status)
    }

    pub fn logs(&self) -> Result<Vec<LogEntry>> {
        let response: LogsResponse = self
            .connection
            .get_json(&format!("/jobs/{}/logs", self.job_id))?;
        Ok(response.logs)
    }

    /// Starts the job and blocks until it finishes; failures carry the job's error logs.
    pub fn start_and_wait(&self, poll_interval: Duration) -> Result<()> {
        self.start()?;
        let status = wait_until_terminal(|| self.status(), thread::sleep, poll_interval)?;
        if status == JobStatus::Finished {
            return Ok(());
        }

        let logs = match self.logs() {
            Ok(entries) => failure_logs(&entries),
            Err(e) => {
                warn!("Could not fetch logs of job {}: {}", self.job_id, e);
                Vec::new()
            }
        };
        Err(OpenEoError::JobFailed {
            job_id: self.job_id.clone(),
            status,
            logs,
        })
    }

    pub fn results(&self) -> Result<BTreeMap<String, Asset>> {
        let response: ResultsResponse = self
            .connection
            .get_json(&format!("/jobs/{}/results", self.job_id))?;
        Ok(response.assets)
    }

    /// Downloads every result asset into `dir`, returning the written paths.
    pub fn download_results(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (name, asset) in self.results()? {
            let Some(file_name) = asset_file_name(&name) else {
                warn!("Skipping asset with unusable name '{}'", name);
                continue;
            };
            let path = dir.join(file_name);
            let mut response = self.connection.get_absolute(&asset.href)?;
            let mut file = File::create(&path)?;
            response.copy_to(&mut file)?;
            info!(
                "Downloaded {} ({}) to {}",
                name,
                asset.media_type.as_deref().unwrap_or("unknown type"),
                path.display()
            );
            written.push(path);
        }
        Ok(written)
    }
}

/// Last error entries, or the last entries of any level when none is an error.
fn failure_logs(entries: &[LogEntry]) -> Vec<String> {
    let errors: Vec<&LogEntry> = entries.iter().filter(|e| e.level == "error").collect();
    let selected: Vec<&LogEntry> = if errors.is_empty() {
        entries.iter().collect()
    } else {
        errors
    };
    let skip = selected.len().saturating_sub(MAX_FAILURE_LOGS);
    selected
        .into_iter()
        .skip(skip)
        .map(|e| format!("[{}] {}", e.level, e.message))
        .collect()
}

// Asset names may contain directories; only the last component is kept.
// Names that would not stay inside the download directory yield `None`.
fn asset_file_name(name: &str) -> Option<&str> {
    let last = name.rsplit(['/', '\\']).next()?;
    match last {
        "" | "." | ".." => None,
        _ => Some(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parsing() {
        let metadata: JobMetadata =
            serde_json::from_value(json!({"id": "j-1", "status": "queued", "progress": 0})).unwrap();
        assert_eq!(metadata.status, JobStatus::Queued);
        assert!(!metadata.status.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(serde_json::from_value::<JobStatus>(json!("paused")).is_err());
    }

    #[test]
    fn test_wait_polls_until_finished() {
        let mut statuses = vec![
            JobStatus::Finished,
            JobStatus::Running,
            JobStatus::Running,
            JobStatus::Queued,
        ];
        let mut sleeps = Vec::new();

        let status = wait_until_terminal(
            || Ok(statuses.pop().unwrap()),
            |d| sleeps.push(d),
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(status, JobStatus::Finished);
        assert_eq!(
            sleeps,
            vec![
                FIRST_POLL_DELAY,
                Duration::from_secs(30),
                Duration::from_secs(30),
                Duration::from_secs(30)
            ]
        );
    }

    #[test]
    fn test_wait_stops_on_error_status() {
        let status =
            wait_until_terminal(|| Ok(JobStatus::Error), |_| {}, Duration::from_secs(1)).unwrap();
        assert_eq!(status, JobStatus::Error);
    }

    #[test]
    fn test_wait_propagates_poll_errors() {
        let result = wait_until_terminal(
            || Err(OpenEoError::MissingJobId),
            |_| {},
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(OpenEoError::MissingJobId)));
    }

    #[test]
    fn test_failure_logs_prefer_errors() {
        let response: LogsResponse = serde_json::from_value(json!({"logs": [
            {"id": "1", "level": "info", "message": "starting"},
            {"id": "2", "level": "error", "message": "UDF failed"},
            {"id": "3", "level": "info", "message": "stopping"}
        ]}))
        .unwrap();
        assert_eq!(failure_logs(&response.logs), vec!["[error] UDF failed"]);

        let info_only = &response.logs[..1];
        assert_eq!(failure_logs(info_only), vec!["[info] starting"]);
    }

    #[test]
    fn test_results_assets() {
        let response: ResultsResponse = serde_json::from_value(json!({
            "assets": {
                "openEO.tif": {"href": "https://example.org/jobs/j-1/results/openEO.tif", "type": "image/tiff; application=geotiff"}
            }
        }))
        .unwrap();
        assert_eq!(response.assets.len(), 1);
        assert!(response.assets["openEO.tif"].href.ends_with("openEO.tif"));
        assert_eq!(asset_file_name("out/openEO_2023.nc"), Some("openEO_2023.nc"));
    }

    #[test]
    fn test_asset_names_stay_in_download_dir() {
        assert_eq!(asset_file_name("openEO.tif"), Some("openEO.tif"));
        assert_eq!(asset_file_name("../../etc/openEO.tif"), Some("openEO.tif"));
        assert_eq!(asset_file_name(r"..\\openEO.tif"), Some("openEO.tif"));
        assert_eq!(asset_file_name(""), None);
        assert_eq!(asset_file_name(".."), None);
        assert_eq!(asset_file_name("out/.."), None);
        assert_eq!(asset_file_name("out/"), None);
        assert_eq!(asset_file_name("."), None);

        let dir = Path::new("results");
        for name in ["a/../b.nc", "../b.nc", "b.nc"] {
            let path = dir.join(asset_file_name(name).unwrap());
            assert_eq!(path, dir.join("b.nc"));
        }
    }
}
