//! Timing of the raw time-series endpoint, one request per field.

use anyhow::Context as _;
use clap::Args;
use log::{debug, info};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::Context;
use crate::config::DateRange;
use crate::geojson;

#[derive(Debug)]
pub enum TimeSeriesError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    Io(std::io::Error),
    Json(serde_json::Error),
    MissingGeometry(usize),
}

impl fmt::Display for TimeSeriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSeriesError::Http(e) => write!(f, "HTTP error: {}", e),
            TimeSeriesError::Status { status, body } => {
                write!(f, "Could not execute request: {} - {}", status, body)
            }
            TimeSeriesError::Io(e) => write!(f, "I/O error: {}", e),
            TimeSeriesError::Json(e) => write!(f, "JSON error: {}", e),
            TimeSeriesError::MissingGeometry(index) => {
                write!(f, "feature {} has no geometry", index)
            }
        }
    }
}

impl std::error::Error for TimeSeriesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeSeriesError::Http(e) => Some(e),
            TimeSeriesError::Io(e) => Some(e),
            TimeSeriesError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TimeSeriesError {
    fn from(err: reqwest::Error) -> Self {
        TimeSeriesError::Http(err)
    }
}

impl From<std::io::Error> for TimeSeriesError {
    fn from(err: std::io::Error) -> Self {
        TimeSeriesError::Io(err)
    }
}

impl From<serde_json::Error> for TimeSeriesError {
    fn from(err: serde_json::Error) -> Self {
        TimeSeriesError::Json(err)
    }
}

#[derive(Debug, Args)]
pub struct TimeSeriesArgs {
    /// Collection for which to test the time series
    #[arg(short, long)]
    pub collection: String,

    /// GeoJSON based file that contains the input fields to process
    #[arg(short, long)]
    pub file: PathBuf,

    /// Start date of the interval (YYYY-MM-DD)
    #[arg(short, long)]
    pub start: String,

    /// End date of the interval (YYYY-MM-DD)
    #[arg(short, long)]
    pub end: String,

    /// Request every band of the collection
    #[arg(short, long)]
    pub multiband: bool,

    /// Directory where the JSON results are written
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

pub fn ts_url(host: &str, collection: &str, multiband: bool, range: &DateRange) -> String {
    format!(
        "{}/v1.0/ts/{}/geometry{}?startDate={}&endDate={}",
        host.trim_end_matches('/'),
        collection,
        if multiband { "/multiband" } else { "" },
        range.start_str(),
        range.end_str()
    )
}

/// POSTs `geometry` to `url`; anything but 200 is an error carrying the body.
pub fn exec_ts_request(client: &Client, url: &str, geometry: &Value) -> Result<Value, TimeSeriesError> {
    info!("{}", url);
    let response = client.post(url).json(geometry).send()?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(TimeSeriesError::Status {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        });
    }
    Ok(response.json()?)
}

/// `{collection}.json` for a single field, `{collection}_{index}.json` otherwise.
pub fn result_path(dir: &Path, collection: &str, index: usize, count: usize) -> PathBuf {
    if count == 1 {
        dir.join(format!("{}.json", collection))
    } else {
        dir.join(format!("{}_{}.json", collection, index))
    }
}

/// The geometry of a feature, a missing or `null` member being an error.
pub fn feature_geometry(feature: &Value, index: usize) -> Result<&Value, TimeSeriesError> {
    feature
        .get("geometry")
        .filter(|geometry| !geometry.is_null())
        .ok_or(TimeSeriesError::MissingGeometry(index))
}

pub fn write_result(path: &Path, values: Value, duration: Duration) -> Result<(), TimeSeriesError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let result = json!({
        "values": values,
        "duration": format!("{:.4}", duration.as_secs_f64()),
    });
    serde_json::to_writer(BufWriter::new(File::create(path)?), &result)?;
    Ok(())
}

impl TimeSeriesArgs {
    pub fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let range = DateRange::parse(&self.start, &self.end)?;
        let fields = geojson::read_geojson(&self.file)
            .with_context(|| format!("Cannot read fields from {}", self.file.display()))?;
        let features = geojson::features(&fields);
        let url = ts_url(ctx.config.timeseries_host(), &self.collection, self.multiband, &range);

        if ctx.dry_run {
            println!("{}", url);
            return Ok(());
        }

        let client = Client::builder()
            .timeout(ctx.config.request_timeout())
            .build()?;

        for (index, feature) in features.iter().enumerate() {
            let geometry = feature_geometry(feature, index)?;

            let tic = Instant::now();
            let values = exec_ts_request(&client, &url, geometry)?;
            let elapsed = tic.elapsed();

            let path = result_path(&self.output, &self.collection, index, features.len());
            write_result(&path, values, elapsed)?;
            info!(
                "Feature {} done in {:.4} s, written to {}",
                index,
                elapsed.as_secs_f64(),
                path.display()
            );
        }
        debug!("{} time series requests done", features.len());
        Ok(())
    }
}
