mod adjust;
mod dem;
mod terrain;
mod timeseries;
mod variability;

use anyhow::Context as _;
use clap::{Args, Subcommand};
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::bbox::{self, BBOX_BUFFER};
use crate::config::Config;
use crate::geojson;
use crate::openeo::{Connection, DataCube, FlatGraph, JobSpec, OpenEoError};

pub use adjust::AdjustArgs;
pub use dem::DemArgs;
pub use terrain::TerrainArgs;
pub use timeseries::TimeSeriesArgs;
pub use variability::VariabilityArgs;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sentinel-2 bands masked by the buffered bounding box of the fields.
    Dem(DemArgs),
    /// DEM merged with the geoid and adjusted to ground control points.
    Terrain(TerrainArgs),
    /// Variability map of the fields from the published process.
    Variability(VariabilityArgs),
    /// Time series of every field from the time-series service.
    Timeseries(TimeSeriesArgs),
    /// Shift a local DEM GeoTIFF by its median offset to ground control points.
    Adjust(AdjustArgs),
    /// Print the buffered bounding boxes of the fields as GeoJSON.
    Bbox(BboxArgs),
}

/// State shared by every subcommand.
pub struct Context {
    pub config: Config,
    pub dry_run: bool,
}

impl Command {
    pub fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        match self {
            Command::Dem(args) => args.run(ctx),
            Command::Terrain(args) => args.run(ctx),
            Command::Variability(args) => args.run(ctx),
            Command::Timeseries(args) => args.run(ctx),
            Command::Adjust(args) => args.run(),
            Command::Bbox(args) => args.run(),
        }
    }
}

#[derive(Debug, Args)]
pub struct BboxArgs {
    /// GeoJSON file with the field geometries
    pub file: PathBuf,

    /// Buffer around each bounding box, in the units of the file CRS
    #[arg(long, default_value_t = BBOX_BUFFER)]
    pub buffer: f64,
}

impl BboxArgs {
    fn run(&self) -> anyhow::Result<()> {
        let fields = geojson::read_geojson(&self.file)?;
        let buffered = bbox::buffer_features(&fields, self.buffer)
            .with_context(|| format!("Cannot buffer the fields of {}", self.file.display()))?;
        println!("{}", serde_json::to_string_pretty(&buffered)?);
        Ok(())
    }
}

/// How a remote pipeline is executed and where its results go.
pub enum Execution {
    /// `POST /result`, response written to `path`.
    Sync { path: PathBuf, format: String },
    /// Batch job whose assets are downloaded into `dir`.
    Batch { spec: JobSpec, dir: PathBuf },
}

impl Execution {
    /// Synchronous GeoTIFF download to `{output}/result.tiff`, or a batch job.
    pub fn from_flags(batch: bool, output: &Path, spec: JobSpec) -> Self {
        if batch {
            Execution::Batch {
                spec,
                dir: output.to_path_buf(),
            }
        } else {
            Execution::Sync {
                path: output.join("result.tiff"),
                format: "GTiff".to_string(),
            }
        }
    }

    /// Graph that will be sent, ending in `save_result`.
    fn final_graph(&self, cube: &DataCube) -> FlatGraph {
        let cube = match self {
            Execution::Sync { format, .. } => cube.ensure_save_result(format, json!({})),
            Execution::Batch { spec, .. } => {
                cube.ensure_save_result(&spec.format, spec.format_options.clone())
            }
        };
        cube.flat_graph()
    }
}

pub fn print_graph(graph: &FlatGraph) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(graph)?);
    Ok(())
}

/// Connection to the configured back-end, authenticated with the configured credentials.
pub fn connect(config: &Config) -> Result<Connection, OpenEoError> {
    let mut connection = Connection::connect(config.backend_url(), config.request_timeout())?;
    connection.authenticate(config.auth())?;
    Ok(connection)
}

/// Runs `cube` as described by `execution`, or only prints its graph on a dry run.
pub fn execute(ctx: &Context, cube: &DataCube, execution: &Execution) -> anyhow::Result<()> {
    if ctx.dry_run {
        return print_graph(&execution.final_graph(cube));
    }

    let connection = connect(&ctx.config)
        .with_context(|| format!("Cannot connect to {}", ctx.config.backend_url()))?;

    match execution {
        Execution::Sync { path, format } => {
            connection
                .download(cube, path, format)
                .with_context(|| format!("Synchronous execution to {} failed", path.display()))?;
        }
        Execution::Batch { spec, dir } => {
            let job = connection.create_job(cube, spec)?;
            job.start_and_wait(ctx.config.poll_interval())?;
            let files = job
                .download_results(dir)
                .with_context(|| format!("Cannot download results of job {}", job.job_id()))?;
            info!("Job {} produced {} file(s) in {}", job.job_id(), files.len(), dir.display());
        }
    }
    Ok(())
}
