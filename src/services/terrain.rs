//! Adjusted DEM: Copernicus DEM plus the EGM2008 geoid over the field, shifted
//! to match ground control points by the `adjust_dem` UDF.
//!
//! The same pipeline can be published as the `test_DEM_gen` user-defined
//! process, with the field and GCPs as parameters.

use anyhow::Context as _;
use clap::Args;
use log::{debug, info};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use super::{Context, Execution, connect, execute};
use crate::geojson;
use crate::openeo::{
    Argument, DataCube, JobSpec, Parameter, Udf, VectorCube, build_process_dict,
};

pub const PROCESS_ID: &str = "test_DEM_gen";
const DESCRIPTION: &str = "test_desc";

#[derive(Debug, Args)]
pub struct TerrainArgs {
    /// Path to input GeoJSON file with field polygon
    pub input_field: PathBuf,

    /// Path to GeoJSON file with x, y, z coordinates from GCP measurement
    pub input_gcp: PathBuf,

    /// Path to output folder to save result file
    #[arg(default_value = ".")]
    pub output: PathBuf,

    /// Publish the DEM generation as a user-defined process
    #[arg(short, long)]
    pub publish: bool,

    /// Execute the service in batch mode
    #[arg(short, long)]
    pub batch: bool,

    /// Execute the published process instead of building the graph inline
    #[arg(short, long)]
    pub execute: bool,

    /// Resolution for final output DEM, in metres
    #[arg(short, long, default_value_t = 1.0)]
    pub resolution: f64,
}

/// Field input: inline GeoJSON, or the `field` parameter of the published process.
pub enum Input {
    Inline(Value),
    Parameter(Parameter),
}

impl Input {
    fn argument(&self) -> Argument {
        match self {
            Input::Inline(value) => Argument::Value(value.clone()),
            Input::Parameter(parameter) => parameter.reference(),
        }
    }
}

pub fn create_bbox(field: &Input, udf_dir: &Path) -> anyhow::Result<VectorCube> {
    Ok(VectorCube::run_udf(
        field.argument(),
        &Udf::from_file(udf_dir, "create_bbox.py")?,
    ))
}

/// Copernicus DEM and geoid summed into one `DEM` band, resampled to EPSG:3857.
pub fn get_dem(bbox: &VectorCube, resolution: f64) -> DataCube {
    debug!("Loading input DataCubes");
    let dem = DataCube::load_collection("COPERNICUS_30", None)
        .max_time()
        .mask_polygon(bbox);
    let geoid = DataCube::load_collection("EGM2008", None)
        .max_time()
        .mask_polygon(bbox)
        .resample_cube_spatial(&dem, "bilinear");

    dem.merge_cubes(&geoid)
        .reduce_dimension("bands", "sum")
        .add_dimension("bands", "DEM", "bands")
        .resample_spatial(resolution, 3857, "bilinear")
}

pub fn generate_dem(
    field: &Input,
    gcp: &Input,
    resolution: f64,
    udf_dir: &Path,
) -> anyhow::Result<DataCube> {
    info!("Starting the generation of adjusted DEM");
    let bbox = create_bbox(field, udf_dir)?;
    let merged = get_dem(&bbox, resolution);

    let context = match gcp {
        Input::Inline(value) => json!({"gcp": value}),
        Input::Parameter(parameter) => json!({"gcp": {"from_parameter": parameter.name}}),
    };
    let udf = Udf::from_file(udf_dir, "adjust_dem.py")?.with_context(context);
    Ok(merged.apply_udf(&udf))
}

fn parameters() -> [Parameter; 2] {
    [
        Parameter::geojson("field", "field"),
        Parameter::geojson("gcp", "gcp"),
    ]
}

/// The pipeline with `field` and `gcp` as process parameters.
pub fn parameterised_dem(resolution: f64, udf_dir: &Path) -> anyhow::Result<DataCube> {
    let [field, gcp] = parameters();
    generate_dem(
        &Input::Parameter(field),
        &Input::Parameter(gcp),
        resolution,
        udf_dir,
    )
}

/// Description of the published process, as stored by the back-end.
pub fn process_dict(process: &DataCube) -> Value {
    build_process_dict(PROCESS_ID, DESCRIPTION, process.flat_graph(), &parameters())
}

/// Call of the published process on inline field and GCP documents.
pub fn published_dem(field: Value, gcp: Value) -> DataCube {
    DataCube::from_process(
        PROCESS_ID,
        None,
        [("field", Argument::Value(field)), ("gcp", Argument::Value(gcp))],
    )
}

fn job_spec() -> JobSpec {
    JobSpec::new(&format!("{} Map", PROCESS_ID), "NetCDF").with_job_options(json!({
        "driver-memory": "5G",
        "driver-memoryOverhead": "2G",
        "driver-cores": "2",
        "executor-memory": "3G",
        "executor-memoryOverhead": "4G",
        "executor-cores": "4",
        "max-executors": "200",
        "task-cpus": "4"
    }))
}

impl TerrainArgs {
    pub fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        if self.publish {
            return self.publish_process(ctx);
        }

        let field = geojson::read_geojson(&self.input_field)
            .with_context(|| format!("Cannot read field from {}", self.input_field.display()))?;
        let gcp = geojson::read_geojson(&self.input_gcp)
            .with_context(|| format!("Cannot read GCPs from {}", self.input_gcp.display()))?;

        let cube = if self.execute {
            published_dem(field, gcp)
        } else {
            generate_dem(
                &Input::Inline(field),
                &Input::Inline(gcp),
                self.resolution,
                ctx.config.udf_dir(),
            )?
        };

        execute(ctx, &cube, &Execution::from_flags(self.batch, &self.output, job_spec()))
    }

    fn publish_process(&self, ctx: &Context) -> anyhow::Result<()> {
        let process = parameterised_dem(self.resolution, ctx.config.udf_dir())?;
        let dict = process_dict(&process);
        if ctx.dry_run {
            println!("{}", serde_json::to_string_pretty(&dict)?);
            return Ok(());
        }

        let connection = connect(&ctx.config)?;
        connection
            .save_user_defined_process(
                PROCESS_ID,
                process.flat_graph(),
                &parameters(),
                DESCRIPTION,
                false,
            )
            .with_context(|| format!("Cannot publish {}", PROCESS_ID))?;
        debug!("{}", dict);
        Ok(())
    }
}
