use anyhow::Context as _;
use clap::Args;
use log::info;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use super::{Context, Execution, execute};
use crate::config::DateRange;
use crate::geojson;
use crate::openeo::{DataCube, JobSpec, Udf, VectorCube};

const COLLECTION: &str = "SENTINEL2_L2A_SENTINELHUB";
const BANDS: [&str; 8] = [
    "B03",
    "B04",
    "B08",
    "sunAzimuthAngles",
    "sunZenithAngles",
    "viewAzimuthMean",
    "viewZenithMean",
    "SCL",
];

#[derive(Debug, Args)]
pub struct DemArgs {
    /// GeoJSON based file that contains the input fields to process
    #[arg(short, long)]
    pub file: PathBuf,

    /// Generate the results in batch mode
    #[arg(short, long)]
    pub batch: bool,

    /// File path where to store the results
    #[arg(short, long, default_value = "../files/dem")]
    pub output: PathBuf,

    /// Start date of the interval (YYYY-MM-DD)
    #[arg(short, long, default_value = "2023-01-01")]
    pub start: String,

    /// End date of the interval (YYYY-MM-DD)
    #[arg(short, long, default_value = "2023-01-10")]
    pub end: String,
}

/// Sentinel-2 bands over `range`, masked by the bounding boxes of `fields`.
pub fn build(fields: Value, range: &DateRange, udf_dir: &Path) -> anyhow::Result<DataCube> {
    let bbox = VectorCube::run_udf(fields, &Udf::from_file(udf_dir, "create_bbox.py")?);
    let cube = DataCube::load_collection(COLLECTION, Some(&BANDS))
        .filter_temporal(range)
        .mask_polygon(&bbox);
    Ok(cube)
}

fn job_spec() -> JobSpec {
    JobSpec::new("Variability Map", "GTiff").with_format_options(json!({"sample_by_feature": false}))
}

impl DemArgs {
    pub fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let range = DateRange::parse(&self.start, &self.end)?;
        let fields = geojson::read_geojson(&self.file)
            .with_context(|| format!("Cannot read fields from {}", self.file.display()))?;

        info!("Building Sentinel-2 cube for {} over {}", self.file.display(), range);
        let cube = build(fields, &range, ctx.config.udf_dir())?;

        execute(ctx, &cube, &Execution::from_flags(self.batch, &self.output, job_spec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_build_masks_bands_with_bbox_udf() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("create_bbox.py"), "# bbox udf").unwrap();
        let fields = json!({"type": "FeatureCollection", "features": []});
        let range = DateRange::parse("2023-01-01", "2023-01-10").unwrap();

        let graph = build(fields, &range, dir.path()).unwrap().flat_graph();

        let load = &graph["loadcollection1"]["arguments"];
        assert_eq!(load["id"], COLLECTION);
        assert_eq!(load["bands"].as_array().unwrap().len(), 8);
        assert_eq!(graph["runudf1"]["arguments"]["udf"], "# bbox udf");
        assert_eq!(
            graph["maskpolygon1"]["arguments"]["data"],
            json!({"from_node": "filtertemporal1"})
        );
        assert_eq!(graph["maskpolygon1"]["result"], json!(true));
    }

    #[test]
    fn test_missing_udf_fails() {
        let dir = tempdir().unwrap();
        let range = DateRange::parse("2023-01-01", "2023-01-10").unwrap();
        assert!(build(json!({}), &range, dir.path()).is_err());
    }

    #[test]
    fn test_job_spec() {
        let spec = job_spec();
        assert_eq!(spec.title, "Variability Map");
        assert_eq!(spec.format_options["sample_by_feature"], json!(false));
        assert!(spec.job_options.is_none());
    }
}
