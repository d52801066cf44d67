use anyhow::Context as _;
use clap::Args;
use log::info;
use serde_json::{Value, json};
use std::path::PathBuf;

use super::{Context, Execution, execute};
use crate::config::DateRange;
use crate::geojson;
use crate::openeo::{Argument, DataCube, JobSpec};

const PROCESS_ID: &str = "variability_map";
const NAMESPACE: &str =
    "https://openeo.vito.be/openeo/1.1/processes/u:bramjanssen/variability_map";

#[derive(Debug, Args)]
pub struct VariabilityArgs {
    /// GeoJSON based file that contains the input fields to process
    #[arg(short, long)]
    pub file: PathBuf,

    /// Start date of the interval for which to generate the variability maps
    #[arg(short, long)]
    pub start: String,

    /// End date of the interval for which to generate the variability maps
    #[arg(short, long)]
    pub end: String,

    /// Generate the results in batch mode
    #[arg(short, long)]
    pub batch: bool,

    /// Generate the raw results for the variability map
    #[arg(short, long)]
    pub raw: bool,

    /// File path where to store the results
    #[arg(short, long, default_value = "../files/variability")]
    pub output: PathBuf,
}

pub fn variability_map(polygon: Value, range: &DateRange, raw: bool) -> DataCube {
    DataCube::from_process(
        PROCESS_ID,
        Some(NAMESPACE),
        [
            ("polygon", Argument::Value(polygon)),
            ("date", Argument::Value(json!(range))),
            ("raw", Argument::from(raw)),
        ],
    )
}

impl VariabilityArgs {
    pub fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let range = DateRange::parse(&self.start, &self.end)?;
        let polygon = geojson::read_geojson(&self.file)
            .with_context(|| format!("Cannot read fields from {}", self.file.display()))?;

        info!("Variability map of {} over {} (raw: {})", self.file.display(), range, self.raw);
        let cube = variability_map(polygon, &range, self.raw);
        let spec = JobSpec::new("Variability Map", "GTiff")
            .with_format_options(json!({"sample_by_feature": false}));

        execute(ctx, &cube, &Execution::from_flags(self.batch, &self.output, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variability_map_call() {
        let polygon = json!({"type": "FeatureCollection", "features": []});
        let range = DateRange::parse("2022-03-01", "2022-09-30").unwrap();
        let graph = variability_map(polygon.clone(), &range, true).flat_graph();

        assert_eq!(graph.len(), 1);
        let node = &graph["variabilitymap1"];
        assert_eq!(node["process_id"], PROCESS_ID);
        assert_eq!(node["namespace"], NAMESPACE);
        assert_eq!(node["arguments"]["polygon"], polygon);
        assert_eq!(node["arguments"]["date"], json!(["2022-03-01", "2022-09-30"]));
        assert_eq!(node["arguments"]["raw"], json!(true));
        assert_eq!(node["result"], json!(true));
    }
}
