use anyhow::Context as _;
use clap::Args;
use log::info;
use std::path::{Path, PathBuf};

use crate::elevation::{self, GroundControlPoint};
use crate::geojson;
use crate::readers::{self, Raster, write_geotiff};
use crate::utils::log_raster_statistics;

#[derive(Debug, Args)]
pub struct AdjustArgs {
    /// Single-band DEM GeoTIFF
    pub dem: PathBuf,

    /// GeoJSON file with x, y, z coordinates from GCP measurement
    pub gcp: PathBuf,

    /// Adjusted GeoTIFF to write
    pub output: PathBuf,
}

/// Shifts `raster` by its median offset to `gcps`, returning the offset.
pub fn adjust_dem(raster: &mut Raster, gcps: &[GroundControlPoint]) -> anyhow::Result<f64> {
    let offset = elevation::median_offset(raster, gcps)?;
    elevation::adjust_raster(raster, offset);
    Ok(offset)
}

fn read_dem(path: &Path) -> anyhow::Result<Raster> {
    let reader = readers::create_reader(path)?;
    let raster = reader
        .read_data()
        .with_context(|| format!("Cannot read DEM {}", path.display()))?;
    Ok(raster)
}

impl AdjustArgs {
    pub fn run(&self) -> anyhow::Result<()> {
        let mut raster = read_dem(&self.dem)?;
        log_raster_statistics("Input DEM", &raster);

        let document = geojson::read_geojson(&self.gcp)
            .with_context(|| format!("Cannot read GCPs from {}", self.gcp.display()))?;
        let gcps = elevation::parse_gcps(&document)?;
        info!("Read {} ground control points", gcps.len());

        let offset = adjust_dem(&mut raster, &gcps)?;
        info!("Median offset to GCPs: {:.3} m", offset);
        log_raster_statistics("Adjusted DEM", &raster);

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        write_geotiff(&raster, &self.output)
            .with_context(|| format!("Cannot write {}", self.output.display()))?;
        info!("Wrote adjusted DEM to {}", self.output.display());
        Ok(())
    }
}
