use log::info;

use crate::readers::Raster;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStatistics {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub valid: usize,
    pub total: usize,
}

pub fn raster_statistics(raster: &Raster) -> RasterStatistics {
    let total = raster.buffer.len();
    let (min, max, sum, valid) = raster.valid_values().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0.0f64, 0usize),
        |(min, max, sum, n), v| (min.min(v), max.max(v), sum + v as f64, n + 1),
    );

    if valid == 0 {
        return RasterStatistics {
            min: f32::NAN,
            max: f32::NAN,
            mean: f32::NAN,
            valid,
            total,
        };
    }

    RasterStatistics {
        min,
        max,
        mean: (sum / valid as f64) as f32,
        valid,
        total,
    }
}

pub fn log_raster_statistics(label: &str, raster: &Raster) {
    let stats = raster_statistics(raster);
    info!("{} - {} x {} cells", label, raster.width, raster.height);
    info!("  Min: {:.2} m", stats.min);
    info!("  Max: {:.2} m", stats.max);
    info!("  Mean: {:.2} m", stats.mean);
    info!(
        "  Valid pixels: {} / {} ({:.1}%)",
        stats.valid,
        stats.total,
        if stats.total == 0 {
            0.0
        } else {
            100.0 * stats.valid as f32 / stats.total as f32
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::GeoTransform;

    #[test]
    fn test_statistics_skip_nodata() {
        let raster = Raster::new(
            2,
            2,
            vec![1.0, 3.0, -9999.0, f32::NAN],
            GeoTransform::default(),
        )
        .unwrap()
        .with_nodata(-9999.0);

        let stats = raster_statistics(&raster);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!((stats.valid, stats.total), (2, 4));
    }

    #[test]
    fn test_statistics_of_empty_raster() {
        let raster = Raster::new(1, 1, vec![f32::NAN], GeoTransform::default()).unwrap();
        let stats = raster_statistics(&raster);
        assert!(stats.mean.is_nan());
        assert_eq!(stats.valid, 0);
    }
}
