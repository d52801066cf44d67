use std::fmt;

use super::FileType;

pub trait DataReader {
    fn read_data(&self) -> Result<Raster, ReadError>;
}

#[derive(Debug)]
pub enum ReadError {
    Io(std::io::Error),
    GeoTiff(String),
    InvalidDimensions { width: u32, height: u32, len: usize },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Io(e) => write!(f, "I/O error: {}", e),
            ReadError::GeoTiff(msg) => write!(f, "GeoTIFF error: {}", msg),
            ReadError::InvalidDimensions { width, height, len } => write!(
                f,
                "buffer of {} values does not match a {}x{} raster",
                len, width, height
            ),
        }
    }
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
    fn from(err: std::io::Error) -> Self {
        ReadError::Io(err)
    }
}

#[derive(Debug)]
pub enum FileError {
    UnknownFileType,
    Unsupported(FileType),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::UnknownFileType => write!(f, "unknown raster file type"),
            FileError::Unsupported(kind) => {
                write!(f, "{:?} rasters cannot be read locally, download as GTiff", kind)
            }
        }
    }
}

impl std::error::Error for FileError {}

/// North-up affine transform from pixel to map coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Fractional (column, row) of a map coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// Single-band georeferenced grid, row-major.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub buffer: Vec<f32>,
    pub transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f32>,
}

impl Raster {
    pub fn new(
        width: u32,
        height: u32,
        buffer: Vec<f32>,
        transform: GeoTransform,
    ) -> Result<Self, ReadError> {
        if buffer.len() != width as usize * height as usize {
            return Err(ReadError::InvalidDimensions {
                width,
                height,
                len: buffer.len(),
            });
        }

        Ok(Self {
            width,
            height,
            buffer,
            transform,
            epsg: None,
            nodata: None,
        })
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn is_valid(&self, value: f32) -> bool {
        !value.is_nan() && self.nodata != Some(value)
    }

    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.buffer
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Value of the cell covering `(x, y)`, in raster CRS.
    ///
    /// `None` when the coordinate lies outside the raster; nodata cells come
    /// back as `NaN`.
    pub fn sample_nearest(&self, x: f64, y: f64) -> Option<f32> {
        let (col, row) = self.transform.to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }

        let value = self.get(col.floor() as u32, row.floor() as u32)?;
        Some(if self.is_valid(value) { value } else { f32::NAN })
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.buffer.iter().copied().filter(|&v| self.is_valid(v))
    }
}
