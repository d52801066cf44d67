pub mod geotiff;
pub mod types;
pub mod utils;

pub use geotiff::{GeoTiffReader, write_geotiff};
pub use types::{DataReader, FileError, GeoTransform, Raster, ReadError};
pub use utils::reader_from_filetype;

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    GeoTiff,
    NetCDF,
}

pub fn create_reader(file_name: &Path) -> Result<Box<dyn DataReader>, FileError> {
    match reader_from_filetype(file_name)? {
        FileType::GeoTiff => Ok(Box::new(GeoTiffReader {
            file_name: file_name.to_path_buf(),
        })),
        other => Err(FileError::Unsupported(other)),
    }
}
