use super::{DataReader, GeoTransform, Raster, ReadError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray32Float;
use tiff::tags::Tag;

use crate::projection::EPSG_WGS84;

// GeoKeyDirectory keys
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

pub struct GeoTiffReader {
    pub file_name: PathBuf,
}

impl DataReader for GeoTiffReader {
    fn read_data(&self) -> Result<Raster, ReadError> {
        let file = File::open(&self.file_name)?;

        let reader = BufReader::new(file);

        let mut decoder = Decoder::new(reader)
            .map_err(|e| ReadError::GeoTiff(format!("Failed to decode TIFF: {}", e)))?;

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| ReadError::GeoTiff(format!("Failed to get dimensions: {}", e)))?;

        let image_data: Vec<f32> = match decoder
            .read_image()
            .map_err(|e| ReadError::GeoTiff(format!("Failed to read image: {}", e)))?
        {
            DecodingResult::U8(data) => data.iter().map(|&x| x as f32).collect(),
            DecodingResult::U16(data) => data.iter().map(|&x| x as f32).collect(),
            DecodingResult::U32(data) => data.iter().map(|&x| x as f32).collect(),
            DecodingResult::I16(data) => data.iter().map(|&x| x as f32).collect(),
            DecodingResult::I32(data) => data.iter().map(|&x| x as f32).collect(),
            DecodingResult::F32(data) => data,
            DecodingResult::F64(data) => data.iter().map(|&x| x as f32).collect(),
            _ => return Err(ReadError::GeoTiff("Unsupported pixel format".to_string())),
        };

        let geokeys = read_geokeys(&mut decoder);
        let transform = read_geotransform(&mut decoder, &geokeys)?;

        // Multi-band images decode to an interleaved buffer that fails this check.
        let mut raster = Raster::new(width, height, image_data, transform)?;
        if let Some(epsg) = epsg_from_geokeys(&geokeys) {
            raster = raster.with_epsg(epsg);
        }
        if let Some(nodata) = read_nodata(&mut decoder) {
            raster = raster.with_nodata(nodata);
        }

        Ok(raster)
    }
}

/// `[id, location, count, value]` entries of the GeoKey directory.
fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Vec<[u16; 4]> {
    let Ok(keys) = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) else {
        return Vec::new();
    };
    if keys.len() < 4 {
        return Vec::new();
    }

    // Header [version, revision, minor, count]
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .map(|key| [key[0], key[1], key[2], key[3]])
        .collect()
}

// Only keys stored inline (location 0) carry their value directly.
fn geokey_value(geokeys: &[[u16; 4]], id: u16) -> Option<u16> {
    geokeys
        .iter()
        .find(|key| key[0] == id && key[1] == 0)
        .map(|key| key[3])
}

fn read_geotransform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    geokeys: &[[u16; 4]],
) -> Result<GeoTransform, ReadError> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag);
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag);

    match (scale, tiepoint) {
        (Ok(scale), Ok(tiepoint)) if scale.len() >= 2 && tiepoint.len() >= 6 => {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let mut origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let mut origin_y = tiepoint[4] + tiepoint[1] * scale[1];

            // PixelIsPoint ties the cell center, the transform wants its corner.
            if geokey_value(geokeys, GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
                origin_x -= scale[0] / 2.0;
                origin_y += scale[1] / 2.0;
            }
            Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
        }
        _ => Err(ReadError::GeoTiff(
            "missing ModelPixelScale/ModelTiepoint tags, raster is not georeferenced".to_string(),
        )),
    }
}

/// EPSG code of the CRS selected by `GTModelTypeGeoKey`.
fn epsg_from_geokeys(geokeys: &[[u16; 4]]) -> Option<u32> {
    let code = match geokey_value(geokeys, GT_MODEL_TYPE) {
        Some(MODEL_PROJECTED) => geokey_value(geokeys, PROJECTED_CS_TYPE),
        Some(MODEL_GEOGRAPHIC) => geokey_value(geokeys, GEOGRAPHIC_TYPE),
        _ => geokey_value(geokeys, PROJECTED_CS_TYPE)
            .or_else(|| geokey_value(geokeys, GEOGRAPHIC_TYPE)),
    }?;

    // 0 is undefined, 32767 user-defined
    (code > 0 && code != USER_DEFINED).then_some(u32::from(code))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|text| text.trim_matches(char::from(0)).trim().parse::<f32>().ok())
}

/// Write a raster as a float32 GeoTIFF with its georeferencing.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<(), ReadError> {
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

fn encode_geotiff<W: Write + Seek>(raster: &Raster, writer: W) -> Result<(), ReadError> {
    let err = |what: &str, e: tiff::TiffError| ReadError::GeoTiff(format!("{}: {}", what, e));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| err("Cannot create encoder", e))?;
    let mut image = encoder
        .new_image::<Gray32Float>(raster.width, raster.height)
        .map_err(|e| err("Cannot create image", e))?;

    let gt = raster.transform;
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| err("Cannot write scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| err("Cannot write tiepoint tag", e))?;

    let mut geokeys: Vec<u16> = vec![
        1,
        1,
        0,
        2,
        GT_MODEL_TYPE,
        0,
        1,
        MODEL_PROJECTED,
        GT_RASTER_TYPE,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
    ];
    if let Some(epsg) = raster.epsg.and_then(|code| u16::try_from(code).ok()) {
        let geographic = u32::from(epsg) == EPSG_WGS84;
        geokeys[3] = 3;
        geokeys[7] = if geographic { MODEL_GEOGRAPHIC } else { MODEL_PROJECTED };
        let key = if geographic { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        geokeys.extend_from_slice(&[key, 0, 1, epsg]);
    }
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
        .map_err(|e| err("Cannot write geokey tag", e))?;

    if let Some(nodata) = raster.nodata {
        image
            .encoder()
            .write_tag(Tag::GdalNodata, nodata.to_string().as_str())
            .map_err(|e| err("Cannot write nodata tag", e))?;
    }

    image
        .write_data(&raster.buffer)
        .map_err(|e| err("Cannot write image data", e))?;

    Ok(())
}
