//! Native GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Georeferencing is read from and written to ModelPixelScale (33550),
//! ModelTiepoint (33922), GeoKeyDirectory (34735) and GDAL_NODATA (42113).
//! Only north-up, single-band images are handled.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{Extent, GeoTransform, PixelGrid, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// CRS written to the GeoKeyDirectory, overriding the raster's own
    pub crs: Option<CRS>,
}

/// Georeferencing and size of a GeoTIFF, read without decoding pixels
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffHeader {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

impl GeoTiffHeader {
    pub fn extent(&self) -> Extent {
        self.transform.extent(self.cols, self.rows)
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// The file's pixels as a north-up grid
    pub fn pixel_grid(&self) -> PixelGrid {
        PixelGrid::new(
            self.transform.origin_x,
            self.transform.origin_y,
            self.cell_size(),
            self.rows,
            self.cols,
        )
    }
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

/// Read only the tags of a GeoTIFF file
pub fn read_geotiff_header<P: AsRef<Path>>(path: P) -> Result<GeoTiffHeader> {
    let file = File::open(path.as_ref())?;
    let mut decoder = open_decoder(BufReader::new(file))?;
    read_header(&mut decoder)
}

/// Read the `rows x cols` block at (row_off, col_off) of a GeoTIFF file.
///
/// Only the strips or tiles overlapping the block are decoded.
pub fn read_geotiff_window<T, P>(
    path: P,
    row_off: usize,
    col_off: usize,
    rows: usize,
    cols: usize,
) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder = open_decoder(BufReader::new(file))?;
    let header = read_header(&mut decoder)?;
    if rows == 0 || cols == 0 || row_off + rows > header.rows || col_off + cols > header.cols {
        return Err(Error::IndexOutOfBounds {
            row: row_off + rows,
            col: col_off + cols,
            rows: header.rows,
            cols: header.cols,
        });
    }

    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let chunk_w = (chunk_w as usize).max(1);
    let chunk_h = (chunk_h as usize).max(1);
    let chunks_across = (header.cols + chunk_w - 1) / chunk_w;

    let mut data = vec![T::default_nodata(); rows * cols];
    for chunk_row in row_off / chunk_h..=(row_off + rows - 1) / chunk_h {
        for chunk_col in col_off / chunk_w..=(col_off + cols - 1) / chunk_w {
            let index = chunk_row * chunks_across + chunk_col;
            let top = chunk_row * chunk_h;
            let left = chunk_col * chunk_w;
            // edge chunks are decoded without their padding
            let data_w = chunk_w.min(header.cols - left);
            let data_h = chunk_h.min(header.rows - top);

            let chunk = decoder
                .read_chunk(index as u32)
                .map_err(|e| Error::Other(format!("Cannot read TIFF chunk {}: {}", index, e)))?;
            let values: Vec<T> = decoded_values(chunk)?;
            if values.len() < data_w * data_h {
                return Err(Error::InvalidDimensions {
                    width: data_w,
                    height: data_h,
                });
            }

            let (r0, r1) = (top.max(row_off), (top + data_h).min(row_off + rows));
            let (c0, c1) = (left.max(col_off), (left + data_w).min(col_off + cols));
            for r in r0..r1 {
                let src = (r - top) * data_w + (c0 - left);
                let dst = (r - row_off) * cols + (c0 - col_off);
                data[dst..dst + (c1 - c0)].copy_from_slice(&values[src..src + (c1 - c0)]);
            }
        }
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    let t = header.transform;
    raster.set_transform(GeoTransform::new(
        t.origin_x + col_off as f64 * t.pixel_width,
        t.origin_y + row_off as f64 * t.pixel_height,
        t.pixel_width,
        t.pixel_height,
    ));
    apply_header(&mut raster, header);
    Ok(raster)
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decoded_values<T: RasterElement>(result: DecodingResult) -> Result<Vec<T>> {
    Ok(match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    })
}

fn open_decoder<R: Read + Seek>(reader: R) -> Result<Decoder<R>> {
    Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))
}

fn read_header<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTiffHeader> {
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    Ok(GeoTiffHeader {
        rows: height as usize,
        cols: width as usize,
        transform: read_geotransform(decoder).unwrap_or_default(),
        crs: read_crs(decoder),
        nodata: read_nodata(decoder),
    })
}

fn apply_header<T: RasterElement>(raster: &mut Raster<T>, header: GeoTiffHeader) {
    raster.set_crs(header.crs);
    if let Some(nodata) = header.nodata {
        raster.set_nodata(num_traits::cast(nodata).or_else(|| {
            nodata.is_nan().then(T::default_nodata)
        }));
    }
}

/// Decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = open_decoder(reader)?;
    let header = read_header(&mut decoder)?;
    let (rows, cols) = (header.rows, header.cols);

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;
    let data: Vec<T> = decoded_values(result)?;
    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(header.transform);
    apply_header(&mut raster, header);
    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::Unknown(GEO_KEY_DIRECTORY)).ok()?;
    if keys.len() < 4 {
        return None;
    }
    let num_keys = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(num_keys)
        .find_map(|entry| match entry {
            // location 0 means the value is stored inline
            [key, 0, _, code]
                if (*key == PROJECTED_CS_TYPE_KEY || *key == GEOGRAPHIC_TYPE_KEY)
                    && *code > 0
                    && *code != 32767 =>
            {
                Some(CRS::from_epsg(*code as u32))
            }
            _ => None,
        })
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_NODATA)).ok()?;
    text.trim_end_matches('\0').trim().parse::<f64>().ok()
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file), options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).and_then(|c| u16::try_from(c).ok());
    let geographic = crs.map(|c| c.is_geographic()).unwrap_or(false);
    let model_type = if geographic { 2 } else { 1 };

    let mut keys = vec![
        1, 1, 0, 2, // version 1.1.0, key count patched below
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = epsg {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
        keys[3] = 3;
    }
    keys
}

/// Encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();

    // No-data cells are always written as NaN
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| v.to_f64_or_nan(nodata) as f32)
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let crs = options.crs.as_ref().or(raster.crs());
    let keys = geokeys(crs);
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .encoder()
        .write_tag(Tag::Unknown(GDAL_NODATA), "nan")
        .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelGrid;
    use approx::assert_relative_eq;

    fn sample() -> Raster<f32> {
        let grid = PixelGrid::new(500_000.0, 4_000_000.0, 30.0, 3, 4);
        let data: Vec<f32> = (0..12).map(|v| v as f32 * 0.5).collect();
        let mut raster = Raster::from_grid_vec(&grid, data).unwrap();
        raster.set(1, 2, f32::NAN).unwrap();
        raster.set_crs(Some(CRS::from_epsg(32633)));
        raster.set_nodata(Some(f32::NAN));
        raster
    }

    #[test]
    fn test_buffer_keeps_georeference() {
        let raster = sample();
        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.pixel_grid(), raster.pixel_grid());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32633));
        assert_relative_eq!(back.get(2, 3).unwrap(), 5.5);
        assert!(back.get(1, 2).unwrap().is_nan());
    }

    #[test]
    fn test_file_with_crs_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let options = GeoTiffOptions {
            crs: Some(CRS::wgs84()),
        };
        write_geotiff(&sample(), &path, Some(options)).unwrap();

        let back: Raster<f32> = read_geotiff(&path).unwrap();
        assert!(back.crs().unwrap().is_geographic());
    }

    #[test]
    fn test_window_matches_crop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.tif");
        let grid = PixelGrid::new(0.0, 1200.0, 10.0, 120, 70);
        let data: Vec<f64> = (0..120 * 70).map(|i| ((i / 70) * 100 + i % 70) as f64).collect();
        let mut raster = Raster::from_grid_vec(&grid, data).unwrap();
        raster.set_crs(Some(CRS::from_epsg(32633)));
        write_geotiff(&raster, &path, None).unwrap();

        let header = read_geotiff_header(&path).unwrap();
        assert_eq!((header.rows, header.cols), (120, 70));
        assert_eq!(header.pixel_grid(), grid);
        assert_eq!(header.extent(), grid.extent());

        let full: Raster<f64> = read_geotiff(&path).unwrap();
        let window: Raster<f64> = read_geotiff_window(&path, 57, 13, 40, 31).unwrap();
        let expected = full.crop(57, 13, 40, 31).unwrap();
        assert_eq!(window.pixel_grid(), expected.pixel_grid());
        assert_eq!(window.data(), expected.data());
        assert_relative_eq!(window.get(0, 0).unwrap(), 5713.0);
        assert_eq!(window.crs().and_then(|c| c.epsg()), Some(32633));

        assert!(read_geotiff_window::<f64, _>(&path, 100, 0, 40, 10).is_err());
    }

    #[test]
    fn test_geokeys_layout() {
        assert_eq!(geokeys(None)[3], 2);
        let keys = geokeys(Some(&CRS::from_epsg(3857)));
        assert_eq!(keys.len(), 16);
        assert_eq!(&keys[12..], &[PROJECTED_CS_TYPE_KEY, 0, 1, 3857]);
    }
}
