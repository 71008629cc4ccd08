//! NRRD volume reading and writing.
//!
//! Attached-header `.nrrd` files with `raw` or `ascii` encoding are
//! supported, in either byte order. Compressed encodings and detached data
//! files are reported as [`SsmError::UnsupportedFormat`]; element types
//! outside [`ElementType`] as [`SsmError::UnsupportedType`].

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::error::{SsmError, SsmResult};
use crate::tracing_ext::log_volume_stats;
use crate::volume::{ElementType, Volume};

/// Payload encoding declared in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Ascii,
}

/// Byte order of raw payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Parsed NRRD header.
#[derive(Debug, Clone)]
pub struct NrrdHeader {
    pub element_type: ElementType,
    pub sizes: Vec<usize>,
    pub encoding: Encoding,
    pub endian: Endian,
    pub spacing: Option<Vector3<f64>>,
    pub origin: Option<Point3<f64>>,
    /// Byte offset of the payload within the file.
    pub data_offset: usize,
}

fn check_extension(path: &Path) -> SsmResult<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("nrrd") => Ok(()),
        _ => Err(SsmError::unsupported_format(
            path.extension().and_then(|e| e.to_str()).map(String::from),
        )),
    }
}

fn read_file(path: &Path) -> SsmResult<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| SsmError::io_read(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| SsmError::io_read(path, e))?;
    Ok(bytes)
}

/// Read only the header of a `.nrrd` file.
///
/// Reading stops at the blank line ending the header, so the payload is
/// never loaded.
pub fn read_header(path: &Path) -> SsmResult<NrrdHeader> {
    check_extension(path)?;
    let file = File::open(path).map_err(|e| SsmError::io_read(path, e))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    loop {
        let start = bytes.len();
        let n = reader
            .read_until(b'\n', &mut bytes)
            .map_err(|e| SsmError::io_read(path, e))?;
        if n == 0 || bytes[start..].iter().all(|b| matches!(b, b'\n' | b'\r')) {
            break;
        }
    }
    parse_header(&bytes, path)
}

/// Parse a vector like `(1.5,0,0)`.
fn parse_vector(text: &str, path: &Path) -> SsmResult<Vector3<f64>> {
    let inner = text.trim().trim_start_matches('(').trim_end_matches(')');
    let parts: Vec<f64> = inner
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| SsmError::parse_error(path, format!("bad vector {:?}: {}", text, e)))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(SsmError::parse_error(
            path,
            format!("expected 3 components in {:?}", text),
        )),
    }
}

fn parse_header(bytes: &[u8], path: &Path) -> SsmResult<NrrdHeader> {
    if !bytes.starts_with(b"NRRD") {
        return Err(SsmError::parse_error(path, "missing NRRD magic"));
    }

    // Header ends at the first empty line
    let mut offset = 0;
    let mut lines = Vec::new();
    let mut data_offset = None;
    while offset < bytes.len() {
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| offset + p)
            .unwrap_or(bytes.len());
        let line = String::from_utf8_lossy(&bytes[offset..end])
            .trim_end_matches('\r')
            .to_string();
        offset = (end + 1).min(bytes.len());
        if line.is_empty() {
            data_offset = Some(offset);
            break;
        }
        lines.push(line);
    }
    let data_offset = data_offset.unwrap_or(bytes.len());

    let mut element_type = None;
    let mut sizes = None;
    let mut dimension = None;
    let mut encoding = None;
    let mut endian = Endian::Little;
    let mut spacing = None;
    let mut origin = None;

    for line in lines.iter().skip(1) {
        if line.starts_with('#') || line.contains(":=") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(SsmError::parse_error(path, format!("bad header line {:?}", line)));
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "type" => element_type = Some(ElementType::from_nrrd(value)?),
            "dimension" => {
                dimension = Some(value.parse::<usize>().map_err(|e| {
                    SsmError::parse_error(path, format!("bad dimension {:?}: {}", value, e))
                })?)
            }
            "sizes" => {
                sizes = Some(
                    value
                        .split_whitespace()
                        .map(str::parse::<usize>)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| {
                            SsmError::parse_error(path, format!("bad sizes {:?}: {}", value, e))
                        })?,
                )
            }
            "encoding" => {
                encoding = Some(match value.to_ascii_lowercase().as_str() {
                    "raw" => Encoding::Raw,
                    "ascii" | "text" | "txt" => Encoding::Ascii,
                    other => return Err(SsmError::unsupported_format(Some(other.to_string()))),
                })
            }
            "endian" => {
                endian = match value.to_ascii_lowercase().as_str() {
                    "little" => Endian::Little,
                    "big" => Endian::Big,
                    other => {
                        return Err(SsmError::parse_error(
                            path,
                            format!("unknown endian {:?}", other),
                        ));
                    }
                }
            }
            "spacings" => {
                let values: Vec<f64> = value
                    .split_whitespace()
                    .map(str::parse::<f64>)
                    .collect::<Result<_, _>>()
                    .map_err(|e| {
                        SsmError::parse_error(path, format!("bad spacings {:?}: {}", value, e))
                    })?;
                if let [x, y, z] = values.as_slice() {
                    spacing = Some(Vector3::new(*x, *y, *z));
                }
            }
            "space directions" => {
                let dirs: Vec<Vector3<f64>> = value
                    .split_whitespace()
                    .filter(|d| *d != "none")
                    .map(|d| parse_vector(d, path))
                    .collect::<SsmResult<_>>()?;
                if let [dx, dy, dz] = dirs.as_slice() {
                    spacing = Some(Vector3::new(dx.norm(), dy.norm(), dz.norm()));
                }
            }
            "space origin" => origin = Some(Point3::from(parse_vector(value, path)?)),
            "data file" | "datafile" => {
                return Err(SsmError::unsupported_format(Some("detached nrrd".into())));
            }
            "line skip" | "lineskip" | "byte skip" | "byteskip" => {
                if value != "0" {
                    return Err(SsmError::unsupported_format(Some(format!("{}: {}", key, value))));
                }
            }
            _ => {}
        }
    }

    let element_type =
        element_type.ok_or_else(|| SsmError::parse_error(path, "header has no type field"))?;
    let sizes = sizes.ok_or_else(|| SsmError::parse_error(path, "header has no sizes field"))?;
    if let Some(dim) = dimension {
        if dim != sizes.len() {
            return Err(SsmError::parse_error(
                path,
                format!("dimension {} does not match {} sizes", dim, sizes.len()),
            ));
        }
    }
    if payload_bytes(&sizes, element_type).is_none() {
        return Err(SsmError::parse_error(
            path,
            format!("sizes overflow: {:?}", sizes),
        ));
    }
    let encoding =
        encoding.ok_or_else(|| SsmError::parse_error(path, "header has no encoding field"))?;

    Ok(NrrdHeader {
        element_type,
        sizes,
        encoding,
        endian,
        spacing,
        origin,
        data_offset,
    })
}

/// Voxel count and payload byte length for `sizes`, or `None` on overflow.
fn payload_bytes(sizes: &[usize], ty: ElementType) -> Option<(usize, usize)> {
    let count = sizes.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))?;
    Some((count, count.checked_mul(ty.size_bytes())?))
}

fn decode_raw(
    payload: &[u8],
    count: usize,
    ty: ElementType,
    endian: Endian,
) -> Option<Vec<f64>> {
    let size = ty.size_bytes();
    let len = count.checked_mul(size)?;
    if payload.len() < len {
        return None;
    }
    let values = payload[..len]
        .chunks_exact(size)
        .map(|c| {
            macro_rules! num {
                ($t:ty) => {{
                    let arr = c.try_into().unwrap_or_default();
                    match endian {
                        Endian::Little => <$t>::from_le_bytes(arr) as f64,
                        Endian::Big => <$t>::from_be_bytes(arr) as f64,
                    }
                }};
            }
            match ty {
                ElementType::UChar => c[0] as f64,
                ElementType::Char => c[0] as i8 as f64,
                ElementType::UShort => num!(u16),
                ElementType::Short => num!(i16),
                ElementType::UInt => num!(u32),
                ElementType::Int => num!(i32),
                ElementType::Float => num!(f32),
                ElementType::Double => num!(f64),
            }
        })
        .collect();
    Some(values)
}

/// Load a 3-D volume from a `.nrrd` file.
pub fn load_volume(path: &Path) -> SsmResult<Volume> {
    check_extension(path)?;
    info!("Loading volume from {:?}", path);

    let bytes = read_file(path)?;
    let header = parse_header(&bytes, path)?;
    let dims = crate::volume::as_shape3(&header.sizes)?;
    let (count, expected_bytes) = payload_bytes(&dims, header.element_type)
        .ok_or_else(|| SsmError::parse_error(path, format!("sizes overflow: {:?}", dims)))?;
    let payload = bytes.get(header.data_offset..).unwrap_or_default();

    let data = match header.encoding {
        Encoding::Raw => decode_raw(payload, count, header.element_type, header.endian)
            .ok_or_else(|| {
                SsmError::parse_error(
                    path,
                    format!(
                        "payload has {} bytes, expected {}",
                        payload.len(),
                        expected_bytes
                    ),
                )
            })?,
        Encoding::Ascii => {
            let text = String::from_utf8_lossy(payload);
            let values: Vec<f64> = text
                .split_whitespace()
                .take(count)
                .map(str::parse::<f64>)
                .collect::<Result<_, _>>()
                .map_err(|e| SsmError::parse_error(path, format!("bad ascii value: {}", e)))?;
            if values.len() != count {
                return Err(SsmError::parse_error(
                    path,
                    format!("payload has {} values, expected {}", values.len(), count),
                ));
            }
            values
        }
    };

    let mut volume = Volume::new(dims, data, header.element_type)?;
    if let Some(spacing) = header.spacing {
        volume.spacing = spacing;
    }
    if let Some(origin) = header.origin {
        volume.origin = origin;
    }

    debug!(
        dims = ?volume.dims,
        element_type = header.element_type.nrrd_name(),
        encoding = ?header.encoding,
        "Volume loaded"
    );
    log_volume_stats(&volume, "load_volume");

    Ok(volume)
}

fn encode_value(value: f64, ty: ElementType, out: &mut Vec<u8>) {
    // Integer types round to nearest and saturate
    match ty {
        ElementType::UChar => out.push(value.round() as u8),
        ElementType::Char => out.push(value.round() as i8 as u8),
        ElementType::UShort => out.extend_from_slice(&(value.round() as u16).to_le_bytes()),
        ElementType::Short => out.extend_from_slice(&(value.round() as i16).to_le_bytes()),
        ElementType::UInt => out.extend_from_slice(&(value.round() as u32).to_le_bytes()),
        ElementType::Int => out.extend_from_slice(&(value.round() as i32).to_le_bytes()),
        ElementType::Float => out.extend_from_slice(&(value as f32).to_le_bytes()),
        ElementType::Double => out.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Save a volume as a raw little-endian `.nrrd` file.
pub fn save_volume(volume: &Volume, path: &Path) -> SsmResult<()> {
    check_extension(path)?;
    info!("Saving volume to {:?}", path);

    let file = File::create(path).map_err(|e| SsmError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let [nx, ny, nz] = volume.dims;
    let s = volume.spacing;
    let o = volume.origin;
    let header = format!(
        "NRRD0004\n\
         # Written by ssm-core\n\
         type: {}\n\
         dimension: 3\n\
         space: left-posterior-superior\n\
         sizes: {} {} {}\n\
         space directions: ({},0,0) (0,{},0) (0,0,{})\n\
         kinds: domain domain domain\n\
         endian: little\n\
         encoding: raw\n\
         space origin: ({},{},{})\n\n",
        volume.element_type.nrrd_name(),
        nx,
        ny,
        nz,
        s.x,
        s.y,
        s.z,
        o.x,
        o.y,
        o.z
    );

    let mut payload = Vec::with_capacity(volume.data.len() * volume.element_type.size_bytes());
    for &v in &volume.data {
        encode_value(v, volume.element_type, &mut payload);
    }

    writer
        .write_all(header.as_bytes())
        .and_then(|_| writer.write_all(&payload))
        .and_then(|_| writer.flush())
        .map_err(|e| SsmError::io_write(path, e))?;

    debug!(voxels = volume.data.len(), "Volume saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_bytes(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_save_and_load_preserves_geometry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.nrrd");

        let mut volume = Volume::filled([3, 4, 5], 0.0, ElementType::Short)
            .with_spacing(Vector3::new(0.5, 1.0, 2.0))
            .with_origin(Point3::new(-1.0, 2.0, 3.5));
        volume.set(2, 3, 4, -12.0);
        volume.set(0, 1, 2, 300.0);

        save_volume(&volume, &path).unwrap();
        let loaded = load_volume(&path).unwrap();

        assert_eq!(loaded.dims, [3, 4, 5]);
        assert_eq!(loaded.element_type, ElementType::Short);
        assert_eq!(loaded.get(2, 3, 4), Some(-12.0));
        assert_eq!(loaded.get(0, 1, 2), Some(300.0));
        assert!((loaded.spacing - volume.spacing).norm() < 1e-12);
        assert!((loaded.origin - volume.origin).norm() < 1e-12);
    }

    #[test]
    fn test_big_endian_raw() {
        let dir = TempDir::new().unwrap();
        let mut bytes =
            b"NRRD0004\ntype: ushort\ndimension: 3\nsizes: 2 1 1\nendian: big\nencoding: raw\n\n"
                .to_vec();
        bytes.extend_from_slice(&[0x01, 0x02, 0x00, 0x05]);
        let path = write_bytes(&dir, "be.nrrd", &bytes);

        let v = load_volume(&path).unwrap();
        assert_eq!(v.data, vec![258.0, 5.0]);
    }

    #[test]
    fn test_ascii_encoding_and_spacings() {
        let dir = TempDir::new().unwrap();
        let bytes = b"NRRD0001\n# comment\ntype: float\ndimension: 3\nsizes: 2 2 1\nspacings: 0.5 0.5 1\nencoding: ascii\n\n1.5 2 3\n4\n";
        let path = write_bytes(&dir, "a.nrrd", bytes);

        let v = load_volume(&path).unwrap();
        assert_eq!(v.data, vec![1.5, 2.0, 3.0, 4.0]);
        assert!((v.spacing.x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_header_only_reports_sizes() {
        let dir = TempDir::new().unwrap();
        let bytes = b"NRRD0004\ntype: uchar\ndimension: 2\nsizes: 4 4\nencoding: raw\n\n";
        let path = write_bytes(&dir, "flat.nrrd", bytes);

        let header = read_header(&path).unwrap();
        assert_eq!(header.sizes, vec![4, 4]);

        // Full load requires three axes
        let err = load_volume(&path).unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_gzip_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let bytes = b"NRRD0004\ntype: uchar\ndimension: 3\nsizes: 1 1 1\nencoding: gzip\n\n";
        let path = write_bytes(&dir, "gz.nrrd", bytes);

        let err = load_volume(&path).unwrap_err();
        assert!(matches!(err, SsmError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_unsupported_element_type() {
        let dir = TempDir::new().unwrap();
        let bytes = b"NRRD0004\ntype: int64\ndimension: 3\nsizes: 1 1 1\nencoding: raw\n\n";
        let path = write_bytes(&dir, "l.nrrd", bytes);

        let err = load_volume(&path).unwrap_err();
        assert!(matches!(err, SsmError::UnsupportedType { .. }));
    }

    #[test]
    fn test_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let mut bytes =
            b"NRRD0004\ntype: float\ndimension: 3\nsizes: 2 2 2\nencoding: raw\n\n".to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        let path = write_bytes(&dir, "t.nrrd", &bytes);

        let err = load_volume(&path).unwrap_err();
        assert!(matches!(err, SsmError::ParseError { .. }));
    }

    #[test]
    fn test_wrong_extension() {
        let err = load_volume(Path::new("image.mha")).unwrap_err();
        assert!(matches!(err, SsmError::UnsupportedFormat { extension: Some(ref e) } if e == "mha"));
    }

    #[test]
    fn test_overflowing_sizes_are_parse_errors() {
        let dir = TempDir::new().unwrap();
        let bytes = b"NRRD0004\ntype: uchar\ndimension: 3\nsizes: 4294967296 4294967296 4294967296\nencoding: raw\n\n\0";
        let path = write_bytes(&dir, "huge.nrrd", bytes);

        for err in [load_volume(&path).unwrap_err(), read_header(&path).unwrap_err()] {
            match err {
                SsmError::ParseError { details, .. } => {
                    assert!(details.contains("sizes overflow"))
                }
                other => panic!("expected ParseError, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_payload_bytes_overflow_on_element_size() {
        // Voxel count fits, byte length does not
        let sizes = [usize::MAX / 2, 1, 1];
        assert!(payload_bytes(&sizes, ElementType::UChar).is_some());
        assert!(payload_bytes(&sizes, ElementType::Double).is_none());
    }
}
