//! Splat payload formats.
//!
//! Fetched payloads are validated in two steps: [`prepare`] inspects the
//! file name hint and any header synchronously, then
//! [`PreparedPayload::decode`] walks the body and produces packed
//! [`SplatRecord`]s ready for upload.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};

use crate::error::ParseError;

/// Packed splat as stored in `.splat` files and on the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SplatRecord {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub color: [u8; 4],
    pub rotation: [u8; 4],
}

pub const SPLAT_STRIDE: usize = std::mem::size_of::<SplatRecord>();

const SH_C0: f32 = 0.282_094_8;
const DEFAULT_SCALE: f32 = 0.01;
const PLY_END_HEADER: &[u8] = b"end_header\n";

impl SplatRecord {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Sub-format selected from the file name hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplatFormat {
    Splat,
    Ply,
    Compressed(String),
}

impl SplatFormat {
    /// Picks the format from the hint's extension, sniffing the payload when
    /// the extension is not recognised.
    pub fn detect(file_name_hint: &str, bytes: &[u8]) -> Self {
        let extension = file_name_hint
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "splat" => Self::Splat,
            "ply" => Self::Ply,
            "spz" | "ksplat" | "sog" | "sogs" => Self::Compressed(extension),
            _ if bytes.starts_with(b"ply\n") || bytes.starts_with(b"ply\r\n") => Self::Ply,
            _ => Self::Splat,
        }
    }
}

impl fmt::Display for SplatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Splat => f.write_str("splat"),
            Self::Ply => f.write_str("ply"),
            Self::Compressed(ext) => write!(f, "{ext} (compressed)"),
        }
    }
}

/// Axis aligned bounds of a decoded cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Decoded splats ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatCloud {
    records: Vec<SplatRecord>,
    bounds: Option<Bounds>,
}

impl SplatCloud {
    pub fn from_records(records: Vec<SplatRecord>) -> Self {
        let bounds = records.iter().map(SplatRecord::position).fold(None::<Bounds>, |acc, p| {
            Some(match acc {
                None => Bounds { min: p, max: p },
                Some(Bounds { min, max }) => Bounds {
                    min: min.min(p),
                    max: max.max(p),
                },
            })
        });
        Self { records, bounds }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn records(&self) -> &[SplatRecord] {
        &self.records
    }

    /// Bytes in GPU record layout.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }
}

/// Payload whose format and header have been validated.
#[derive(Debug)]
pub struct PreparedPayload {
    bytes: Vec<u8>,
    layout: Layout,
}

#[derive(Debug)]
enum Layout {
    Splat,
    Ply(PlyHeader),
}

/// Synchronous validation step of the decoder.
pub fn prepare(bytes: Vec<u8>, file_name_hint: &str) -> Result<PreparedPayload, ParseError> {
    if bytes.is_empty() {
        return Err(ParseError::Empty);
    }
    let layout = match SplatFormat::detect(file_name_hint, &bytes) {
        SplatFormat::Splat => Layout::Splat,
        SplatFormat::Ply => Layout::Ply(PlyHeader::parse(&bytes)?),
        SplatFormat::Compressed(ext) => return Err(ParseError::Compressed(ext)),
    };
    Ok(PreparedPayload { bytes, layout })
}

impl PreparedPayload {
    pub fn format(&self) -> SplatFormat {
        match self.layout {
            Layout::Splat => SplatFormat::Splat,
            Layout::Ply(_) => SplatFormat::Ply,
        }
    }

    pub fn decode(self) -> Result<SplatCloud, ParseError> {
        match self.layout {
            Layout::Splat => decode_splat(&self.bytes),
            Layout::Ply(header) => header.decode(&self.bytes),
        }
    }
}

fn decode_splat(bytes: &[u8]) -> Result<SplatCloud, ParseError> {
    if bytes.len() % SPLAT_STRIDE != 0 {
        return Err(ParseError::Truncated {
            len: bytes.len(),
            stride: SPLAT_STRIDE,
        });
    }
    let records = bytes
        .chunks_exact(SPLAT_STRIDE)
        .map(bytemuck::pod_read_unaligned::<SplatRecord>)
        .collect();
    Ok(SplatCloud::from_records(records))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    fn read(self, bytes: &[u8]) -> f32 {
        match self {
            Self::I8 => bytes[0] as i8 as f32,
            Self::U8 => bytes[0] as f32,
            Self::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                f64::from_le_bytes(raw) as f32
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlyProperty {
    name: String,
    kind: ScalarType,
    offset: usize,
}

/// Header of a binary little-endian PLY with a single `vertex` element.
#[derive(Debug, Clone, PartialEq)]
struct PlyHeader {
    vertex_count: usize,
    stride: usize,
    properties: Vec<PlyProperty>,
    body_offset: usize,
}

impl PlyHeader {
    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let header_err = |message: String| ParseError::PlyHeader(message);
        let end = bytes
            .windows(PLY_END_HEADER.len())
            .position(|window| window == PLY_END_HEADER)
            .ok_or_else(|| header_err("missing end_header".into()))?;
        let text = std::str::from_utf8(&bytes[..end])
            .map_err(|_| header_err("header is not UTF-8".into()))?;

        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        if lines.next() != Some("ply") {
            return Err(header_err("missing ply magic".into()));
        }

        let mut format_seen = false;
        let mut vertex_count = None;
        let mut properties = Vec::new();
        let mut stride = 0;
        for line in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                ["format", "binary_little_endian", _] => format_seen = true,
                ["format", other, ..] => {
                    return Err(header_err(format!("unsupported format `{other}`")));
                }
                ["comment", ..] | ["obj_info", ..] => {}
                ["element", "vertex", count] => {
                    if vertex_count.is_some() {
                        return Err(header_err("duplicate vertex element".into()));
                    }
                    let count = count
                        .parse::<usize>()
                        .map_err(|_| header_err(format!("invalid vertex count `{count}`")))?;
                    vertex_count = Some(count);
                }
                ["element", name, _] => {
                    return Err(header_err(format!("unsupported element `{name}`")));
                }
                ["property", "list", ..] => {
                    return Err(header_err("list properties are not supported".into()));
                }
                ["property", kind, name] => {
                    if vertex_count.is_none() {
                        return Err(header_err(format!("property `{name}` outside an element")));
                    }
                    let kind = ScalarType::parse(kind)
                        .ok_or_else(|| header_err(format!("unknown property type `{kind}`")))?;
                    properties.push(PlyProperty {
                        name: (*name).to_string(),
                        kind,
                        offset: stride,
                    });
                    stride += kind.size();
                }
                _ => return Err(header_err(format!("unexpected line `{line}`"))),
            }
        }

        if !format_seen {
            return Err(header_err("missing format line".into()));
        }
        let vertex_count = vertex_count.ok_or_else(|| header_err("missing vertex element".into()))?;
        for axis in ["x", "y", "z"] {
            if !properties.iter().any(|property| property.name == axis) {
                return Err(header_err(format!("missing `{axis}` property")));
            }
        }

        Ok(Self {
            vertex_count,
            stride,
            properties,
            body_offset: end + PLY_END_HEADER.len(),
        })
    }

    fn property(&self, name: &str) -> Option<&PlyProperty> {
        self.properties.iter().find(|property| property.name == name)
    }

    fn decode(&self, bytes: &[u8]) -> Result<SplatCloud, ParseError> {
        let body = &bytes[self.body_offset..];
        let expected = self
            .vertex_count
            .checked_mul(self.stride)
            .ok_or_else(|| ParseError::PlyHeader("vertex count overflows".into()))?;
        if body.len() < expected {
            return Err(ParseError::PlyBody {
                expected,
                actual: body.len(),
            });
        }

        let field = |names: [&str; 3]| names.map(|name| self.property(name));
        let position = field(["x", "y", "z"]);
        let scale = field(["scale_0", "scale_1", "scale_2"]);
        let dc = field(["f_dc_0", "f_dc_1", "f_dc_2"]);
        let rgb = field(["red", "green", "blue"]);
        let opacity = self.property("opacity");
        let rotation = ["rot_0", "rot_1", "rot_2", "rot_3"].map(|name| self.property(name));

        let records = body[..expected]
            .chunks_exact(self.stride)
            .map(|vertex| {
                let read = |property: Option<&PlyProperty>| {
                    property.map(|p| p.kind.read(&vertex[p.offset..p.offset + p.kind.size()]))
                };
                let position = position.map(|p| read(p).unwrap_or(0.0));
                let scale = scale.map(|p| read(p).map(f32::exp).unwrap_or(DEFAULT_SCALE));
                let color = match (dc.map(read), rgb.map(read)) {
                    ([Some(r), Some(g), Some(b)], _) => {
                        [r, g, b].map(|c| unit_to_byte(0.5 + SH_C0 * c))
                    }
                    (_, [Some(r), Some(g), Some(b)]) => [r, g, b].map(|c| c.clamp(0.0, 255.0) as u8),
                    _ => [255; 3],
                };
                let alpha = read(opacity)
                    .map(|o| unit_to_byte(1.0 / (1.0 + (-o).exp())))
                    .unwrap_or(255);
                SplatRecord {
                    position,
                    scale,
                    color: [color[0], color[1], color[2], alpha],
                    rotation: pack_rotation(rotation.map(read)),
                }
            })
            .collect();
        Ok(SplatCloud::from_records(records))
    }
}

fn unit_to_byte(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Packs a `(w, x, y, z)` quaternion into the `.splat` byte encoding.
fn pack_rotation(components: [Option<f32>; 4]) -> [u8; 4] {
    let quat = match components {
        [Some(w), Some(x), Some(y), Some(z)] => Quat::from_xyzw(x, y, z, w),
        _ => Quat::IDENTITY,
    };
    let quat = if quat.length_squared() > f32::EPSILON {
        quat.normalize()
    } else {
        Quat::IDENTITY
    };
    [quat.w, quat.x, quat.y, quat.z].map(|c| (c * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8)
}


#[cfg(test)]
mod tests {
    use super::fixtures::splat_bytes;
    use super::*;

    fn ply(header_props: &[&str], count: usize, body: &[u8]) -> Vec<u8> {
        let mut text = format!("ply\nformat binary_little_endian 1.0\nelement vertex {count}\n");
        for prop in header_props {
            text.push_str(&format!("property float {prop}\n"));
        }
        text.push_str("end_header\n");
        let mut bytes = text.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn record_is_32_bytes() {
        assert_eq!(SPLAT_STRIDE, 32);
    }

    #[test]
    fn detects_formats() {
        assert_eq!(SplatFormat::detect("a.splat", b""), SplatFormat::Splat);
        assert_eq!(SplatFormat::detect("A.PLY", b""), SplatFormat::Ply);
        assert_eq!(
            SplatFormat::detect("example.spz", b""),
            SplatFormat::Compressed("spz".into())
        );
        assert_eq!(SplatFormat::detect("blob", b"ply\nformat"), SplatFormat::Ply);
        assert_eq!(SplatFormat::detect("blob", &[0u8; 32]), SplatFormat::Splat);
    }

    #[test]
    fn decodes_splat_records_and_bounds() {
        let cloud = prepare(splat_bytes(3), "a.splat").unwrap().decode().unwrap();
        assert_eq!(cloud.len(), 3);
        let bounds = cloud.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(bounds.max, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(cloud.as_bytes(), splat_bytes(3).as_slice());
    }

    #[test]
    fn rejects_empty_truncated_and_compressed() {
        assert_eq!(prepare(Vec::new(), "a.splat").unwrap_err(), ParseError::Empty);
        let truncated = prepare(vec![0u8; 40], "a.splat").unwrap().decode();
        assert_eq!(
            truncated.unwrap_err(),
            ParseError::Truncated { len: 40, stride: 32 }
        );
        assert_eq!(
            prepare(vec![1u8; 8], "/models/example.spz").unwrap_err(),
            ParseError::Compressed("spz".into())
        );
    }

    #[test]
    fn decodes_gaussian_ply() {
        let props = [
            "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1",
            "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
        ];
        let body = floats(&[
            1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
        ]);
        let payload = prepare(ply(&props, 1, &body), "scan.ply").unwrap();
        assert_eq!(payload.format(), SplatFormat::Ply);
        let cloud = payload.decode().unwrap();
        let record = cloud.records()[0];
        assert_eq!(record.position, [1.0, 2.0, 3.0]);
        assert_eq!(record.scale, [1.0; 3]);
        assert_eq!(record.color, [128, 128, 128, 128]);
        assert_eq!(record.rotation, [255, 128, 128, 128]);
    }

    #[test]
    fn ply_header_errors_are_synchronous() {
        let ascii = b"ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nend_header\n";
        assert!(matches!(
            prepare(ascii.to_vec(), "a.ply"),
            Err(ParseError::PlyHeader(_))
        ));
        let no_y = ply(&["x", "z"], 1, &floats(&[0.0, 0.0]));
        assert!(matches!(prepare(no_y, "a.ply"), Err(ParseError::PlyHeader(_))));
    }

    #[test]
    fn short_ply_body_fails_decode() {
        let bytes = ply(&["x", "y", "z"], 2, &floats(&[0.0, 0.0, 0.0]));
        let err = prepare(bytes, "a.ply").unwrap().decode().unwrap_err();
        assert_eq!(err, ParseError::PlyBody { expected: 24, actual: 12 });
    }
}
