use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

/// Viewer configuration, usually read from a `<viewer>` XML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub renderer: RendererOptions,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Decode fetched payloads on a worker thread instead of inline.
    #[serde(default)]
    pub decode_on_worker: bool,
}

/// Initial pose of the host camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            fov: 60.0,
        }
    }
}

/// Construction parameters of the splat renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RendererOptions {
    pub focal_adjustment: f32,
    pub blur_amount: f32,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            focal_adjustment: 2.0,
            blur_amount: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Read size per progress report, in bytes.
    pub chunk_size: usize,
    /// Directory that relative and root-relative paths resolve against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            base_dir: None,
        }
    }
}

impl ViewerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parses a `<viewer>` document. Missing elements keep their defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid viewer XML")?;
        let root = document.root_element();
        if !root.has_tag_name("viewer") {
            return Err(anyhow!(
                "expected <viewer> root, found <{}>",
                root.tag_name().name()
            ));
        }

        let mut config = ViewerConfig::default();
        if let Some(camera) = child(&root, "camera") {
            let defaults = config.camera;
            config.camera.position =
                parse_vec3(optional_text(&camera, "position"), defaults.position)?;
            config.camera.target = parse_vec3(optional_text(&camera, "target"), defaults.target)?;
            config.camera.fov = parse_f32(optional_text(&camera, "fov"), defaults.fov)?;
        }
        if let Some(renderer) = child(&root, "renderer") {
            let defaults = config.renderer;
            config.renderer.focal_adjustment = parse_f32(
                optional_text(&renderer, "focal-adjustment"),
                defaults.focal_adjustment,
            )?;
            config.renderer.blur_amount =
                parse_f32(optional_text(&renderer, "blur-amount"), defaults.blur_amount)?;
        }
        if let Some(transport) = child(&root, "transport") {
            if let Some(size) = optional_text(&transport, "chunk-size") {
                config.transport.chunk_size = size
                    .parse::<usize>()
                    .map_err(|err| anyhow!("failed to parse chunk size: {err}"))?;
                if config.transport.chunk_size == 0 {
                    return Err(anyhow!("chunk size must be positive"));
                }
            }
            config.transport.base_dir = optional_text(&transport, "base-dir").map(PathBuf::from);
        }
        if let Some(flag) = optional_text(&root, "decode-on-worker") {
            config.decode_on_worker = parse_bool(&flag)?;
        }
        Ok(config)
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

/// Parses `x y z` or `x,y,z`.
pub(crate) fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let components = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|component| !component.is_empty())
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid vector component `{component}`: {err}"))
        })
        .collect::<Result<Vec<f32>>>()?;
    match components.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!(
            "vector `{value}` needs 3 components, found {}",
            components.len()
        )),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow!("expected a boolean, found `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <viewer>
        <camera>
            <position>0 1 5</position>
            <fov>45</fov>
        </camera>
        <renderer>
            <blur-amount>0.5</blur-amount>
        </renderer>
        <transport>
            <chunk-size>4096</chunk-size>
            <base-dir>public</base-dir>
        </transport>
        <decode-on-worker>true</decode-on-worker>
    </viewer>
    "#;

    #[test]
    fn parse_config_overrides_defaults() {
        let config = ViewerConfig::from_xml(SAMPLE).unwrap();
        assert_eq!(config.camera.position, Vec3::new(0.0, 1.0, 5.0));
        assert_eq!(config.camera.target, Vec3::ZERO);
        assert_eq!(config.camera.fov, 45.0);
        assert_eq!(config.renderer.focal_adjustment, 2.0);
        assert!((config.renderer.blur_amount - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.transport.chunk_size, 4096);
        assert_eq!(config.transport.base_dir, Some(PathBuf::from("public")));
        assert!(config.decode_on_worker);
    }

    #[test]
    fn empty_viewer_is_default() {
        let config = ViewerConfig::from_xml("<viewer/>").unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn wrong_root_is_an_error() {
        assert!(ViewerConfig::from_xml("<scene/>").is_err());
    }

    #[test]
    fn vectors_need_three_components() {
        assert!(parse_vec3(Some("1 2".into()), Vec3::ZERO).is_err());
        assert_eq!(
            parse_vec3(Some("1,2, 3".into()), Vec3::ZERO).unwrap(),
            Vec3::new(1.0, 2.0, 3.0)
        );
    }
}
