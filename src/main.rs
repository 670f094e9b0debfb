use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use glam::{UVec2, Vec3};

use splat_viewer::{
    GpuDevice, HeadlessDevice, HttpTransport, SplatViewer, TransformState, ViewerCallbacks,
    ViewerConfig, ViewerState, WgpuDevice,
};

const USAGE: &str = "Usage: splat-viewer <url> [--config <viewer.xml>] [--frames <n>] [--size <WxH>] \
[--position x,y,z] [--rotation x,y,z] [--scale x,y,z] [--gpu]";

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() {
    env_logger::init();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("Error: {err:?}");
            std::process::exit(2);
        }
    }
}

/// Loads the asset headlessly. Returns whether it became ready.
fn run() -> Result<bool> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };

    let transport = Arc::new(HttpTransport::new(&config.transport));
    let device = open_device(options.gpu);
    let mut viewer = SplatViewer::new(&config, transport, Arc::clone(&device));

    let mut milestone = 0;
    viewer.set_callbacks(ViewerCallbacks::new().on_progress(move |percent| {
        let reached = (percent / 25.0).floor() as u32;
        if reached > milestone {
            milestone = reached;
            println!("Progress: {percent:.0}%");
        }
    }));
    viewer.set_transform(options.transform);

    println!("Loading {}", options.url);
    viewer
        .mount(&options.url, options.size)
        .context("failed to mount the splat renderer")?;

    for _ in 0..options.frames {
        viewer.update();
        if viewer.state() != ViewerState::AssetLoading {
            break;
        }
        thread::sleep(FRAME_INTERVAL);
    }
    // The asset may have settled on the last frame; apply it before reporting.
    let report = viewer.update();

    let loaded = match viewer.state() {
        ViewerState::AssetReady => {
            if let Some(asset) = viewer.manager().asset() {
                println!("Loaded {} ({} splats)", asset.name(), asset.splat_count());
            }
            true
        }
        ViewerState::AssetLoading => {
            viewer.cancel_load();
            println!(
                "Failed to load {}: not finished after {} frames",
                options.url, options.frames
            );
            false
        }
        _ => {
            let reason = viewer
                .manager()
                .last_error()
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no asset".to_string());
            println!("Failed to load {}: {reason}", options.url);
            false
        }
    };

    print_scene(&viewer, report.drawable);
    viewer.unmount();
    let stats = device.stats();
    log::info!(
        "released {} of {} GPU buffers ({} bytes still live)",
        stats.destroyed,
        stats.created,
        stats.live_bytes
    );
    Ok(loaded)
}

fn open_device(gpu: bool) -> Arc<dyn GpuDevice> {
    if gpu {
        match WgpuDevice::new_blocking() {
            Ok(device) => return Arc::new(device),
            Err(err) => {
                eprintln!("{err}. Falling back to the headless device.");
            }
        }
    }
    Arc::new(HeadlessDevice::new())
}

fn print_scene(viewer: &SplatViewer, drawable: bool) {
    println!(
        "Scene has {} node(s){}",
        viewer.scene().len(),
        if drawable { ", asset drawable" } else { "" }
    );
    for node in viewer.scene().all_nodes() {
        let position = node.transform.position;
        let scale = node.transform.scale;
        println!(
            " - {} ({:?}) pos=({:.2}, {:.2}, {:.2}) scale=({:.2}, {:.2}, {:.2})",
            node.name, node.kind, position.x, position.y, position.z, scale.x, scale.y, scale.z
        );
    }
}

struct CliOptions {
    url: String,
    config: Option<String>,
    frames: u32,
    size: UVec2,
    transform: Option<TransformState>,
    gpu: bool,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(url) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            url,
            config: None,
            frames: 600,
            size: UVec2::new(1280, 720),
            transform: None,
            gpu: false,
        };
        let mut transform = TransformState::default();
        while let Some(arg) = args.next() {
            if arg == "--gpu" {
                options.gpu = true;
                continue;
            }
            let value = match arg.as_str() {
                "--config" | "--frames" | "--size" | "--position" | "--rotation" | "--scale" => args
                    .next()
                    .ok_or_else(|| anyhow!("{arg} expects a value. {USAGE}"))?,
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            };
            match arg.as_str() {
                "--config" => options.config = Some(value),
                "--frames" => {
                    options.frames = value
                        .parse()
                        .map_err(|err| anyhow!("failed to parse frame count `{value}`: {err}"))?
                }
                "--size" => options.size = parse_size(&value)?,
                "--position" => transform.position = Some(parse_triplet(&value)?),
                "--rotation" => transform.rotation = Some(parse_triplet(&value)?),
                _ => transform.scale = Some(parse_triplet(&value)?),
            }
        }
        if !transform.is_empty() {
            options.transform = Some(transform);
        }
        Ok(options)
    }
}

fn parse_size(value: &str) -> Result<UVec2> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WxH, found `{value}`"))?;
    let width: u32 = width
        .trim()
        .parse()
        .with_context(|| format!("invalid width in `{value}`"))?;
    let height: u32 = height
        .trim()
        .parse()
        .with_context(|| format!("invalid height in `{value}`"))?;
    Ok(UVec2::new(width, height))
}

fn parse_triplet(value: &str) -> Result<Vec3> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid vector `{value}`"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("expected x,y,z, found `{value}`")),
    }
}
