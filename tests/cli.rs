use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::{Builder, NamedTempFile};

fn splat_payload(count: usize) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(count * 32);
    for i in 0..count {
        for value in [i as f32, 0.0, -(i as f32), 0.1, 0.1, 0.1] {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        buffer.extend_from_slice(&[255, 128, 0, 255]);
        buffer.extend_from_slice(&[255, 128, 128, 128]);
    }
    buffer
}

fn write_asset(suffix: &str, bytes: &[u8]) -> NamedTempFile {
    let mut tmp = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp asset");
    tmp.write_all(bytes).expect("write asset");
    tmp
}

#[test]
fn cli_loads_splat_file_and_prints_scene() {
    let asset = write_asset(".splat", &splat_payload(4));
    let mut cmd = Command::cargo_bin("splat-viewer").expect("binary exists");
    cmd.arg(asset.path())
        .arg("--frames")
        .arg("200")
        .arg("--position")
        .arg("0,1,0");
    cmd.assert()
        .success()
        .stdout(contains("Loading "))
        .stdout(contains("Progress: 100%"))
        .stdout(contains("(4 splats)"))
        .stdout(contains("Scene has 2 node(s), asset drawable"))
        .stdout(contains(" - splat-renderer (Renderer)"))
        .stdout(contains("(Asset) pos=(0.00, 1.00, 0.00) scale=(1.00, 1.00, 1.00)"));
}

#[test]
fn cli_reports_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing.splat");
    let mut cmd = Command::cargo_bin("splat-viewer").expect("binary exists");
    cmd.arg(&missing).arg("--frames").arg("200");
    cmd.assert()
        .failure()
        .stdout(contains("Failed to load"))
        .stdout(contains("status 404"))
        .stdout(contains("Scene has 1 node(s)"));
}

#[test]
fn cli_rejects_compressed_containers() {
    let asset = write_asset(".spz", &[0x1f, 0x8b, 0x08, 0x00]);
    let mut cmd = Command::cargo_bin("splat-viewer").expect("binary exists");
    cmd.arg(asset.path()).arg("--frames").arg("200");
    cmd.assert()
        .failure()
        .stdout(contains("is not supported"));
}

#[test]
fn cli_resolves_relative_urls_from_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("scene.splat"), splat_payload(2)).expect("write asset");
    let config = dir.path().join("viewer.xml");
    fs::write(
        &config,
        format!(
            r#"<viewer>
  <camera>
    <position>0 0 5</position>
  </camera>
  <transport>
    <chunk-size>16</chunk-size>
    <base-dir>{}</base-dir>
  </transport>
  <decode-on-worker>true</decode-on-worker>
</viewer>
"#,
            dir.path().display()
        ),
    )
    .expect("write config");

    let mut cmd = Command::cargo_bin("splat-viewer").expect("binary exists");
    cmd.arg("scene.splat")
        .arg("--config")
        .arg(&config)
        .arg("--frames")
        .arg("500");
    cmd.assert()
        .success()
        .stdout(contains("Progress: 25%"))
        .stdout(contains("Loaded scene.splat (2 splats)"));
}

#[test]
fn cli_requires_url() {
    let mut cmd = Command::cargo_bin("splat-viewer").expect("binary exists");
    cmd.assert().failure().stderr(contains("Usage: splat-viewer"));
}
