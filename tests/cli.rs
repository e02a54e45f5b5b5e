//! Tests for the `exrframe` binary's offline commands.

mod common;

use std::process::Command;

use common::{plausible_exr, uniform_exr};

fn exrframe() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_exrframe"));
    cmd.env_remove("DATA_DIR").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn convert_writes_png_next_to_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("shots")).expect("mkdir");
    std::fs::write(dir.path().join("shots/a.exr"), uniform_exr(5, 3, 0.5)).expect("write exr");

    let status = exrframe()
        .args(["convert", "shots/a.exr", "--data-dir"])
        .arg(dir.path())
        .status()
        .expect("run exrframe");
    assert!(status.success());

    let png = std::fs::read(dir.path().join("shots/a.png")).expect("png written");
    let image = image::load_from_memory(&png).expect("valid png");
    assert_eq!((image.width(), image.height()), (5, 3));
}

#[test]
fn convert_refuses_paths_outside_the_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = exrframe()
        .args(["convert", "../escape.exr", "--data-dir"])
        .arg(dir.path())
        .output()
        .expect("run exrframe");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parent directory"), "{stderr}");
}

#[test]
fn convert_reports_undecodable_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("fake.exr"), plausible_exr(300)).expect("write");

    let output = exrframe()
        .args(["convert", "fake.exr", "--data-dir"])
        .arg(dir.path())
        .output()
        .expect("run exrframe");

    assert!(!output.status.success());
    assert!(!dir.path().join("fake.png").exists());
}

#[test]
fn decode_worker_rejects_non_exr_with_dedicated_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("noise.bin");
    std::fs::write(&path, [7_u8; 400]).expect("write");

    let output = exrframe()
        .arg("decode-worker")
        .arg(&path)
        .output()
        .expect("run worker");

    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
}
