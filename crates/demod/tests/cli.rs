use std::fs;
use std::process::{Command, Output};

use pipeline::{ExrCodec, Image, ImageCodec};
use tempfile::TempDir;

fn demod(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_demod"))
        .env("RUST_LOG", "info")
        .args(args)
        .output()
        .expect("failed to run demod")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn variants_lists_every_kernel() {
    let output = demod(&["variants"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["demodulate", "brdf-demodulate", "identity"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    assert!(stdout.contains("albedo, mmr, nov, precomputed, specular -> result"));
}

#[test]
fn unknown_variant_exits_non_zero() {
    let output = demod(&["run", "--variant", "sharpen", "--output", "out.exr", "in.exr"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown kernel variant 'sharpen'"));
}

#[test]
fn missing_input_fails_before_touching_gpu() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("missing.exr");
    let out = root.path().join("out.exr");

    let output = demod(&[
        "run",
        "--variant",
        "identity",
        "--output",
        out.to_str().unwrap(),
        missing.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    let stderr = stderr(&output);
    assert!(stderr.contains("failed to load inputs"), "{stderr}");
    assert!(stderr.contains("input #0"), "{stderr}");
    assert!(!out.exists());
}

#[test]
fn wrong_input_count_is_reported() {
    let root = TempDir::new().unwrap();
    let frame = root.path().join("frame.exr");
    ExrCodec
        .encode(&frame, &Image::filled(4, 4, 1.0).unwrap())
        .unwrap();

    let output = demod(&[
        "run",
        "-k",
        "demodulate",
        "-o",
        root.path().join("out.exr").to_str().unwrap(),
        frame.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("expects 2 input images, got 1"));
}

#[test]
fn invalid_batch_file_exits_non_zero() {
    let root = TempDir::new().unwrap();
    let batch = root.path().join("batch.toml");
    fs::write(
        &batch,
        r#"
version = 2

[[runs]]
variant = "identity"
inputs = ["in.exr"]
output = "out.exr"
"#,
    )
    .unwrap();

    let output = demod(&["batch", batch.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = stderr(&output);
    assert!(stderr.contains("failed to load batch file"), "{stderr}");
    assert!(stderr.contains("unsupported batch version 2"), "{stderr}");
}

#[test]
fn batch_keeps_going_after_a_failed_run() {
    let root = TempDir::new().unwrap();
    let batch = root.path().join("batch.toml");
    fs::write(
        &batch,
        r#"
version = 1

[[runs]]
name = "first"
variant = "identity"
inputs = ["absent-a.exr"]
output = "out/a.exr"

[[runs]]
name = "second"
variant = "identity"
inputs = ["absent-b.exr"]
output = "out/b.exr"
"#,
    )
    .unwrap();

    let output = demod(&["batch", batch.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = stderr(&output);
    assert!(stderr.contains("absent-a.exr"), "{stderr}");
    assert!(stderr.contains("absent-b.exr"), "{stderr}");
    assert!(stderr.contains("2 of 2 runs failed: first, second"), "{stderr}");
}

#[test]
fn bad_grid_flag_is_rejected() {
    let output = demod(&["--grid", "diagonal", "variants"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid grid policy 'diagonal'"));
}
