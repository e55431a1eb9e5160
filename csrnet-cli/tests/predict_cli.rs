use std::error::Error;
use std::fs;

use assert_cmd::Command;
use image::{GenericImageView, ImageBuffer, Rgb};
use serde_json::Value;
use tempfile::tempdir;

fn write_test_scene(path: &std::path::Path) -> Result<(), Box<dyn Error>> {
    let img = ImageBuffer::from_fn(32, 24, |x, y| {
        let r = ((x + y) % 255) as u8;
        Rgb([r, 128, 255u8.saturating_sub(r)])
    });
    img.save(path)?;
    Ok(())
}

#[test]
fn predict_single_image_produces_json_output() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let image_path = work_dir.path().join("scene.png");
    let json_path = work_dir.path().join("out.json");
    write_test_scene(&image_path)?;

    // No model artifact: the pipeline must degrade to the stub and still
    // complete.
    Command::cargo_bin("csrnet")?
        .arg("--input")
        .arg(&image_path)
        .arg("--model")
        .arg(work_dir.path().join("absent.onnx"))
        .arg("--width")
        .arg("64")
        .arg("--height")
        .arg("48")
        .arg("--json")
        .arg(&json_path)
        .assert()
        .success();

    let records: Value = serde_json::from_str(&fs::read_to_string(&json_path)?)?;
    let records = records.as_array().expect("array of records");
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert!(record["count"].as_f64().expect("count") > 0.0);
    assert!(record["rounded_count"].as_u64().is_some());
    assert_eq!(record["fallback"], Value::Bool(true));
    Ok(())
}

#[test]
fn predict_writes_heatmap_at_source_resolution() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let image_path = work_dir.path().join("scene.png");
    let heatmap_dir = work_dir.path().join("overlays");
    write_test_scene(&image_path)?;

    Command::cargo_bin("csrnet")?
        .arg("--input")
        .arg(&image_path)
        .arg("--model")
        .arg(work_dir.path().join("absent.onnx"))
        .arg("--width")
        .arg("64")
        .arg("--height")
        .arg("48")
        .arg("--json")
        .arg(work_dir.path().join("out.json"))
        .arg("--heatmaps")
        .arg(&heatmap_dir)
        .assert()
        .success();

    let overlay = image::open(heatmap_dir.join("scene_heatmap.png"))?;
    assert_eq!(overlay.dimensions(), (32, 24));
    Ok(())
}

#[test]
fn directory_without_images_fails_with_message() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    fs::write(work_dir.path().join("notes.txt"), "not an image")?;

    Command::cargo_bin("csrnet")?
        .arg("--input")
        .arg(work_dir.path())
        .assert()
        .failure();
    Ok(())
}

#[test]
fn emit_base64_includes_transport_encoding() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let image_path = work_dir.path().join("scene.png");
    let json_path = work_dir.path().join("out.json");
    write_test_scene(&image_path)?;

    Command::cargo_bin("csrnet")?
        .arg("--input")
        .arg(&image_path)
        .arg("--model")
        .arg(work_dir.path().join("absent.onnx"))
        .arg("--width")
        .arg("64")
        .arg("--height")
        .arg("48")
        .arg("--emit-base64")
        .arg("--json")
        .arg(&json_path)
        .assert()
        .success();

    let records: Value = serde_json::from_str(&fs::read_to_string(&json_path)?)?;
    let record = &records.as_array().expect("records")[0];
    let heatmap_b64 = record["heatmap_base64"].as_str().expect("heatmap base64");
    assert!(!heatmap_b64.is_empty());
    assert!(heatmap_b64.is_ascii());
    assert!(record["source_base64"].as_str().is_some());
    Ok(())
}
