use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use csrnet_core::{CrowdPipeline, InferenceResult, UploadCandidate, mime_for_extension};
use csrnet_utils::{
    config::{AppSettings, default_settings_path},
    configure_telemetry, init_logging, normalize_path,
};

/// Estimate crowd counts and render density heatmaps for images or directories.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct PredictArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the density model ONNX artifact. When the artifact is
    /// missing the pipeline degrades to a deterministic stub predictor.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Optional settings JSON (defaults to built-in parameters).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override model input width (pixels).
    #[arg(long)]
    width: Option<u32>,

    /// Override model input height (pixels).
    #[arg(long)]
    height: Option<u32>,

    /// Override heatmap blend weight (0.0-1.0).
    #[arg(long)]
    blend: Option<f32>,

    /// Write prediction records to a JSON file instead of stdout.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Directory to write rendered heatmap overlays into.
    #[arg(long)]
    heatmaps: Option<PathBuf>,

    /// Include base64-encoded heatmap and source images in the JSON output.
    #[arg(long)]
    emit_base64: bool,
}

#[derive(Debug, Serialize)]
struct PredictionRecord {
    image: String,
    count: f64,
    rounded_count: u64,
    fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_base64: Option<String>,
}

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = PredictArgs::parse();

    let input_path = normalize_path(&args.input)?;
    let heatmap_dir = if let Some(dir) = args.heatmaps.as_ref() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create heatmap directory {}", dir.display()))?;
        Some(normalize_path(dir)?)
    } else {
        None
    };

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(settings.telemetry.enabled, settings.telemetry.level_filter());

    let model_path = settings.resolved_model_path();
    info!(
        "csrnet {} using density model {} at resolution {}x{}",
        csrnet_core::version(),
        model_path.display(),
        settings.input.width,
        settings.input.height
    );
    let pipeline = CrowdPipeline::from_settings(&settings);

    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: png, jpg, jpeg, gif, bmp)",
            input_path.display()
        );
    }

    info!("Processing {} image(s)...", images.len());
    let records: Vec<PredictionRecord> = images
        .par_iter()
        .filter_map(|image_path| {
            match process_image(&pipeline, image_path, heatmap_dir.as_deref(), args.emit_base64) {
                Ok(record) => {
                    info!(
                        "{} -> count {} ({})",
                        image_path.display(),
                        record.rounded_count,
                        if record.fallback { "stub" } else { "model" }
                    );
                    Some(record)
                }
                Err(err) => {
                    warn!("Failed to process {}: {err}", image_path.display());
                    None
                }
            }
        })
        .collect();

    if records.is_empty() {
        anyhow::bail!("all predictions failed; cannot produce output");
    }

    if let Some(json_path) = args.json.as_ref() {
        if let Some(dir) = json_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &records).with_context(|| {
            format!("failed to write prediction JSON to {}", json_path.display())
        })?;
        info!("Wrote predictions to {}", json_path.display());
    } else {
        let json =
            serde_json::to_string_pretty(&records).context("failed to serialize predictions")?;
        println!("{json}");
    }

    Ok(())
}

fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        return AppSettings::load_from_path(&resolved);
    }

    let default_path = default_settings_path();
    if default_path.is_file() {
        debug!("Loading settings from {}", default_path.display());
        return AppSettings::load_from_path(&default_path);
    }

    Ok(AppSettings::default())
}

fn apply_cli_overrides(settings: &mut AppSettings, args: &PredictArgs) {
    if let Some(model) = args.model.as_ref() {
        settings.model_path = Some(model.display().to_string());
    }
    if let Some(width) = args.width {
        settings.input.width = width;
    }
    if let Some(height) = args.height {
        settings.input.height = height;
    }
    if let Some(blend) = args.blend {
        settings.heatmap.blend_weight = blend;
        settings.heatmap.sanitize();
    }
}

fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if mime_for_extension(&name).is_some() {
            images.push(entry.path().to_path_buf());
        } else {
            debug!("Skipping non-image file {}", entry.path().display());
        }
    }
    images.sort();
    Ok(images)
}

fn process_image(
    pipeline: &CrowdPipeline,
    image_path: &Path,
    heatmap_dir: Option<&Path>,
    emit_base64: bool,
) -> Result<PredictionRecord> {
    let bytes = fs::read(image_path)
        .with_context(|| format!("failed to read {}", image_path.display()))?;
    let filename = image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.png".to_string());
    // The extension stands in for the browser's declared MIME type; the
    // pipeline's validator remains the authority.
    let mime = mime_for_extension(&filename).unwrap_or("application/octet-stream");

    let candidate = UploadCandidate::from_bytes(bytes, mime, filename.clone());
    let result = pipeline
        .run(&candidate)
        .with_context(|| format!("pipeline failed for {}", image_path.display()))?;

    let heatmap_path = if let Some(dir) = heatmap_dir {
        Some(save_heatmap(&result, &filename, dir)?)
    } else {
        None
    };

    Ok(PredictionRecord {
        image: image_path.display().to_string(),
        count: result.count(),
        rounded_count: result.rounded_count(),
        fallback: result.used_fallback(),
        heatmap: heatmap_path.map(|p| p.display().to_string()),
        heatmap_base64: emit_base64.then(|| result.heatmap_base64()),
        source_base64: emit_base64.then(|| result.source_base64()),
    })
}

fn save_heatmap(result: &InferenceResult, filename: &str, dir: &Path) -> Result<PathBuf> {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "heatmap".to_string());
    let output_path = dir.join(format!("{stem}_heatmap.png"));
    fs::write(&output_path, result.heatmap_png())
        .with_context(|| format!("failed to write heatmap {}", output_path.display()))?;
    Ok(output_path)
}
