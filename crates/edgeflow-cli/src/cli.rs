use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use edgeflow_core::{ColorOrder, EdgeError, FramePayload, Payload, Result};
use edgeflow_device::{ModelBlob, SimModelSpec};
use edgeflow_pipeline::{
    backend_for, Pipeline, PipelineConfig, StageEvent, ThreadedPipeline, WorkerOptions,
};
use edgeflow_runner::DeviceSession;

#[derive(Parser)]
#[command(name = "edgeflow", about = "Edge inference pipeline for NPU accelerators")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Accelerator device id (overrides the config file).
    #[arg(long, global = true)]
    pub device: Option<u32>,

    /// Path to a pipeline config file (JSON).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend to use (overrides the config file).
    #[arg(long, global = true)]
    pub backend: Option<BackendArg>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an image, or every image in a directory, through the pipeline.
    Run {
        #[arg(required = true)]
        input: PathBuf,
        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Load a model and print its input and output tensors.
    Inspect {
        #[arg(required = true)]
        model: PathBuf,
    },
    /// Write a simulated detector manifest for the sim backend.
    SimModel {
        #[arg(required = true)]
        path: PathBuf,
        /// Output grid sizes, comma-separated.
        #[arg(long, default_value = "20,40,80")]
        outputs: String,
        #[arg(long, default_value = "640")]
        width: usize,
        #[arg(long, default_value = "640")]
        height: usize,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BackendArg {
    Sim,
    Acl,
    Rknn,
}

impl From<BackendArg> for edgeflow_pipeline::BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Sim => Self::Sim,
            BackendArg::Acl => Self::Acl,
            BackendArg::Rknn => Self::Rknn,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A single image file, or the images in a directory sorted by name.
pub fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(EdgeError::Config(format!(
            "no images found in {}",
            input.display()
        )));
    }
    Ok(paths)
}

pub fn load_frame(path: &Path, id: u64) -> Result<FramePayload> {
    let img = image::open(path)
        .map_err(|e| EdgeError::ImageDecode(format!("{}: {e}", path.display())))?;
    Ok(FramePayload::new(img.to_rgb8(), ColorOrder::Rgb, id))
}

/// Run every input through a threaded pipeline and print one summary per frame.
pub fn run_inputs(config: &PipelineConfig, input: &Path, format: OutputFormat) -> Result<()> {
    let paths = collect_inputs(input)?;
    let pipeline = Pipeline::from_config(config, backend_for(config.backend)?)?;
    run_pipeline(pipeline, &paths, WorkerOptions::from(config), format)
}

/// Stream `paths` through `pipeline`. The first fatal stage failure is
/// returned once the workers have been joined.
pub fn run_pipeline(
    pipeline: Pipeline,
    paths: &[PathBuf],
    options: WorkerOptions,
    format: OutputFormat,
) -> Result<()> {
    let threaded = ThreadedPipeline::spawn(pipeline, options)?;
    let events = threaded.results().clone();

    let mut names = HashMap::new();
    let mut failure = None;
    let mut stopped = None;

    for (id, path) in paths.iter().enumerate() {
        let id = id as u64;
        match load_frame(path, id) {
            Ok(frame) => {
                names.insert(id, path.clone());
                if let Err(e) = threaded.submit(frame) {
                    stopped = Some(e);
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "skipping input"),
        }
        for event in events.try_iter() {
            if let Some(e) = report_event(event, &names, format) {
                failure.get_or_insert(e);
            }
        }
    }

    threaded.shutdown()?;
    for event in events.try_iter() {
        if let Some(e) = report_event(event, &names, format) {
            failure.get_or_insert(e);
        }
    }
    match failure.or(stopped) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Print an event. A fatal stage failure is handed back to the caller.
fn report_event(
    event: StageEvent,
    names: &HashMap<u64, PathBuf>,
    format: OutputFormat,
) -> Option<EdgeError> {
    match event {
        StageEvent::Output(Payload::RunnerOutput(out)) => {
            let path = names
                .get(&out.frame_id)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            match format {
                OutputFormat::Text => {
                    let dims: Vec<String> = out
                        .outputs
                        .iter()
                        .map(|t| format!("{}x{}", t.height, t.width))
                        .collect();
                    println!(
                        "frame {} {path}: {} outputs [{}] scale=({:.4}, {:.4})",
                        out.frame_id,
                        out.outputs.len(),
                        dims.join(", "),
                        out.scale_w,
                        out.scale_h
                    );
                }
                OutputFormat::Json => {
                    let outputs: Vec<_> = out
                        .outputs
                        .iter()
                        .map(|t| {
                            let (min, max, mean) = summarize(&t.data);
                            serde_json::json!({
                                "height": t.height,
                                "width": t.width,
                                "len": t.len,
                                "dtype": t.dtype,
                                "min": min,
                                "max": max,
                                "mean": mean,
                            })
                        })
                        .collect();
                    let line = serde_json::json!({
                        "frame": out.frame_id,
                        "path": path,
                        "scale_w": out.scale_w,
                        "scale_h": out.scale_h,
                        "outputs": outputs,
                    });
                    println!("{line}");
                }
            }
            None
        }
        StageEvent::Output(other) => {
            tracing::warn!(frame = other.frame_id(), kind = ?other.kind(), "unexpected output");
            None
        }
        StageEvent::Dropped { stage, frame_id } => {
            tracing::warn!(stage = %stage, frame = frame_id, "frame dropped");
            None
        }
        StageEvent::Failed { stage, error } => {
            tracing::error!(stage = %stage, error = %error, "stage failed");
            Some(error)
        }
    }
}

/// `(min, max, mean)` of a tensor, zeros when empty.
fn summarize(data: &[f32]) -> (f32, f32, f32) {
    if data.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = (data.iter().map(|&v| v as f64).sum::<f64>() / data.len() as f64) as f32;
    (min, max, mean)
}

/// Load `model` on the configured backend and print its tensors.
pub fn inspect_model(config: &PipelineConfig, model: &Path) -> Result<()> {
    let blob = ModelBlob::read(model)?;
    let mut session = DeviceSession::new(backend_for(config.backend)?);
    session.init_runtime()?;
    session.set_device(config.device_id)?;
    let ctx = session.create_context(config.device_id)?;
    session.create_stream(ctx)?;
    let loaded = session.load_model(&blob)?;
    drop(blob);

    println!("model: {} ({} bytes)", model.display(), std::fs::metadata(model)?.len());
    println!("quantized: {}", loaded.io.is_quantized());
    for desc in &loaded.io.inputs {
        println!("input  {}", desc.describe());
    }
    for desc in &loaded.io.outputs {
        println!("output {}", desc.describe());
    }
    session.release_all();
    Ok(())
}

pub fn parse_grids(list: &str) -> Result<Vec<usize>> {
    let grids = list
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .ok()
                .filter(|&g| g > 0)
                .ok_or_else(|| EdgeError::Config(format!("invalid grid size '{s}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    if grids.is_empty() {
        return Err(EdgeError::Config("at least one output grid is required".into()));
    }
    Ok(grids)
}

pub fn write_sim_model(path: &Path, width: usize, height: usize, outputs: &str) -> Result<()> {
    let spec = SimModelSpec::detector(width, height, &parse_grids(outputs)?);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, spec.to_json()?)?;
    tracing::info!(
        path = %path.display(),
        width,
        height,
        outputs = spec.outputs.len(),
        "wrote simulated model"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_device::{SimBackend, SimFault, SimOp};
    use image::{Rgb, RgbImage};

    #[test]
    fn grids_parse_and_reject_garbage() {
        assert_eq!(parse_grids("20, 40,80").unwrap(), vec![20, 40, 80]);
        assert!(parse_grids("").is_err());
        assert!(parse_grids("20,x").is_err());
        assert!(parse_grids("0").is_err());
    }

    #[test]
    fn directory_inputs_are_sorted_images_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let paths = collect_inputs(dir.path()).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn undecodable_image_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(load_frame(&path, 0), Err(EdgeError::ImageDecode(_))));
    }

    #[test]
    fn sim_model_runs_through_the_cli_path() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("models/sim.json");
        write_sim_model(&model, 32, 32, "4,8").unwrap();

        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        RgbImage::from_pixel(48, 40, Rgb([1, 2, 3]))
            .save(images.join("frame.png"))
            .unwrap();

        let config = PipelineConfig {
            model_path: model.clone(),
            model_width: 32,
            model_height: 32,
            ..PipelineConfig::default()
        };
        inspect_model(&config, &model).unwrap();
        run_inputs(&config, &images, OutputFormat::Json).unwrap();
    }

    #[test]
    fn fatal_stage_failure_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("sim.json");
        write_sim_model(&model, 16, 16, "2").unwrap();
        let image = dir.path().join("frame.png");
        RgbImage::from_pixel(16, 16, Rgb([9, 9, 9])).save(&image).unwrap();

        let config = PipelineConfig {
            model_path: model,
            model_width: 16,
            model_height: 16,
            ..PipelineConfig::default()
        };
        let backend = SimBackend::new().with_fault(SimFault::on(SimOp::Execute));
        let pipeline = Pipeline::from_config(&config, backend).unwrap();

        let result = run_pipeline(pipeline, &[image], WorkerOptions::from(&config), OutputFormat::Text);
        assert!(matches!(result, Err(EdgeError::Device { .. })));
    }

    #[test]
    fn summary_of_empty_tensor_is_zero() {
        assert_eq!(summarize(&[]), (0.0, 0.0, 0.0));
        assert_eq!(summarize(&[1.0, 3.0]), (1.0, 3.0, 2.0));
    }
}
