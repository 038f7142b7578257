use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use edgeflow_core::{ColorOrder, EdgeError, Result};
use edgeflow_preprocess::{PreprocessConfig, ResizeFilter};
use edgeflow_runner::RunnerConfig;

/// Accelerator family the runner talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process simulated NPU. Needs no hardware.
    #[default]
    Sim,
    /// Huawei Ascend through AscendCL. Requires the `acl` feature.
    Acl,
    /// Rockchip NPU through librknnrt. Requires the `rknn` feature.
    Rknn,
}

/// Optional scheduling tweaks for latency-sensitive deployments.
/// Both need elevated privileges (CAP_SYS_NICE, or root for oom_score_adj).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// SCHED_FIFO at maximum priority for every stage worker thread.
    pub realtime_thread: bool,
    /// oom_score_adj -1000, nice -20 and SCHED_RR for the whole process.
    pub realtime_process: bool,
}

/// Runtime configuration for a preprocess → runner pipeline.
///
/// Loaded from a JSON file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model artifact: `.om` for Ascend, `.rknn` for Rockchip, a JSON
    /// manifest for the simulated backend.
    pub model_path: PathBuf,
    pub device_id: u32,
    pub model_width: u32,
    pub model_height: u32,
    pub backend: BackendKind,
    pub resize_filter: ResizeFilter,
    /// Channel order of incoming frames.
    pub input_color: ColorOrder,
    /// Capacity of each queue between stage workers.
    pub queue_depth: usize,
    pub priority: PriorityConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolox_s.json"),
            device_id: 0,
            model_width: 640,
            model_height: 640,
            backend: BackendKind::default(),
            resize_filter: ResizeFilter::default(),
            input_color: ColorOrder::Bgr,
            queue_depth: 8,
            priority: PriorityConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Preset for Ascend 310 boards running an offline `.om` model.
    pub fn ascend310() -> Self {
        Self {
            model_path: PathBuf::from("models/yolox_s.om"),
            backend: BackendKind::Acl,
            ..Self::default()
        }
    }

    /// Preset for RK3588 boards. NPU core 0, realtime worker threads.
    pub fn rk3588() -> Self {
        Self {
            model_path: PathBuf::from("models/yolox_s.rknn"),
            backend: BackendKind::Rknn,
            priority: PriorityConfig {
                realtime_thread: true,
                realtime_process: false,
            },
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data).map_err(|e| {
            EdgeError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), backend = ?config.backend, "loaded pipeline config");
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EdgeError::Config(format!("failed to encode config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_width == 0 || self.model_height == 0 {
            return Err(EdgeError::Config(format!(
                "model size must be non-zero, got {}x{}",
                self.model_width, self.model_height
            )));
        }
        if self.queue_depth == 0 {
            return Err(EdgeError::Config("queue_depth must be at least 1".into()));
        }
        Ok(())
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new(&self.model_path)
            .with_device(self.device_id)
            .with_model_size(self.model_width, self.model_height)
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            model_width: self.model_width,
            model_height: self.model_height,
            filter: self.resize_filter,
            output_color: ColorOrder::Rgb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = PipelineConfig::default();
        let json = config.to_json().unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(json.contains("\"backend\": \"sim\""));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: PipelineConfig =
            serde_json::from_str(r#"{"backend": "rknn", "priority": {"realtime_thread": true}}"#)
                .unwrap();
        assert_eq!(parsed.backend, BackendKind::Rknn);
        assert!(parsed.priority.realtime_thread);
        assert!(!parsed.priority.realtime_process);
        assert_eq!(parsed.model_width, 640);
        assert_eq!(parsed.queue_depth, 8);
        assert_eq!(parsed.input_color, ColorOrder::Bgr);
    }

    #[test]
    fn from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"queue_depth": 0}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(EdgeError::Config(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(EdgeError::Config(_))
        ));

        assert!(matches!(
            PipelineConfig::from_file(&dir.path().join("missing.json")),
            Err(EdgeError::Io(_))
        ));
    }

    #[test]
    fn presets_pick_their_backend() {
        assert_eq!(PipelineConfig::ascend310().backend, BackendKind::Acl);
        let rk = PipelineConfig::rk3588();
        assert_eq!(rk.backend, BackendKind::Rknn);
        assert!(rk.priority.realtime_thread);
    }

    #[test]
    fn derived_stage_configs_share_model_size() {
        let config = PipelineConfig {
            model_width: 416,
            model_height: 320,
            device_id: 2,
            ..PipelineConfig::default()
        };
        let runner = config.runner_config();
        assert_eq!((runner.model_width, runner.model_height, runner.device_id), (416, 320, 2));
        let pre = config.preprocess_config();
        assert_eq!((pre.model_width, pre.model_height), (416, 320));
        assert_eq!(pre.output_color, ColorOrder::Rgb);
    }
}
