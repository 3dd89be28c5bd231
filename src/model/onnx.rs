// 该文件是 Saoma （扫码） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 检测器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{fs::File, io::Read, time::Instant};

use ndarray::{Axis, Ix3};
use ort::{GraphOptimizationLevel, Session};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::{MODEL_INPUT_SIZE, Tensor},
  model::{
    DetectResult, Model, OutputLayoutError,
    state::{LoadReporter, STATUS_LOADING_DEPENDENCIES, STATUS_LOADING_MODEL, ScannerState},
  },
  output::StatusHub,
};

const READ_CHUNK_SIZE: usize = 1024 * 1024;
const PROGRESS_MODEL_START: u8 = 20;
const PROGRESS_MODEL_READ: u8 = 80;
const PROGRESS_SESSION: u8 = 85;
const PROGRESS_WARM_UP: u8 = 90;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("模型输出格式错误: {0}")]
  Layout(#[from] OutputLayoutError),
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型参数无效: {0}")]
  InvalidParameter(String),
  #[error("读取模型文件 {0} 失败: {1}")]
  Io(String, std::io::Error),
  #[error("模型文件为空: {0}")]
  Empty(String),
  #[error("创建推理会话失败: {0}")]
  Session(ort::Error),
  #[error("模型预热失败: {0}")]
  WarmUp(OnnxError),
}

/// 模型输出坐标的单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coords {
  /// 输入尺寸上的像素坐标，需要除以输入尺寸
  #[default]
  Pixel,
  Normalized,
}

/// `onnx:///path/model.onnx?threads=4&coords=pixel&size=640`
#[derive(Debug, Clone)]
pub struct OnnxDetectorBuilder {
  model_path: String,
  threads: Option<usize>,
  coords: Coords,
  input_size: u32,
}

impl FromUrlWithScheme for OnnxDetectorBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxDetectorBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = OnnxDetectorBuilder {
      model_path: decode_url_path(url),
      threads: None,
      coords: Coords::default(),
      input_size: MODEL_INPUT_SIZE,
    };

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "threads" => {
          let threads = value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ModelLoadError::InvalidParameter(format!("threads={}", value)))?;
          builder.threads = Some(threads);
        }
        "coords" => {
          builder.coords = match value.as_ref() {
            "pixel" => Coords::Pixel,
            "normalized" => Coords::Normalized,
            other => {
              return Err(ModelLoadError::InvalidParameter(format!("coords={}", other)));
            }
          };
        }
        "size" => {
          builder.input_size = value
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ModelLoadError::InvalidParameter(format!("size={}", value)))?;
        }
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl OnnxDetectorBuilder {
  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn with_threads(mut self, threads: usize) -> Self {
    self.threads = Some(threads.max(1));
    self
  }

  pub fn with_coords(mut self, coords: Coords) -> Self {
    self.coords = coords;
    self
  }

  /// 加载模型并把进度推送到状态中心
  pub fn build(self, hub: &StatusHub) -> Result<OnnxDetector, ModelLoadError> {
    let mut reporter = LoadReporter::new(hub);
    let result = self.build_with(&mut reporter);
    if let Err(e) = &result {
      error!("模型初始化失败: {}", e);
      reporter.fail(e);
    }
    debug_assert!(matches!(
      reporter.state(),
      ScannerState::Ready | ScannerState::Failed
    ));
    result
  }

  fn build_with(self, reporter: &mut LoadReporter<'_>) -> Result<OnnxDetector, ModelLoadError> {
    reporter.progress(0, STATUS_LOADING_DEPENDENCIES);
    reporter.progress(PROGRESS_MODEL_START, STATUS_LOADING_MODEL);

    info!("加载模型文件: {}", self.model_path);
    let model_data = self.read_model(reporter)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let mut session_builder = Session::builder()
      .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
      .map_err(ModelLoadError::Session)?;
    if let Some(threads) = self.threads {
      debug!("推理线程数: {}", threads);
      session_builder = session_builder
        .with_intra_threads(threads)
        .map_err(ModelLoadError::Session)?;
    }
    let session = session_builder
      .commit_from_memory(&model_data)
      .map_err(ModelLoadError::Session)?;
    drop(model_data);
    reporter.progress(PROGRESS_SESSION, STATUS_LOADING_MODEL);

    debug!("模型输入数量: {}", session.inputs.len());
    debug!("模型输出数量: {}", session.outputs.len());

    let scale = match self.coords {
      Coords::Pixel => Some(self.input_size as f32),
      Coords::Normalized => None,
    };
    let detector = OnnxDetector { session, scale };

    reporter.progress(PROGRESS_WARM_UP, STATUS_LOADING_MODEL);
    let now = Instant::now();
    detector
      .infer(&Tensor::ones())
      .map_err(ModelLoadError::WarmUp)?;
    info!("模型预热完成，耗时: {:.2?}", now.elapsed());

    reporter.ready();
    info!("模型加载完成");
    Ok(detector)
  }

  /// 分块读取模型文件，读取进度映射到 20..80
  fn read_model(&self, reporter: &mut LoadReporter<'_>) -> Result<Vec<u8>, ModelLoadError> {
    let io_error = |e| ModelLoadError::Io(self.model_path.clone(), e);

    let mut file = File::open(&self.model_path).map_err(io_error)?;
    let total = file.metadata().map_err(io_error)?.len() as usize;
    if total == 0 {
      return Err(ModelLoadError::Empty(self.model_path.clone()));
    }

    let mut data = Vec::with_capacity(total);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
      let n = file.read(&mut chunk).map_err(io_error)?;
      if n == 0 {
        break;
      }
      data.extend_from_slice(&chunk[..n]);
      reporter.progress(read_progress(data.len(), total), STATUS_LOADING_MODEL);
    }

    if data.is_empty() {
      return Err(ModelLoadError::Empty(self.model_path.clone()));
    }
    Ok(data)
  }
}

fn read_progress(read: usize, total: usize) -> u8 {
  let span = (PROGRESS_MODEL_READ - PROGRESS_MODEL_START) as usize;
  let done = read.min(total) * span / total.max(1);
  PROGRESS_MODEL_START + done as u8
}

/// 已就绪的检测器，只能由 [`OnnxDetectorBuilder::build`] 得到
pub struct OnnxDetector {
  session: Session,
  scale: Option<f32>,
}

impl Model for OnnxDetector {
  type Input = Tensor;
  type Output = DetectResult;
  type Error = OnnxError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let outputs = self.session.run(ort::inputs![input.as_array().view()]?)?;
    let raw = outputs[0].try_extract_tensor::<f32>()?;
    let shape = raw.shape().to_vec();
    let raw = raw
      .into_dimensionality::<Ix3>()
      .map_err(|_| OutputLayoutError::UnexpectedShape(shape.clone()))?;
    if raw.len_of(Axis(0)) != 1 {
      return Err(OutputLayoutError::UnexpectedShape(shape).into());
    }
    let result = DetectResult::from_channels_first(raw.index_axis(Axis(0), 0), self.scale)?;
    debug!("模型输出 {:?}, 候选框数量: {}", shape, result.rows.len());
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_model_url() {
    let url = Url::parse("onnx:///opt/models/qr%20code.onnx?threads=2&coords=normalized").unwrap();
    let builder = OnnxDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), "/opt/models/qr code.onnx");
    assert_eq!(builder.threads, Some(2));
    assert_eq!(builder.coords, Coords::Normalized);
    assert_eq!(builder.input_size, MODEL_INPUT_SIZE);
  }

  #[test]
  fn rejects_bad_parameters() {
    for bad in [
      "yolo26:///m.onnx",
      "onnx:///m.onnx?threads=0",
      "onnx:///m.onnx?coords=polar",
      "onnx:///m.onnx?size=abc",
    ] {
      let url = Url::parse(bad).unwrap();
      assert!(OnnxDetectorBuilder::from_url(&url).is_err(), "{}", bad);
    }
  }

  #[test]
  fn read_progress_spans_twenty_to_eighty() {
    assert_eq!(read_progress(0, 100), 20);
    assert_eq!(read_progress(50, 100), 50);
    assert_eq!(read_progress(100, 100), 80);
    assert_eq!(read_progress(200, 100), 80);
  }

  #[test]
  fn missing_model_fails_and_reports() {
    let hub = StatusHub::new();
    let url = Url::parse("onnx:///nonexistent/saoma/model.onnx").unwrap();
    let result = OnnxDetectorBuilder::from_url(&url).unwrap().build(&hub);
    assert!(matches!(result, Err(ModelLoadError::Io(_, _))));

    let status = hub.snapshot();
    assert!(!status.ready);
    assert_eq!(status.progress, 0);
    assert_eq!(status.status_text, crate::model::state::STATUS_INIT_FAILED);
    assert!(status.error.is_some());
  }
}
