// 该文件是 Saoma （扫码） 项目的一部分。
// src/model.rs - 检测模型
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

use ndarray::ArrayView2;
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 检测器输出的一行原始候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateRow {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub confidence: f32,
}

impl CandidateRow {
  pub fn new(cx: f32, cy: f32, w: f32, h: f32, confidence: f32) -> Self {
    Self {
      cx,
      cy,
      w,
      h,
      confidence,
    }
  }
}

/// 模型输出的全部候选框，顺序与模型输出一致，坐标已归一化到 [0, 1]
#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub rows: Box<[CandidateRow]>,
}

impl DetectResult {
  /// 从 `[C, N]` 形状（每列一个候选框）的原始输出转置得到 `[N, C]` 行
  ///
  /// 前四个通道为 `cx, cy, w, h`，之后的通道取最大值作为置信度。
  /// `scale` 非零时坐标除以该值（像素坐标转归一化坐标）。
  pub fn from_channels_first(
    output: ArrayView2<'_, f32>,
    scale: Option<f32>,
  ) -> Result<Self, OutputLayoutError> {
    let channels = output.nrows();
    if channels < 5 {
      return Err(OutputLayoutError::TooFewChannels(channels));
    }

    let divisor = scale.filter(|s| *s > 0.0).unwrap_or(1.0);
    let rows = output
      .columns()
      .into_iter()
      .map(|col| {
        let confidence = col
          .iter()
          .skip(4)
          .copied()
          .fold(f32::NEG_INFINITY, f32::max);
        CandidateRow::new(
          col[0] / divisor,
          col[1] / divisor,
          col[2] / divisor,
          col[3] / divisor,
          confidence,
        )
      })
      .collect();

    Ok(DetectResult { rows })
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputLayoutError {
  #[error("模型输出通道数为 {0}，至少需要 5 个（cx, cy, w, h, conf）")]
  TooFewChannels(usize),
  #[error("模型输出维度不符: {0:?}")]
  UnexpectedShape(Vec<usize>),
}

/// 最终选出的检测框，`bbox` 为归一化左上角形式 `[x, y, w, h]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4],
  pub confidence: f32,
}

pub mod preprocess;
pub mod select;
pub mod state;

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{Coords, ModelLoadError, OnnxDetector, OnnxDetectorBuilder, OnnxError};
