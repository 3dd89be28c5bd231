// 该文件是 Saoma （扫码） 项目的一部分。
// src/model/preprocess.rs - 模型输入预处理
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

use image::imageops::{self, FilterType};
use ndarray::Array4;
use tracing::trace;

use crate::frame::{Frame, MODEL_INPUT_SIZE, Tensor};

/// 双线性缩放到 640×640，除以 255 归一化，并加上 batch 维度
///
/// 帧中没有像素时返回 `None`。
pub fn transform(frame: &Frame) -> Option<Tensor> {
  if frame.is_empty() {
    return None;
  }
  let view = frame.view()?;

  let resized = imageops::resize(&view, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Triangle);
  trace!(
    "预处理: {}x{} -> {}x{}",
    frame.width(),
    frame.height(),
    MODEL_INPUT_SIZE,
    MODEL_INPUT_SIZE
  );

  let data = Array4::from_shape_vec(
    Tensor::SHAPE,
    resized.into_raw().into_iter().map(|v| v as f32 / 255.0).collect(),
  )
  .ok()?;

  Some(Tensor::from_array(data))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn uniform_frame_normalizes_to_unit_range() {
    let frame = Frame::from(RgbImage::from_pixel(320, 240, Rgb([255, 0, 51])));
    let tensor = transform(&frame).unwrap();
    assert_eq!(tensor.shape(), &[1, 640, 640, 3]);

    let data = tensor.as_array();
    assert!((data[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    assert!(data[[0, 639, 639, 1]].abs() < 1e-6);
    assert!((data[[0, 300, 100, 2]] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn keeps_spatial_layout() {
    // 左半白、右半黑
    let frame = Frame::from(RgbImage::from_fn(64, 64, |x, _| {
      if x < 32 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
    }));
    let tensor = transform(&frame).unwrap();
    let data = tensor.as_array();
    assert!(data[[0, 320, 10, 0]] > 0.99);
    assert!(data[[0, 320, 630, 0]] < 0.01);
  }

  #[test]
  fn empty_frame_has_no_tensor() {
    let frame = Frame::new(0, 0, Vec::new()).unwrap();
    assert!(transform(&frame).is_none());
  }

  #[test]
  fn is_deterministic() {
    let frame = Frame::from(RgbImage::from_fn(97, 53, |x, y| {
      Rgb([(x * 3) as u8, (y * 5) as u8, (x ^ y) as u8])
    }));
    let a = transform(&frame).unwrap();
    let b = transform(&frame).unwrap();
    assert_eq!(a.as_array(), b.as_array());
  }
}
