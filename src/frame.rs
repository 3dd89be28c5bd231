// 该文件是 Saoma （扫码） 项目的一部分。
// src/frame.rs - 视频帧与模型输入张量定义
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

use chrono::{DateTime, Local};
use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

/// 检测模型的固定输入边长
pub const MODEL_INPUT_SIZE: u32 = 640;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 一帧 RGB 图像（HWC 排列），创建后不可修改
#[derive(Debug, Clone)]
pub struct Frame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  timestamp: DateTime<Local>,
}

impl Frame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      timestamp: Local::now(),
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn timestamp(&self) -> DateTime<Local> {
    self.timestamp
  }

  pub fn as_rgb(&self) -> &[u8] {
    &self.data
  }

  /// 帧中是否有可用像素（浏览器/驱动尚未解码出图像时为空）
  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0 || self.data.is_empty()
  }

  /// 借用像素数据构造 `image` 视图，不复制
  pub fn view(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
    ImageBuffer::from_raw(self.width, self.height, self.as_rgb())
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.into_raw().into_boxed_slice(),
      width,
      height,
      timestamp: Local::now(),
    }
  }
}

impl From<&RgbImage> for Frame {
  fn from(image: &RgbImage) -> Self {
    Frame::from(image.clone())
  }
}

/// 检测模型输入张量，形状固定为 `1×640×640×3`（NHWC），取值范围 [0, 1]
///
/// 张量只在一次推理期间存活，离开作用域即释放。
#[derive(Debug, Clone)]
pub struct Tensor {
  data: Array4<f32>,
}

impl Tensor {
  pub const SHAPE: [usize; 4] = [
    1,
    MODEL_INPUT_SIZE as usize,
    MODEL_INPUT_SIZE as usize,
    RGB_CHANNELS,
  ];

  pub(crate) fn from_array(data: Array4<f32>) -> Self {
    debug_assert_eq!(data.shape(), &Self::SHAPE);
    Self { data }
  }

  /// 全 1 张量，用于模型预热
  pub fn ones() -> Self {
    Self {
      data: Array4::ones(Self::SHAPE),
    }
  }

  pub fn shape(&self) -> &[usize] {
    self.data.shape()
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_rejects_wrong_length() {
    let err = Frame::new(4, 4, vec![0u8; 10]).unwrap_err();
    assert!(matches!(
      err,
      FrameError::LengthMismatch {
        expected: 48,
        actual: 10
      }
    ));
  }

  #[test]
  fn frame_from_image_keeps_pixels() {
    let image = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 7]));
    let frame = Frame::from(&image);
    assert_eq!(frame.width(), 3);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.as_rgb(), image.as_raw().as_slice());
    assert_eq!(frame.view().unwrap().get_pixel(2, 1), &Rgb([2, 1, 7]));
  }

  #[test]
  fn ones_tensor_has_model_shape() {
    let tensor = Tensor::ones();
    assert_eq!(tensor.shape(), &[1, 640, 640, 3]);
    assert!(tensor.as_array().iter().all(|&v| v == 1.0));
  }
}
