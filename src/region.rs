// 该文件是 Saoma （扫码） 项目的一部分。
// src/region.rs - 检测区域裁剪与增强
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

use image::RgbImage;
use tracing::{debug, trace};

use crate::{
  frame::{Frame, RGB_CHANNELS},
  model::Detection,
};

pub const PADDING_RATIO: f32 = 0.10;

/// 原始帧上的像素矩形，已裁剪到帧边界内且宽高均大于 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 亮度/对比度调整: `(v - 128) * contrast + 128 + brightness`，结果截断到 [0, 255]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enhance {
  pub brightness: f32,
  pub contrast: f32,
}

impl Default for Enhance {
  fn default() -> Self {
    Self {
      brightness: -50.0,
      contrast: 2.5,
    }
  }
}

impl Enhance {
  fn lookup_table(&self) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (v, out) in table.iter_mut().enumerate() {
      let adjusted = (v as f32 - 128.0) * self.contrast + 128.0 + self.brightness;
      *out = adjusted.round().clamp(0.0, 255.0) as u8;
    }
    table
  }

  pub fn apply(&self, image: &mut RgbImage) {
    let table = self.lookup_table();
    for value in image.iter_mut() {
      *value = table[*value as usize];
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionExtractor {
  padding_ratio: f32,
  enhance: Option<Enhance>,
}

impl Default for RegionExtractor {
  fn default() -> Self {
    Self {
      padding_ratio: PADDING_RATIO,
      enhance: Some(Enhance::default()),
    }
  }
}

impl RegionExtractor {
  pub fn with_padding_ratio(mut self, padding_ratio: f32) -> Self {
    self.padding_ratio = padding_ratio;
    self
  }

  pub fn with_enhance(mut self, enhance: Enhance) -> Self {
    self.enhance = Some(enhance);
    self
  }

  pub fn without_enhance(mut self) -> Self {
    self.enhance = None;
    self
  }

  pub fn enhance(&self) -> Option<&Enhance> {
    self.enhance.as_ref()
  }

  /// 把归一化检测框换算到帧的实际像素坐标，加边距后裁剪到帧内
  ///
  /// 检测器工作在缩放后的 640×640 副本上，这里必须用帧本身的宽高换算。
  pub fn locate(&self, frame_width: u32, frame_height: u32, detection: &Detection) -> Option<Region> {
    if !detection.bbox.iter().all(|v| v.is_finite()) {
      return None;
    }

    let (fw, fh) = (frame_width as f32, frame_height as f32);
    let [bx, by, bw, bh] = detection.bbox;
    let (x, y, w, h) = (bx * fw, by * fh, bw * fw, bh * fh);

    let padding = (w.min(h) * self.padding_ratio).round().max(0.0);

    let x0 = (x - padding).clamp(0.0, fw).floor();
    let y0 = (y - padding).clamp(0.0, fh).floor();
    let x1 = (x + w + padding).clamp(0.0, fw).floor();
    let y1 = (y + h + padding).clamp(0.0, fh).floor();

    let width = x1 - x0;
    let height = y1 - y0;
    if width <= 0.0 || height <= 0.0 {
      debug!("裁剪区域无效: {:?} -> {}x{}", detection.bbox, width, height);
      return None;
    }

    Some(Region {
      x: x0 as u32,
      y: y0 as u32,
      width: width as u32,
      height: height as u32,
    })
  }

  pub fn extract(&self, frame: &Frame, detection: &Detection) -> Option<Region> {
    self.locate(frame.width(), frame.height(), detection)
  }

  /// 逐行复制区域像素，按配置做亮度/对比度调整
  pub fn crop(&self, frame: &Frame, region: &Region) -> Option<RgbImage> {
    if frame.is_empty()
      || region.x + region.width > frame.width()
      || region.y + region.height > frame.height()
    {
      return None;
    }

    let stride = frame.width() as usize * RGB_CHANNELS;
    let row_len = region.width as usize * RGB_CHANNELS;
    let left = region.x as usize * RGB_CHANNELS;
    let mut pixels = Vec::with_capacity(row_len * region.height as usize);
    for row in frame
      .as_rgb()
      .chunks_exact(stride)
      .skip(region.y as usize)
      .take(region.height as usize)
    {
      pixels.extend_from_slice(&row[left..left + row_len]);
    }

    let mut cropped = RgbImage::from_raw(region.width, region.height, pixels)?;
    if let Some(enhance) = &self.enhance {
      enhance.apply(&mut cropped);
    }
    trace!("裁剪区域: {:?}", region);
    Some(cropped)
  }
}
