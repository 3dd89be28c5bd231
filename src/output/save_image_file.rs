// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/save_image_file.rs - 保存带检测框的快照
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

use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decode_url_path, frame::Frame, region::Region};

const BOX_COLOR: Rgb<u8> = Rgb([0, 123, 255]);
const BOX_THICKNESS: u32 = 2;

pub struct SaveImageFileOutput {
  path: String,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: decode_url_path(uri),
    })
  }
}

/// 在图像上画出区域边框，边框向内加粗
pub fn draw_region(image: &mut RgbImage, region: &Region) {
  for inset in 0..BOX_THICKNESS {
    let width = region.width.saturating_sub(2 * inset);
    let height = region.height.saturating_sub(2 * inset);
    if width == 0 || height == 0 {
      break;
    }
    let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32).of_size(width, height);
    draw_hollow_rect_mut(image, rect, BOX_COLOR);
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &str {
    &self.path
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", self.path);

    Ok(())
  }

  /// 保存帧快照，有检测区域时画出边框
  pub fn save_snapshot(&self, frame: &Frame, region: Option<&Region>) -> Result<(), SaveImageFileError> {
    let mut image = RgbImage::from_raw(frame.width(), frame.height(), frame.as_rgb().to_vec())
      .ok_or_else(|| SaveImageFileError::IoError(std::io::Error::other("帧数据长度与尺寸不符")))?;
    if let Some(region) = region {
      draw_region(&mut image, region);
    }
    self.save_image(image)
  }
}
