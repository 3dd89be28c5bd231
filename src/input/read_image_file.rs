// 该文件是 Saoma （扫码） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

//! 把静态图像当作摄像头使用。
//!
//! `image:///path/back.png?front=/path/front.png` 中 `front` 可选，
//! 提供时视为第二个（前置）设备。

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::Frame,
  input::{CameraAccessError, Facing, FrameSource},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemaMismatch(String),
  #[error("图像路径为空")]
  EmptyPath,
}

pub struct ImageFileInput {
  back: PathBuf,
  front: Option<PathBuf>,
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch(url.scheme().to_string()));
    }

    let back = decode_url_path(url);
    if back.is_empty() || back == "/" {
      return Err(ImageFileInputError::EmptyPath);
    }

    let front = url
      .query_pairs()
      .find(|(k, _)| k == "front")
      .map(|(_, v)| PathBuf::from(v.into_owned()));

    Ok(ImageFileInput {
      back: PathBuf::from(back),
      front,
      image: None,
    })
  }
}

impl ImageFileInput {
  pub fn new(back: impl AsRef<Path>) -> Self {
    Self {
      back: back.as_ref().to_path_buf(),
      front: None,
      image: None,
    }
  }

  pub fn with_front(mut self, front: impl AsRef<Path>) -> Self {
    self.front = Some(front.as_ref().to_path_buf());
    self
  }

  fn path_for(&self, facing: Facing) -> Option<&Path> {
    match facing {
      Facing::Back => Some(&self.back),
      Facing::Front => self.front.as_deref(),
    }
  }
}

fn load_image(path: &Path) -> Result<RgbImage, CameraAccessError> {
  let reader = ImageReader::open(path).map_err(|e| {
    CameraAccessError::NotFound(format!("{}: {}", path.display(), e))
  })?;
  let image = reader.decode().map_err(|e| {
    CameraAccessError::Backend(format!("{}: {}", path.display(), e))
  })?;
  Ok(image.into_rgb8())
}

impl FrameSource for ImageFileInput {
  fn start(&mut self, facing: Facing) -> Result<(), CameraAccessError> {
    let path = self
      .path_for(facing)
      .ok_or_else(|| CameraAccessError::NotFound(format!("没有{}图像", facing)))?;
    info!("打开图像输入: {} ({})", path.display(), facing);
    let image = load_image(path)?;
    debug!("图像尺寸: {}x{}", image.width(), image.height());
    self.image = Some(image);
    Ok(())
  }

  fn current_frame(&mut self) -> Option<Frame> {
    self.image.as_ref().map(Frame::from)
  }

  fn stop(&mut self) {
    if self.image.take().is_some() {
      debug!("关闭图像输入: {}", self.back.display());
    }
  }

  fn device_count(&self) -> usize {
    1 + self.front.is_some() as usize
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_front_query() {
    let url = Url::parse("image:///tmp/back%20side.png?front=/tmp/front.png").unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.back, PathBuf::from("/tmp/back side.png"));
    assert_eq!(input.front, Some(PathBuf::from("/tmp/front.png")));
    assert_eq!(input.device_count(), 2);
  }

  #[test]
  fn missing_file_is_camera_error() {
    let mut input = ImageFileInput::new("/definitely/not/here.png");
    assert!(matches!(
      input.start(Facing::Back),
      Err(CameraAccessError::NotFound(_))
    ));
    assert!(input.current_frame().is_none());
  }

  #[test]
  fn front_without_image_is_not_found() {
    let mut input = ImageFileInput::new("/tmp/back.png");
    assert_eq!(input.device_count(), 1);
    assert!(matches!(
      input.start(Facing::Front),
      Err(CameraAccessError::NotFound(_))
    ));
  }

  #[test]
  fn serves_frames_until_stopped() {
    let dir = std::env::temp_dir().join(format!("saoma-image-input-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("still.png");
    RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let mut input = ImageFileInput::new(&path);
    input.start(Facing::Back).unwrap();
    let frame = input.current_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 6));
    assert_eq!(&frame.as_rgb()[..3], &[10, 20, 30]);

    input.stop();
    input.stop();
    assert!(input.current_frame().is_none());

    std::fs::remove_dir_all(&dir).ok();
  }
}
