// 该文件是 Saoma （扫码） 项目的一部分。
// src/input.rs - 摄像头/图像帧来源
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

use std::fmt;

use thiserror::Error;

use crate::{FromUrl, frame::Frame};

/// 摄像头朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
  Front,
  #[default]
  Back,
}

impl Facing {
  pub fn flipped(self) -> Self {
    match self {
      Facing::Front => Facing::Back,
      Facing::Back => Facing::Front,
    }
  }
}

impl fmt::Display for Facing {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Facing::Front => write!(f, "前置"),
      Facing::Back => write!(f, "后置"),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraAccessError {
  #[error("没有访问摄像头的权限: {0}")]
  PermissionDenied(String),
  #[error("摄像头正忙: {0}")]
  Busy(String),
  #[error("找不到摄像头: {0}")]
  NotFound(String),
  #[error("摄像头后端错误: {0}")]
  Backend(String),
}

/// 帧来源
///
/// 一个帧来源独占一个摄像头设备。`stop` 必须是幂等的，
/// 且返回之后不再产生任何帧。
pub trait FrameSource: Send {
  fn start(&mut self, facing: Facing) -> Result<(), CameraAccessError>;

  /// 当前帧；设备未就绪或已停止时返回 `None`
  fn current_frame(&mut self) -> Option<Frame>;

  fn stop(&mut self);

  /// 可用设备数量，大于 1 时才允许切换摄像头
  fn device_count(&self) -> usize {
    1
  }

  /// 有限来源（如视频文件）已读完，之后不会再有新帧
  fn is_finished(&self) -> bool {
    false
  }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn start(&mut self, facing: Facing) -> Result<(), CameraAccessError> {
    (**self).start(facing)
  }

  fn current_frame(&mut self) -> Option<Frame> {
    (**self).current_frame()
  }

  fn stop(&mut self) {
    (**self).stop()
  }

  fn device_count(&self) -> usize {
    (**self).device_count()
  }

  fn is_finished(&self) -> bool {
    (**self).is_finished()
  }
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl FrameSource for InputWrapper {
  fn start(&mut self, facing: Facing) -> Result<(), CameraAccessError> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.start(facing),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.start(facing),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = facing;
        Err(CameraAccessError::NotFound("没有启用任何输入".to_string()))
      }
    }
  }

  fn current_frame(&mut self) -> Option<Frame> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.current_frame(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.current_frame(),
      #[allow(unreachable_patterns)]
      _ => None,
    }
  }

  fn stop(&mut self) {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.stop(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.stop(),
      #[allow(unreachable_patterns)]
      _ => {}
    }
  }

  fn device_count(&self) -> usize {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.device_count(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.device_count(),
      #[allow(unreachable_patterns)]
      _ => 0,
    }
  }

  fn is_finished(&self) -> bool {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.is_finished(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.is_finished(),
      #[allow(unreachable_patterns)]
      _ => false,
    }
  }
}
