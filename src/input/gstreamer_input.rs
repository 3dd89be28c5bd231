// 该文件是 Saoma （扫码） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 摄像头输入
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

//! # GStreamer 摄像头输入
//!
//! 支持两种来源：
//! - `gst://camera/dev/video0?front=/dev/video2&width=1280&height=720&fps=30`
//! - `gst://file/path/to/video.mp4`
//!
//! 摄像头模式下 `front` 可省略，此时通过 V4L2 设备枚举选取另一个采集设备作为前置摄像头。
//! 其余可选参数：`format`（相机原始格式）、`io-mode`、`rotate`（0/90/180/270）。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! 管道描述直接交给 GStreamer 解析，不要把不可信输入拼进 URL。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::Frame,
  input::{CameraAccessError, Facing, FrameSource},
};

/// 单次取帧的最长等待时间
const PULL_TIMEOUT_MS: u64 = 100;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("元素无法转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不符: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        let mut caps = vec!["video/x-raw".to_string()];
        if let Some(format) = format {
          caps.push(format!("format={}", format));
        }
        if let Some(width) = width {
          caps.push(format!("width={}", width));
        }
        if let Some(height) = height {
          caps.push(format!("height={}", height));
        }
        caps.push(format!("framerate={}/1", fps));
        format!("v4l2src device={}{} ! {}", camera, io_mode_str, caps.join(","))
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// 输入管道构建器，按朝向生成前后两条管道描述
pub struct GStreamerInputPipelineBuilder {
  back: Vec<GStreamerInputBuilderItem>,
  front: Option<Vec<GStreamerInputBuilderItem>>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  fn camera_items(camera: String, query: &HashMap<String, String>) -> Vec<GStreamerInputBuilderItem> {
    let io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
    let format = query.get("format").cloned();
    let width = query.get("width").and_then(|v| v.parse::<u32>().ok());
    let height = query.get("height").and_then(|v| v.parse::<u32>().ok());
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(30);

    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera,
      io_mode,
      format,
      width,
      height,
      fps,
    }];
    items.extend(Self::video_flip(query.get("rotate").map(|s| s.as_ref())));
    items
  }

  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let back = Self::camera_items(path.to_string(), query);
    let front = query
      .get("front")
      .cloned()
      .or_else(|| enumerate_other_camera(path))
      .map(|camera| Self::camera_items(camera, query));

    GStreamerInputPipelineBuilder { back, front }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(|s| s.as_ref())));

    GStreamerInputPipelineBuilder {
      back: items,
      front: None,
    }
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  fn describe(items: &[GStreamerInputBuilderItem]) -> String {
    let basic_pipeline = items
      .iter()
      .chain(std::iter::once(&GStreamerInputBuilderItem::TargetFormat {
        format: "RGB".to_string(),
      }))
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!("{} ! appsink max-buffers=2 drop=true name=sink", basic_pipeline)
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let back = Self::describe(&self.back);
    let front = self.front.as_deref().map(Self::describe);
    debug!("后置管道描述: {}", back);
    if let Some(front) = &front {
      debug!("前置管道描述: {}", front);
    }

    Ok(GStreamerInput {
      back,
      front,
      running: None,
    })
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = decode_url_path(url);

    match url.host_str() {
      Some("camera") => Ok(Self::build_camera_pipeline(&path, &query)),
      Some("file") => Ok(Self::build_file_pipeline(&path, &query)),
      _ => Err(GStreamerInputError::SchemeMismatch),
    }
  }
}

/// 通过 V4L2 枚举找到与 `current` 不同的第一个设备
fn enumerate_other_camera(current: &str) -> Option<String> {
  let nodes = v4l::context::enum_devices();
  debug!("枚举到 {} 个 V4L2 设备", nodes.len());
  nodes
    .iter()
    .map(|node| node.path().display().to_string())
    .find(|path| path != current)
}

struct RunningPipeline {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl RunningPipeline {
  fn launch(description: &str) -> Result<Self, GStreamerInputError> {
    info!("启动 GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
      let _ = pipeline.set_state(gst::State::Null);
      return Err(e.into());
    }

    Ok(RunningPipeline { pipeline, appsink })
  }
}

impl Drop for RunningPipeline {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

/// GStreamer 帧来源
///
/// `start` 时才真正打开设备，`stop` 把管道置为 `Null` 并释放设备。
pub struct GStreamerInput {
  back: String,
  front: Option<String>,
  running: Option<RunningPipeline>,
}

impl FrameSource for GStreamerInput {
  fn start(&mut self, facing: Facing) -> Result<(), CameraAccessError> {
    // 同一时刻只允许一条管道占用设备
    self.stop();

    let description = match facing {
      Facing::Back => &self.back,
      Facing::Front => self
        .front
        .as_ref()
        .ok_or_else(|| CameraAccessError::NotFound(format!("没有{}摄像头", facing)))?,
    };

    let running = RunningPipeline::launch(description).map_err(|e| match e {
      GStreamerInputError::StateChangeError(e) => CameraAccessError::Busy(e.to_string()),
      other => CameraAccessError::Backend(other.to_string()),
    })?;
    self.running = Some(running);
    Ok(())
  }

  fn current_frame(&mut self) -> Option<Frame> {
    let running = self.running.as_ref()?;
    let sample = running
      .appsink
      .try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))?;
    convert_sample(&sample)
      .map_err(|e| {
        error!("取帧失败: {}", e);
        e
      })
      .ok()
  }

  fn stop(&mut self) {
    if self.running.take().is_some() {
      info!("GStreamer 输入已停止");
    }
  }

  fn device_count(&self) -> usize {
    1 + self.front.is_some() as usize
  }

  fn is_finished(&self) -> bool {
    self
      .running
      .as_ref()
      .is_some_and(|running| running.appsink.is_eos())
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<Frame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e))
  })?;
  let data = map.as_slice();

  let expected_size = stride * height.saturating_sub(1) + width * 3;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(width * height * 3);
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for h in 0..height {
        let row = &data[h * stride..h * stride + width * 3];
        pixels.extend_from_slice(row);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for h in 0..height {
        let row = &data[h * stride..h * stride + width * 3];
        for bgr in row.chunks_exact(3) {
          pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
        }
      }
    }
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  }

  Frame::new(width as u32, height as u32, pixels)
    .map_err(|e| GStreamerInputError::PipelineError(e.to_string()))
}
