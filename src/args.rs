// 该文件是 Saoma （扫码） 项目的一部分。
// src/args.rs - 扫码参数配置
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

use std::time::Duration;

use clap::Args;
use url::Url;

use crate::{
  model::select::DETECTION_THRESHOLD,
  pipeline::ScanConfig,
  region::{PADDING_RATIO, RegionExtractor},
};

/// 两个程序共用的参数
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
  /// 检测模型，例如 onnx:///opt/saoma/qr.onnx?threads=4
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 图片: image:///path/back.png?front=/path/front.png
  /// - GStreamer: gst://camera/dev/video0 或 gst://file/path/video.mp4
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DETECTION_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 检测框四周的边距比例
  #[arg(long, default_value_t = PADDING_RATIO, value_name = "RATIO")]
  pub padding: f32,

  /// 解码前不做亮度/对比度调整
  #[arg(long)]
  pub no_enhance: bool,

  /// 切换摄像头时的等待时间（毫秒）
  #[arg(long, default_value_t = 500, value_name = "MILLIS")]
  pub switch_delay: u64,

  /// 识别到网址时只打印，不打开浏览器
  #[arg(long)]
  pub print_url: bool,

  /// 以 JSON 行的形式向标准输出推送状态
  #[arg(long)]
  pub json_status: bool,
}

impl ScanArgs {
  pub fn scan_config(&self) -> ScanConfig {
    let mut extractor = RegionExtractor::default().with_padding_ratio(self.padding.max(0.0));
    if self.no_enhance {
      extractor = extractor.without_enhance();
    }
    ScanConfig {
      threshold: self.threshold,
      extractor,
      switch_delay: Duration::from_millis(self.switch_delay),
    }
  }
}
