// 该文件是 Saoma （扫码） 项目的一部分。
// src/bin/saoma_oneshot.rs - 单张图像扫码
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use saoma::{
  FromUrl,
  args::ScanArgs,
  decode::RqrrDecoder,
  frame::Frame,
  input::InputWrapper,
  model::OnnxDetectorBuilder,
  output::{JsonLinesStatus, LogStatus, Navigator, PrintUrl, StatusHub, SystemBrowser},
  pipeline::{PassOutcome, Pipeline},
  region::Region,
  task::{OneShotTask, Task},
};

/// Saoma 单次扫码
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub scan: ScanArgs,

  /// 最多尝试的帧数
  #[arg(long, default_value_t = 1, value_name = "COUNT")]
  pub attempts: usize,

  /// 保存带检测框的快照，例如 image:///tmp/snapshot.png
  #[cfg(feature = "save_image_file")]
  #[arg(long, value_name = "OUTPUT")]
  pub snapshot: Option<url::Url>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.scan.model);
  info!("输入来源: {}", args.scan.input);

  let hub = Arc::new(StatusHub::new());
  hub.subscribe(Arc::new(LogStatus));
  if args.scan.json_status {
    hub.subscribe(Arc::new(JsonLinesStatus::stdout()));
  }

  let model = OnnxDetectorBuilder::from_url(&args.scan.model)?.build(&hub)?;
  let input = InputWrapper::from_url(&args.scan.input)?;
  let navigator: Arc<dyn Navigator> = if args.scan.print_url {
    Arc::new(PrintUrl)
  } else {
    Arc::new(SystemBrowser)
  };

  let pipeline = Pipeline::new(input, model, RqrrDecoder, hub.clone(), navigator)
    .with_config(args.scan.scan_config());

  let mut last: Option<(Frame, Option<Region>)> = None;
  let outcome = OneShotTask::new(args.attempts)
    .with_inspector(|frame, region| last = Some((frame.clone(), region.copied())))
    .run_task(&pipeline)?;

  #[cfg(feature = "save_image_file")]
  if let Some(snapshot) = &args.snapshot {
    match &last {
      Some((frame, region)) => {
        let output = saoma::output::SaveImageFileOutput::from_url(snapshot)?;
        output.save_snapshot(frame, region.as_ref())?;
        info!("快照已保存到: {}", output.path());
      }
      None => warn!("没有可保存的帧"),
    }
  }
  #[cfg(not(feature = "save_image_file"))]
  drop(last);

  match outcome {
    PassOutcome::Text(text) => {
      println!("{}", text);
      Ok(())
    }
    PassOutcome::Url(url) => {
      info!("已处理网址: {}", url);
      Ok(())
    }
    other => {
      warn!("状态: {}", hub.snapshot().status_text);
      anyhow::bail!("未识别到二维码: {:?}", other)
    }
  }
}
