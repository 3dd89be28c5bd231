// 该文件是 Saoma （扫码） 项目的一部分。
// src/bin/saoma_camera.rs - 摄像头连续扫码
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

use std::{
  io::BufRead,
  sync::{Arc, mpsc},
  thread,
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use saoma::{
  FromUrl,
  args::ScanArgs,
  decode::RqrrDecoder,
  input::{Facing, InputWrapper},
  model::OnnxDetectorBuilder,
  output::{JsonLinesStatus, LogStatus, Navigator, PrintUrl, StatusHub, SystemBrowser},
  pipeline::Pipeline,
  task::{Command, ContinuousTask, Task},
};

/// Saoma 摄像头连续扫码
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub scan: ScanArgs,

  /// 最多处理的帧数，0 表示不限制
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,

  /// 启动时使用前置摄像头
  #[arg(long)]
  pub front: bool,

  /// 从标准输入读取命令: start, stop, switch, quit
  #[arg(long)]
  pub interactive: bool,
}

/// 逐行读取标准输入并转发为命令，输入结束时关闭通道
fn spawn_stdin_commands() -> mpsc::Receiver<Command> {
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let line = match line {
        Ok(line) => line,
        Err(e) => {
          warn!("读取标准输入失败: {}", e);
          break;
        }
      };
      if line.trim().is_empty() {
        continue;
      }
      match line.parse::<Command>() {
        Ok(command) => {
          let quit = command == Command::Quit;
          if tx.send(command).is_err() || quit {
            break;
          }
        }
        Err(e) => warn!("{}", e),
      }
    }
  });
  rx
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

  let facing = if args.front { Facing::Front } else { Facing::Back };
  let pipeline = Pipeline::new(input, model, RqrrDecoder, hub, navigator)
    .with_config(args.scan.scan_config())
    .with_facing(facing);
  info!("可用摄像头数量: {}", pipeline.device_count());

  let mut task = ContinuousTask::default().with_frame_number(Some(args.frame_number));
  if args.interactive {
    info!("可用命令: start, stop, switch, quit");
    task = task.with_commands(spawn_stdin_commands());
  }

  let frames = task.run_task(&pipeline)?;
  info!("共处理 {} 帧", frames);
  Ok(())
}
