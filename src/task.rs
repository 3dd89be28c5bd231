// 该文件是 Saoma （扫码） 项目的一部分。
// src/task.rs - 扫码任务循环
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
  fmt::Display,
  str::FromStr,
  sync::mpsc::{self, Receiver, TryRecvError},
  thread,
  time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  decode::SymbolDecoder,
  frame::{Frame, Tensor},
  input::FrameSource,
  model::{DetectResult, Model},
  pipeline::{PassOutcome, Pipeline},
  region::Region,
};

/// 帧暂不可用时的等待时间
const FRAME_WAIT: Duration = Duration::from_millis(10);
/// 空闲（未扫描）时轮询命令的间隔
const IDLE_WAIT: Duration = Duration::from_millis(50);

pub trait Task<P>: Sized {
  type Output;
  type Error;
  fn run_task(self, pipeline: &P) -> Result<Self::Output, Self::Error>;
}

/// 外部控制命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Start,
  Stop,
  SwitchCamera,
  Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知命令: {0}")]
pub struct CommandParseError(String);

impl FromStr for Command {
  type Err = CommandParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "start" => Ok(Command::Start),
      "stop" => Ok(Command::Stop),
      "switch" => Ok(Command::SwitchCamera),
      "quit" | "exit" | "q" => Ok(Command::Quit),
      other => Err(CommandParseError(other.to_string())),
    }
  }
}

/// 单次扫码：最多尝试 `attempts` 帧，识别出内容即结束
pub struct OneShotTask<F = fn(&Frame, Option<&Region>)> {
  attempts: usize,
  inspect: F,
}

impl OneShotTask {
  pub fn new(attempts: usize) -> Self {
    Self {
      attempts: attempts.max(1),
      inspect: |_, _| {},
    }
  }
}

impl<F> OneShotTask<F> {
  /// 每次扫描结束后回调本帧与检测区域
  pub fn with_inspector<G: FnMut(&Frame, Option<&Region>)>(self, inspect: G) -> OneShotTask<G> {
    OneShotTask {
      attempts: self.attempts,
      inspect,
    }
  }
}

impl<S, M, D, F> Task<Pipeline<S, M, D>> for OneShotTask<F>
where
  S: FrameSource,
  M: Model<Input = Tensor, Output = DetectResult>,
  M::Error: Display,
  D: SymbolDecoder,
  F: FnMut(&Frame, Option<&Region>),
{
  type Output = PassOutcome;
  type Error = anyhow::Error;

  fn run_task(mut self, pipeline: &Pipeline<S, M, D>) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    pipeline.start()?;

    let mut outcome = PassOutcome::Inactive;
    for attempt in 1..=self.attempts {
      let inspect = &mut self.inspect;
      outcome = pipeline.run_pass_inspect(|frame, region| inspect(frame, region));
      debug!("第 {} 次扫描: {:?}", attempt, outcome);
      match &outcome {
        PassOutcome::Text(_)
        | PassOutcome::Url(_)
        | PassOutcome::Inactive
        | PassOutcome::SourceEnded => break,
        PassOutcome::FrameUnavailable => thread::sleep(FRAME_WAIT),
        _ => {}
      }
    }

    pipeline.stop();
    info!("任务完成，退出");
    Ok(outcome)
  }
}

/// 连续扫码，直到中断、达到指定帧数或收到退出命令
///
/// 下一次扫描只在上一次返回后开始。没有命令通道时，识别到网址即结束。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  commands: Option<Receiver<Command>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|n| *n > 0);
    self
  }

  pub fn with_commands(mut self, commands: Receiver<Command>) -> Self {
    self.commands = Some(commands);
    self
  }
}

/// 处理所有已到达的命令；返回 `false` 表示应当退出
fn drain_commands<S, M, D>(commands: &mut Option<Receiver<Command>>, pipeline: &Pipeline<S, M, D>) -> bool
where
  S: FrameSource,
  M: Model<Input = Tensor, Output = DetectResult>,
  M::Error: Display,
  D: SymbolDecoder,
{
  let Some(rx) = commands else {
    return true;
  };

  loop {
    match rx.try_recv() {
      Ok(command) => {
        info!("收到命令: {:?}", command);
        match command {
          Command::Start => {
            if let Err(e) = pipeline.start() {
              warn!("启动扫描失败: {}", e);
            }
          }
          Command::Stop => pipeline.stop(),
          Command::SwitchCamera => {
            if let Err(e) = pipeline.switch_camera() {
              warn!("切换摄像头失败: {}", e);
            }
          }
          Command::Quit => return false,
        }
      }
      Err(TryRecvError::Empty) => return true,
      Err(TryRecvError::Disconnected) => {
        debug!("命令通道已关闭");
        *commands = None;
        return true;
      }
    }
  }
}

impl<S, M, D> Task<Pipeline<S, M, D>> for ContinuousTask
where
  S: FrameSource,
  M: Model<Input = Tensor, Output = DetectResult>,
  M::Error: Display,
  D: SymbolDecoder,
{
  type Output = usize;
  type Error = anyhow::Error;

  fn run_task(self, pipeline: &Pipeline<S, M, D>) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    let handler = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });
    match handler {
      Ok(()) => {}
      Err(ctrlc::Error::MultipleHandlers) => warn!("中断处理已注册，沿用已有处理"),
      Err(e) => return Err(e.into()),
    }

    let mut commands = self.commands;
    pipeline.start()?;

    let mut frame_index = 0usize;
    loop {
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if !drain_commands(&mut commands, pipeline) {
        info!("收到退出命令，退出任务循环");
        break;
      }

      if !pipeline.is_scanning() {
        if commands.is_none() {
          info!("扫描已结束，退出任务循环");
          break;
        }
        thread::sleep(IDLE_WAIT);
        continue;
      }

      match pipeline.run_pass() {
        PassOutcome::FrameUnavailable => {
          thread::sleep(FRAME_WAIT);
          continue;
        }
        PassOutcome::Dropped
        | PassOutcome::Inactive
        | PassOutcome::Stale
        | PassOutcome::SourceEnded => continue,
        PassOutcome::Url(url) => info!("第 {} 帧识别到网址: {}", frame_index + 1, url),
        PassOutcome::Text(text) => info!("第 {} 帧识别到文本: {}", frame_index + 1, text),
        outcome => debug!("第 {} 帧: {:?}", frame_index + 1, outcome),
      }

      frame_index += 1;
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    pipeline.stop();
    info!("任务完成，共处理 {} 帧", frame_index);
    Ok(frame_index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_commands() {
    assert_eq!("start".parse::<Command>(), Ok(Command::Start));
    assert_eq!(" STOP\n".parse::<Command>(), Ok(Command::Stop));
    assert_eq!("switch".parse::<Command>(), Ok(Command::SwitchCamera));
    assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
    assert_eq!(
      "pause".parse::<Command>(),
      Err(CommandParseError("pause".to_string()))
    );
  }

  #[test]
  fn zero_frame_number_means_unlimited() {
    let task = ContinuousTask::default().with_frame_number(Some(0));
    assert_eq!(task.frame_number, None);
  }
}
