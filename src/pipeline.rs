// 该文件是 Saoma （扫码） 项目的一部分。
// src/pipeline.rs - 扫码流程编排
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
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{
  decode::SymbolDecoder,
  frame::{Frame, Tensor},
  input::{CameraAccessError, Facing, FrameSource},
  model::{
    DetectResult, Model, preprocess,
    select::{DETECTION_THRESHOLD, select},
  },
  output::{Navigator, StatusHub},
  region::{Region, RegionExtractor},
};

pub const STATUS_SCANNING: &str = "Scanning...";
pub const STATUS_SWITCHING: &str = "Switching camera...";
pub const STATUS_NO_DETECTION: &str = "Please adjust placement or brightness of QR code";
pub const STATUS_NOT_DECODED: &str = "QR code detected but not decoded, retrying...";
pub const SWITCH_DELAY: Duration = Duration::from_millis(500);

/// 扫码参数
#[derive(Debug, Clone)]
pub struct ScanConfig {
  pub threshold: f32,
  pub extractor: RegionExtractor,
  /// 切换摄像头时，停止与重新打开之间的等待时间
  pub switch_delay: Duration,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      threshold: DETECTION_THRESHOLD,
      extractor: RegionExtractor::default(),
      switch_delay: SWITCH_DELAY,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  Scanning,
}

/// 一次扫描的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
  /// 上一次扫描仍在进行，本次直接丢弃
  Dropped,
  /// 未在扫描状态
  Inactive,
  FrameUnavailable,
  NoDetection,
  /// 检测框裁剪后为空，未调用解码器
  InvalidRegion,
  NoSymbol,
  Text(String),
  Url(Url),
  /// 扫描期间发生了停止或切换，结果作废
  Stale,
  /// 帧来源已读完，流程已回到 Idle
  SourceEnded,
  DetectorError,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
  #[error("摄像头错误: {0}")]
  CameraAccess(#[from] CameraAccessError),
  #[error("当前未在扫描")]
  NotScanning,
  #[error("只有一个摄像头，无法切换")]
  SingleCamera,
}

struct Session<S> {
  state: PipelineState,
  facing: Facing,
  source: S,
  generation: u64,
}

impl<S> Session<S> {
  fn invalidate(&mut self) {
    self.generation = self.generation.wrapping_add(1);
  }
}

/// 同一时间只允许一次扫描，离开作用域时自动复位
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| InFlight(flag))
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// 检测中间结果，在重新持锁之前算好
enum Finding {
  NoDetection,
  InvalidRegion,
  NoSymbol,
  Symbol(String),
}

/// 扫码流程：帧来源 → 预处理 → 检测 → 选框 → 裁剪 → 解码 → 分类
///
/// 检测器类型只能由加载完成的模型构造，因此流程存在即代表模型已就绪。
pub struct Pipeline<S, M, D> {
  session: Mutex<Session<S>>,
  in_flight: AtomicBool,
  model: M,
  decoder: D,
  config: ScanConfig,
  hub: Arc<StatusHub>,
  navigator: Arc<dyn Navigator>,
}

impl<S, M, D> Pipeline<S, M, D>
where
  S: FrameSource,
  M: Model<Input = Tensor, Output = DetectResult>,
  M::Error: Display,
  D: SymbolDecoder,
{
  pub fn new(source: S, model: M, decoder: D, hub: Arc<StatusHub>, navigator: Arc<dyn Navigator>) -> Self {
    Self {
      session: Mutex::new(Session {
        state: PipelineState::Idle,
        facing: Facing::default(),
        source,
        generation: 0,
      }),
      in_flight: AtomicBool::new(false),
      model,
      decoder,
      config: ScanConfig::default(),
      hub,
      navigator,
    }
  }

  pub fn with_config(mut self, config: ScanConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_facing(self, facing: Facing) -> Self {
    self.lock().facing = facing;
    self
  }

  pub fn config(&self) -> &ScanConfig {
    &self.config
  }

  pub fn hub(&self) -> &Arc<StatusHub> {
    &self.hub
  }

  fn lock(&self) -> MutexGuard<'_, Session<S>> {
    self.session.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn state(&self) -> PipelineState {
    self.lock().state
  }

  pub fn is_scanning(&self) -> bool {
    self.state() == PipelineState::Scanning
  }

  pub fn facing(&self) -> Facing {
    self.lock().facing
  }

  pub fn device_count(&self) -> usize {
    self.lock().source.device_count()
  }

  /// Idle → Scanning；已在扫描时不做任何事
  pub fn start(&self) -> Result<(), PipelineError> {
    let mut session = self.lock();
    if session.state == PipelineState::Scanning {
      debug!("已在扫描中，忽略启动请求");
      return Ok(());
    }

    let facing = session.facing;
    if let Err(e) = session.source.start(facing) {
      warn!("打开{}摄像头失败: {}", facing, e);
      drop(session);
      self.hub.update(|s| {
        s.status_text = String::new();
        s.error = Some(e.to_string());
      });
      return Err(e.into());
    }

    session.state = PipelineState::Scanning;
    session.invalidate();
    info!("开始扫描，使用{}摄像头", facing);
    drop(session);
    self.hub.update(|s| {
      s.status_text = STATUS_SCANNING.to_string();
      s.error = None;
    });
    Ok(())
  }

  /// 强制回到 Idle；已是 Idle 时不会再次释放帧来源
  pub fn stop(&self) {
    let session = self.lock();
    if session.state == PipelineState::Idle {
      trace!("已停止，忽略停止请求");
      return;
    }

    info!("停止扫描");
    self.halt(session);
  }

  /// 释放帧来源并回到 Idle，先放锁再推送状态
  fn halt(&self, mut session: MutexGuard<'_, Session<S>>) {
    session.source.stop();
    session.state = PipelineState::Idle;
    session.invalidate();
    drop(session);
    self.hub.update(|s| s.status_text = String::new());
  }

  /// 停止当前摄像头，等待设备释放后以相反朝向重新打开
  ///
  /// 等待期间发生停止或再次切换时，本次切换不再重新打开。
  pub fn switch_camera(&self) -> Result<(), PipelineError> {
    let generation = {
      let mut session = self.lock();
      if session.state != PipelineState::Scanning {
        return Err(PipelineError::NotScanning);
      }
      if session.source.device_count() < 2 {
        return Err(PipelineError::SingleCamera);
      }

      info!("切换摄像头: 停止{}摄像头", session.facing);
      session.source.stop();
      session.invalidate();
      session.generation
    };
    self.hub.set_text(STATUS_SWITCHING);

    thread::sleep(self.config.switch_delay);

    let mut session = self.lock();
    if session.state != PipelineState::Scanning || session.generation != generation {
      info!("切换期间扫描已停止或再次切换，放弃重新打开摄像头");
      return Ok(());
    }

    let facing = session.facing.flipped();
    match session.source.start(facing) {
      Ok(()) => {
        session.facing = facing;
        session.invalidate();
        info!("已切换到{}摄像头", facing);
        drop(session);
        self.hub.update(|s| {
          s.status_text = STATUS_SCANNING.to_string();
          s.error = None;
        });
        Ok(())
      }
      Err(e) => {
        warn!("打开{}摄像头失败: {}", facing, e);
        session.state = PipelineState::Idle;
        session.invalidate();
        drop(session);
        self.hub.update(|s| {
          s.status_text = String::new();
          s.error = Some(e.to_string());
        });
        Err(e.into())
      }
    }
  }

  pub fn run_pass(&self) -> PassOutcome {
    self.run_pass_inspect(|_, _| {})
  }

  /// 执行一次扫描；`inspect` 在分类之前拿到本帧与裁剪区域
  pub fn run_pass_inspect(&self, inspect: impl FnOnce(&Frame, Option<&Region>)) -> PassOutcome {
    let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
      trace!("上一次扫描尚未结束，丢弃本次");
      return PassOutcome::Dropped;
    };

    let (frame, generation) = {
      let mut session = self.lock();
      if session.state != PipelineState::Scanning {
        return PassOutcome::Inactive;
      }
      let frame = session.source.current_frame();
      if frame.is_none() && session.source.is_finished() {
        info!("帧来源已结束，停止扫描");
        self.halt(session);
        return PassOutcome::SourceEnded;
      }
      (frame, session.generation)
    };

    let Some(frame) = frame.filter(|f| !f.is_empty()) else {
      trace!("帧不可用");
      return PassOutcome::FrameUnavailable;
    };

    let now = Instant::now();
    let result = {
      let Some(tensor) = preprocess::transform(&frame) else {
        return PassOutcome::FrameUnavailable;
      };
      self.model.infer(&tensor)
    };
    let result = match result {
      Ok(result) => result,
      Err(e) => {
        warn!("推理失败，等待下一帧: {}", e);
        return PassOutcome::DetectorError;
      }
    };
    debug!(
      "{} 帧推理完成，耗时: {:.2?}",
      frame.timestamp().format("%H:%M:%S%.3f"),
      now.elapsed()
    );

    let (finding, region) = self.examine(&frame, &result);
    inspect(&frame, region.as_ref());

    self.conclude(generation, finding)
  }

  fn examine(&self, frame: &Frame, result: &DetectResult) -> (Finding, Option<Region>) {
    let Some(detection) = select(&result.rows, self.config.threshold) else {
      return (Finding::NoDetection, None);
    };
    debug!("检测到二维码: {:?}", detection);

    let extractor = &self.config.extractor;
    let Some(region) = extractor.extract(frame, &detection) else {
      return (Finding::InvalidRegion, None);
    };
    let Some(cropped) = extractor.crop(frame, &region) else {
      return (Finding::InvalidRegion, None);
    };

    let finding = match self.decoder.decode(cropped.as_raw(), cropped.width(), cropped.height()) {
      Some(symbol) => Finding::Symbol(symbol.text),
      None => Finding::NoSymbol,
    };
    (finding, Some(region))
  }

  fn conclude(&self, generation: u64, finding: Finding) -> PassOutcome {
    let mut session = self.lock();
    if session.state != PipelineState::Scanning || session.generation != generation {
      debug!("扫描期间状态已变化，丢弃结果");
      return PassOutcome::Stale;
    }

    let text = match finding {
      Finding::NoDetection => {
        drop(session);
        self.hub.set_text(STATUS_NO_DETECTION);
        return PassOutcome::NoDetection;
      }
      Finding::InvalidRegion => return PassOutcome::InvalidRegion,
      Finding::NoSymbol => {
        drop(session);
        self.hub.set_text(STATUS_NOT_DECODED);
        return PassOutcome::NoSymbol;
      }
      Finding::Symbol(text) => text,
    };

    let url = match Url::parse(&text) {
      Ok(url) => url,
      Err(_) => {
        info!("识别到文本: {}", text);
        drop(session);
        self.hub.set_text(format!("Decoded text: {}", text));
        return PassOutcome::Text(text);
      }
    };

    info!("识别到网址: {}", url);
    session.source.stop();
    session.state = PipelineState::Idle;
    session.invalidate();
    drop(session);
    self.hub.update(|s| {
      s.status_text = format!("Opening URL: {}", text);
      s.error = None;
    });

    if let Err(e) = self.navigator.navigate(&url) {
      warn!("{}", e);
      self.hub.update(|s| s.error = Some(e.to_string()));
    }
    PassOutcome::Url(url)
  }
}
