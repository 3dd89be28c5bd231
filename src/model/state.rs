// 该文件是 Saoma （扫码） 项目的一部分。
// src/model/state.rs - 模型加载状态
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

use tracing::{debug, warn};

use crate::output::StatusHub;

pub const STATUS_LOADING_DEPENDENCIES: &str = "Loading dependencies...";
pub const STATUS_LOADING_MODEL: &str = "Loading detection model...";
pub const STATUS_READY: &str = "Ready";
pub const STATUS_INIT_FAILED: &str = "Initialization failed";

/// 检测器生命周期，只能向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScannerState {
  #[default]
  Uninitialized,
  Loading(u8),
  Ready,
  Failed,
}

impl ScannerState {
  pub fn can_advance_to(&self, next: &ScannerState) -> bool {
    use ScannerState::*;
    match (self, next) {
      (Uninitialized, Loading(_)) | (Uninitialized, Failed) => true,
      (Loading(a), Loading(b)) => b >= a,
      (Loading(_), Ready) | (Loading(_), Failed) => true,
      _ => false,
    }
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, ScannerState::Ready)
  }
}

/// 加载过程的进度汇报，状态变化同时推送到状态中心
pub struct LoadReporter<'a> {
  state: ScannerState,
  hub: &'a StatusHub,
}

impl<'a> LoadReporter<'a> {
  pub fn new(hub: &'a StatusHub) -> Self {
    Self {
      state: ScannerState::Uninitialized,
      hub,
    }
  }

  pub fn state(&self) -> ScannerState {
    self.state
  }

  fn advance(&mut self, next: ScannerState) -> bool {
    if !self.state.can_advance_to(&next) {
      warn!("忽略非法的状态变化: {:?} -> {:?}", self.state, next);
      return false;
    }
    debug!("加载状态: {:?} -> {:?}", self.state, next);
    self.state = next;
    true
  }

  pub fn progress(&mut self, progress: u8, text: &str) {
    let progress = progress.min(100);
    if self.advance(ScannerState::Loading(progress)) {
      self.hub.update(|s| {
        s.ready = false;
        s.status_text = text.to_string();
        s.progress = progress;
        s.error = None;
      });
    }
  }

  pub fn ready(&mut self) {
    if self.advance(ScannerState::Ready) {
      self.hub.update(|s| {
        s.ready = true;
        s.status_text = STATUS_READY.to_string();
        s.progress = 100;
        s.error = None;
      });
    }
  }

  pub fn fail(&mut self, error: &dyn std::error::Error) {
    if self.advance(ScannerState::Failed) {
      self.hub.update(|s| {
        s.ready = false;
        s.status_text = STATUS_INIT_FAILED.to_string();
        s.progress = 0;
        s.error = Some(error.to_string());
      });
    }
  }
}
