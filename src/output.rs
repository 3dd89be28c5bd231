// 该文件是 Saoma （扫码） 项目的一部分。
// src/output.rs - 状态推送与网址跳转
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

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;
use url::Url;

/// 推送给展示层的扫描器状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScannerStatus {
  pub ready: bool,
  pub status_text: String,
  pub progress: u8,
  pub error: Option<String>,
}

pub trait StatusListener: Send + Sync {
  fn on_status(&self, status: &ScannerStatus);
}

impl<F: Fn(&ScannerStatus) + Send + Sync> StatusListener for F {
  fn on_status(&self, status: &ScannerStatus) {
    self(status)
  }
}

/// 状态中心：保存最新状态，并把每次变化推送给所有订阅者
#[derive(Default)]
pub struct StatusHub {
  current: Mutex<ScannerStatus>,
  listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
}

impl StatusHub {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self, listener: Arc<dyn StatusListener>) {
    self
      .listeners
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(listener);
  }

  pub fn snapshot(&self) -> ScannerStatus {
    self
      .current
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// 修改状态并推送；状态未变化时不推送
  pub fn update(&self, f: impl FnOnce(&mut ScannerStatus)) {
    let status = {
      let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
      let before = current.clone();
      f(&mut current);
      if *current == before {
        return;
      }
      current.clone()
    };

    // 复制订阅者列表后再回调，回调中可以再次更新状态或订阅
    let listeners = self
      .listeners
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    for listener in listeners.iter() {
      listener.on_status(&status);
    }
  }

  pub fn set_text(&self, text: impl Into<String>) {
    let text = text.into();
    self.update(|s| s.status_text = text);
  }
}

#[derive(Error, Debug)]
pub enum NavigateError {
  #[error("无法打开网址 {0}: {1}")]
  OpenFailed(String, std::io::Error),
}

/// 识别到网址后的跳转动作
pub trait Navigator: Send + Sync {
  fn navigate(&self, url: &Url) -> Result<(), NavigateError>;
}

mod json_status;
mod log_status;
mod navigate;
pub use self::json_status::JsonLinesStatus;
pub use self::log_status::LogStatus;
pub use self::navigate::{PrintUrl, SystemBrowser};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn publishes_only_changes() {
    let hub = StatusHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    hub.subscribe(Arc::new(move |s: &ScannerStatus| {
      sink.lock().unwrap().push(s.status_text.clone());
    }));

    hub.set_text("Scanning...");
    hub.set_text("Scanning...");
    hub.update(|s| s.progress = 40);

    assert_eq!(*seen.lock().unwrap(), vec!["Scanning...", "Scanning..."]);
    assert_eq!(hub.snapshot().progress, 40);
  }

  #[test]
  fn all_listeners_receive_updates() {
    let hub = StatusHub::new();
    let counter = Arc::new(Mutex::new(0usize));
    for _ in 0..3 {
      let counter = counter.clone();
      hub.subscribe(Arc::new(move |_: &ScannerStatus| {
        *counter.lock().unwrap() += 1;
      }));
    }
    hub.update(|s| s.ready = true);
    assert_eq!(*counter.lock().unwrap(), 3);
  }

  #[test]
  fn listener_may_update_from_callback() {
    let hub = Arc::new(StatusHub::new());
    let inner = Arc::downgrade(&hub);
    hub.subscribe(Arc::new(move |s: &ScannerStatus| {
      if s.status_text == "Scanning..." {
        if let Some(hub) = inner.upgrade() {
          hub.subscribe(Arc::new(|_: &ScannerStatus| {}));
          hub.set_text("");
        }
      }
    }));

    hub.set_text("Scanning...");
    assert_eq!(hub.snapshot().status_text, "");
  }
}
