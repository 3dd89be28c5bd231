// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/json_status.rs - 以 JSON Lines 形式输出状态
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

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::output::{ScannerStatus, StatusListener};

/// 每次状态变化写出一行 JSON，供外部展示层读取
pub struct JsonLinesStatus<W> {
  writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesStatus<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer: Mutex::new(writer),
    }
  }

  pub fn into_inner(self) -> W {
    self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}

impl JsonLinesStatus<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl<W: Write + Send> StatusListener for JsonLinesStatus<W> {
  fn on_status(&self, status: &ScannerStatus) {
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    let result = serde_json::to_writer(&mut *writer, status)
      .map_err(std::io::Error::from)
      .and_then(|_| writer.write_all(b"\n"))
      .and_then(|_| writer.flush());
    if let Err(e) = result {
      warn!("写出状态失败: {}", e);
    }
  }
}
