// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/navigate.rs - 网址跳转
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

use tracing::info;
use url::Url;

use crate::output::{NavigateError, Navigator};

/// 用系统默认浏览器打开网址
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
  fn navigate(&self, url: &Url) -> Result<(), NavigateError> {
    info!("使用系统浏览器打开: {}", url);
    open::that(url.as_str()).map_err(|e| NavigateError::OpenFailed(url.to_string(), e))
  }
}

/// 只把网址打印到标准输出，由调用方决定如何处理
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintUrl;

impl Navigator for PrintUrl {
  fn navigate(&self, url: &Url) -> Result<(), NavigateError> {
    println!("{}", url);
    Ok(())
  }
}
