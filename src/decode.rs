// 该文件是 Saoma （扫码） 项目的一部分。
// src/decode.rs - 二维码符号解码
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

use rqrr::PreparedImage;
use tracing::{debug, trace};

use crate::frame::RGB_CHANNELS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSymbol {
  pub text: String,
}

/// 符号解码器：输入 RGB 像素与尺寸，输出解码文本或 `None`
pub trait SymbolDecoder {
  fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<DecodedSymbol>;
}

impl<D: SymbolDecoder + ?Sized> SymbolDecoder for &D {
  fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<DecodedSymbol> {
    (**self).decode(pixels, width, height)
  }
}

/// 基于 rqrr 的解码器（定位图形搜索、格式/版本解析、Reed–Solomon 纠错）
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

/// ITU-R BT.601 亮度: (77R + 150G + 29B) >> 8
fn to_greyscale(pixels: &[u8]) -> Vec<u8> {
  pixels
    .chunks_exact(RGB_CHANNELS)
    .map(|p| ((77 * p[0] as u32 + 150 * p[1] as u32 + 29 * p[2] as u32) >> 8) as u8)
    .collect()
}

impl SymbolDecoder for RqrrDecoder {
  fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<DecodedSymbol> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || pixels.len() < w * h * RGB_CHANNELS {
      return None;
    }

    let grey = to_greyscale(&pixels[..w * h * RGB_CHANNELS]);
    let mut prepared = PreparedImage::prepare_from_greyscale(w, h, |x, y| grey[y * w + x]);
    let grids = prepared.detect_grids();
    trace!("找到 {} 个候选网格", grids.len());

    // 每帧只解一个码
    let grid = grids.first()?;
    match grid.decode() {
      Ok((meta, text)) => {
        debug!("解码成功: 版本 {:?}, 纠错等级 {:?}", meta.version, meta.ecc_level);
        Some(DecodedSymbol { text })
      }
      Err(e) => {
        debug!("解码失败: {:?}", e);
        None
      }
    }
  }
}
