// 该文件是 Saoma （扫码） 项目的一部分。
// src/model/select.rs - 候选框筛选
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

use tracing::trace;

use crate::model::{CandidateRow, Detection};

pub const DETECTION_THRESHOLD: f32 = 0.25;

/// 线性扫描，选出置信度严格大于 `threshold` 的最大一行
///
/// 置信度相同时保留先出现的一行；NaN 永远不会被选中。
/// 输出框由中心形式转换为左上角形式。
pub fn select(rows: &[CandidateRow], threshold: f32) -> Option<Detection> {
  let mut best: Option<&CandidateRow> = None;
  let mut max_confidence = threshold;

  for row in rows {
    if row.confidence > max_confidence {
      max_confidence = row.confidence;
      best = Some(row);
    }
  }

  let row = best?;
  trace!("选中候选框: {:?}", row);
  Some(Detection {
    bbox: [row.cx - row.w / 2.0, row.cy - row.h / 2.0, row.w, row.h],
    confidence: row.confidence,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn approx(a: [f32; 4], b: [f32; 4]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-6)
  }

  #[test]
  fn single_confident_row_is_selected() {
    let rows = [CandidateRow::new(0.5, 0.5, 0.2, 0.2, 0.9)];
    let detection = select(&rows, DETECTION_THRESHOLD).unwrap();
    assert!(approx(detection.bbox, [0.4, 0.4, 0.2, 0.2]));
    assert_eq!(detection.confidence, 0.9);
  }

  #[test]
  fn nothing_above_threshold() {
    let rows = [
      CandidateRow::new(0.5, 0.5, 0.2, 0.2, 0.1),
      CandidateRow::new(0.3, 0.3, 0.2, 0.2, 0.25),
      CandidateRow::new(0.3, 0.3, 0.2, 0.2, f32::NAN),
    ];
    assert!(select(&rows, DETECTION_THRESHOLD).is_none());
    assert!(select(&[], DETECTION_THRESHOLD).is_none());
  }

  #[test]
  fn only_row_above_threshold_wins_anywhere_in_sequence() {
    for position in 0..5 {
      let mut rows = vec![CandidateRow::new(0.1, 0.1, 0.1, 0.1, 0.2); 5];
      rows[position] = CandidateRow::new(0.6, 0.7, 0.2, 0.4, 0.3);
      let detection = select(&rows, DETECTION_THRESHOLD).unwrap();
      assert!(approx(detection.bbox, [0.5, 0.5, 0.2, 0.4]));
    }
  }

  #[test]
  fn highest_confidence_wins_and_ties_keep_first() {
    let rows = [
      CandidateRow::new(0.2, 0.2, 0.1, 0.1, 0.5),
      CandidateRow::new(0.4, 0.4, 0.1, 0.1, 0.8),
      CandidateRow::new(0.6, 0.6, 0.1, 0.1, 0.8),
      CandidateRow::new(0.8, 0.8, 0.1, 0.1, 0.7),
    ];
    let detection = select(&rows, DETECTION_THRESHOLD).unwrap();
    assert!(approx(detection.bbox, [0.35, 0.35, 0.1, 0.1]));
  }
}
