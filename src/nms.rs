// 该文件是 Xunying （巡影） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use std::cmp::Ordering;

use tracing::debug;

use crate::{
  config::{NMS_IOU_THRESHOLD, NMS_MAX_OUTPUTS, NMS_SCORE_THRESHOLD},
  decode::BoundingBox,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsParams {
  pub max_outputs: usize,
  pub iou_threshold: f32,
  pub score_threshold: f32,
}

impl Default for NmsParams {
  fn default() -> Self {
    Self {
      max_outputs: NMS_MAX_OUTPUTS,
      iou_threshold: NMS_IOU_THRESHOLD,
      score_threshold: NMS_SCORE_THRESHOLD,
    }
  }
}

/// 贪心非极大值抑制，与类别无关。
///
/// `boxes` 为展平的 [N, 4]，每行 (y1, x1, y2, x2)；`scores` 长度为 N。
/// 只保留分数严格大于 `score_threshold` 的候选，按分数降序（同分时下标小者优先）
/// 逐个保留，与已保留框 IoU >= `iou_threshold` 的候选被抑制。
/// 返回保留下来的下标，按分数降序，最多 `max_outputs` 个。
///
/// 框与分数数量不一致时只处理两者共有的前 `min(scores.len(), boxes.len() / 4)` 个候选，
/// 多余的分数或不足 4 个值的尾部框被忽略。
pub fn non_max_suppression(boxes: &[f32], scores: &[f32], params: &NmsParams) -> Vec<usize> {
  let count = scores.len().min(boxes.len() / 4);
  if params.max_outputs == 0 {
    return Vec::new();
  }

  let mut order: Vec<usize> = (0..count)
    .filter(|&idx| scores[idx] > params.score_threshold)
    .collect();
  order.sort_by(|&a, &b| {
    scores[b]
      .partial_cmp(&scores[a])
      .unwrap_or(Ordering::Equal)
      .then(a.cmp(&b))
  });

  let bbox = |idx: usize| BoundingBox::from_yxyx(&boxes[idx * 4..idx * 4 + 4]);

  let mut kept: Vec<usize> = Vec::new();
  for idx in order {
    let candidate = bbox(idx);
    let suppressed = kept
      .iter()
      .any(|&k| bbox(k).iou(&candidate) >= params.iou_threshold);
    if suppressed {
      continue;
    }
    kept.push(idx);
    if kept.len() >= params.max_outputs {
      break;
    }
  }

  debug!("NMS: {} 个候选，保留 {} 个", count, kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params() -> NmsParams {
    NmsParams::default()
  }

  #[test]
  fn identical_boxes_keep_the_best() {
    let boxes = [0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 10.0];
    let scores = [0.8, 0.9];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![1]);
  }

  #[test]
  fn low_score_is_dropped_even_when_isolated() {
    let boxes = [0.0, 0.0, 10.0, 10.0, 100.0, 100.0, 110.0, 110.0];
    let scores = [0.9, 0.1];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0]);

    // 恰好等于阈值也被排除
    let scores = [0.9, 0.2];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0]);
  }

  #[test]
  fn disjoint_boxes_survive_in_score_order() {
    let boxes = [
      0.0, 0.0, 10.0, 10.0, //
      20.0, 20.0, 30.0, 30.0, //
      40.0, 40.0, 50.0, 50.0,
    ];
    let scores = [0.3, 0.9, 0.6];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![1, 2, 0]);
  }

  #[test]
  fn overlap_below_threshold_is_kept() {
    // IoU = 50 / 150 ≈ 0.33 < 0.45
    let boxes = [0.0, 0.0, 10.0, 10.0, 5.0, 0.0, 15.0, 10.0];
    let scores = [0.9, 0.8];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0, 1]);

    let strict = NmsParams {
      iou_threshold: 0.3,
      ..params()
    };
    assert_eq!(non_max_suppression(&boxes, &scores, &strict), vec![0]);
  }

  #[test]
  fn suppression_is_against_kept_boxes_only() {
    // A 抑制 B；C 与 B 重叠，但 B 已被抑制，C 与 A 的 IoU 低于阈值
    let boxes = [
      0.0, 0.0, 10.0, 10.0, //
      0.0, 3.0, 10.0, 13.0, //
      0.0, 6.0, 10.0, 16.0,
    ];
    let scores = [0.9, 0.8, 0.7];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0, 2]);
  }

  #[test]
  fn respects_max_outputs() {
    let boxes: Vec<f32> = (0..10)
      .flat_map(|i| {
        let o = i as f32 * 20.0;
        [o, o, o + 10.0, o + 10.0]
      })
      .collect();
    let scores: Vec<f32> = (0..10).map(|i| 0.5 + i as f32 * 0.01).collect();
    let limited = NmsParams {
      max_outputs: 3,
      ..params()
    };
    assert_eq!(non_max_suppression(&boxes, &scores, &limited), vec![9, 8, 7]);

    let none = NmsParams {
      max_outputs: 0,
      ..params()
    };
    assert!(non_max_suppression(&boxes, &scores, &none).is_empty());
  }

  #[test]
  fn mismatched_lengths_use_common_prefix() {
    // 三个分数只有两个框，第三个分数被忽略
    let boxes = [0.0, 0.0, 10.0, 10.0, 20.0, 20.0, 30.0, 30.0];
    let scores = [0.5, 0.6, 0.9];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![1, 0]);

    // 尾部不完整的框被忽略
    let boxes = [0.0, 0.0, 10.0, 10.0, 20.0, 20.0];
    let scores = [0.5, 0.6];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0]);
  }

  #[test]
  fn equal_scores_prefer_lower_index() {
    let boxes = [0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 10.0];
    let scores = [0.5, 0.5];
    assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0]);
  }
}
