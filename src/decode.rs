// 该文件是 Xunying （巡影） 项目的一部分。
// src/decode.rs - 检测结果解码
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

use ndarray::{ArrayView2, Axis, Ix3};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  arena::ArenaScope,
  model::{RawDetections, TensorLayout},
};

const BOX_ATTRS: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("原始张量形状 {shape:?} ({layout:?}) 与 {num_classes} 个类别的布局不匹配")]
  ShapeMismatch {
    shape: Vec<usize>,
    layout: TensorLayout,
    num_classes: usize,
  },
}

/// 轴对齐边界框，顺序为 (y1, x1, y2, x2)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
  pub y1: f32,
  pub x1: f32,
  pub y2: f32,
  pub x2: f32,
}

impl BoundingBox {
  /// 从 [y1, x1, y2, x2] 切片构造
  pub fn from_yxyx(v: &[f32]) -> Self {
    Self {
      y1: v[0],
      x1: v[1],
      y2: v[2],
      x2: v[3],
    }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 角点按大小重新排列后的面积
  pub fn area(&self) -> f32 {
    let n = self.normalized();
    (n.y2 - n.y1) * (n.x2 - n.x1)
  }

  /// 保证 y1 <= y2、x1 <= x2
  pub fn normalized(&self) -> Self {
    Self {
      y1: self.y1.min(self.y2),
      x1: self.x1.min(self.x2),
      y2: self.y1.max(self.y2),
      x2: self.x1.max(self.x2),
    }
  }

  pub fn scaled(&self, fx: f32, fy: f32) -> Self {
    Self {
      y1: self.y1 * fy,
      x1: self.x1 * fx,
      y2: self.y2 * fy,
      x2: self.x2 * fx,
    }
  }

  /// 交并比；任一框面积非正时为 0
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let a = self.normalized();
    let b = other.normalized();
    let area_a = a.area();
    let area_b = b.area();
    if area_a <= 0.0 || area_b <= 0.0 {
      return 0.0;
    }
    let inter_y1 = a.y1.max(b.y1);
    let inter_x1 = a.x1.max(b.x1);
    let inter_y2 = a.y2.min(b.y2);
    let inter_x2 = a.x2.min(b.x2);
    let inter = (inter_y2 - inter_y1).max(0.0) * (inter_x2 - inter_x1).max(0.0);
    inter / (area_a + area_b - inter)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub score: f32,
  pub class_id: usize,
}

/// 解码后的候选框，按列存储，每个候选一行
#[derive(Debug)]
pub struct Candidates {
  boxes: Vec<f32>,
  scores: Vec<f32>,
  classes: Vec<usize>,
}

impl Candidates {
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  /// 展平的 [N, 4] 框，每行 (y1, x1, y2, x2)
  pub fn boxes(&self) -> &[f32] {
    &self.boxes
  }

  pub fn scores(&self) -> &[f32] {
    &self.scores
  }

  pub fn classes(&self) -> &[usize] {
    &self.classes
  }

  pub fn bbox(&self, idx: usize) -> BoundingBox {
    BoundingBox::from_yxyx(&self.boxes[idx * BOX_ATTRS..(idx + 1) * BOX_ATTRS])
  }

  pub fn detection(&self, idx: usize) -> Detection {
    Detection {
      bbox: self.bbox(idx),
      score: self.scores[idx],
      class_id: self.classes[idx],
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
    (0..self.len()).map(|idx| self.detection(idx))
  }

  /// 把张量存储归还给作用域
  pub fn release(self, scope: &mut ArenaScope<'_>) {
    scope.recycle(self.boxes);
    scope.recycle(self.scores);
  }
}

/// 把模型原始输出解码为候选框。
///
/// 每个候选的属性为 `[cx, cy, w, h, score_0, .., score_{n-1}]`，
/// 框按 (y1, x1, y2, x2) 输出，分数取各类别最大值，类别取第一个最大值的下标。
/// 这一步不做阈值过滤。
pub fn decode(
  raw: &RawDetections,
  num_classes: usize,
  scope: &mut ArenaScope<'_>,
) -> Result<Candidates, DecodeError> {
  let mismatch = || DecodeError::ShapeMismatch {
    shape: raw.shape().to_vec(),
    layout: raw.layout(),
    num_classes,
  };

  if num_classes == 0 {
    return Err(mismatch());
  }

  let tensor = raw
    .tensor()
    .view()
    .into_dimensionality::<Ix3>()
    .map_err(|_| mismatch())?;
  if tensor.len_of(Axis(0)) != 1 {
    return Err(mismatch());
  }

  let batch = tensor.index_axis_move(Axis(0), 0);
  let rows: ArrayView2<'_, f32> = match raw.layout() {
    TensorLayout::CandidateMajor => batch,
    // [1, 4 + C, N] 转置为 [N, 4 + C]
    TensorLayout::AttributeMajor => batch.reversed_axes(),
  };
  if rows.ncols() != BOX_ATTRS + num_classes {
    return Err(mismatch());
  }

  let count = rows.nrows();
  let mut boxes = scope.alloc(count * BOX_ATTRS);
  let mut scores = scope.alloc(count);
  let mut classes = vec![0usize; count];

  for (idx, row) in rows.outer_iter().enumerate() {
    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let out = &mut boxes[idx * BOX_ATTRS..(idx + 1) * BOX_ATTRS];
    out[0] = y1;
    out[1] = x1;
    out[2] = y1 + h;
    out[3] = x1 + w;

    let mut best = row[BOX_ATTRS];
    let mut best_idx = 0usize;
    for c in 1..num_classes {
      let score = row[BOX_ATTRS + c];
      if score > best || (best.is_nan() && !score.is_nan()) {
        best = score;
        best_idx = c;
      }
    }
    scores[idx] = best;
    classes[idx] = best_idx;
  }

  debug!("解码 {} 个候选框", count);
  Ok(Candidates {
    boxes,
    scores,
    classes,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::TensorArena;

  fn raw(rows: &[&[f32]], layout: TensorLayout) -> RawDetections {
    let n = rows.len();
    let attrs = rows[0].len();
    let data: Vec<f32> = match layout {
      TensorLayout::CandidateMajor => rows.iter().flat_map(|r| r.iter().copied()).collect(),
      TensorLayout::AttributeMajor => (0..attrs)
        .flat_map(|a| rows.iter().map(move |r| r[a]))
        .collect(),
    };
    let shape = match layout {
      TensorLayout::CandidateMajor => vec![1, n, attrs],
      TensorLayout::AttributeMajor => vec![1, attrs, n],
    };
    RawDetections::new(shape, data, layout).unwrap()
  }

  #[test]
  fn decodes_center_size_to_corners() {
    let mut arena = TensorArena::default();
    let mut scope = arena.scope();
    let raw = raw(&[&[50.0, 50.0, 20.0, 10.0, 0.1, 0.7, 0.3]], TensorLayout::CandidateMajor);
    let candidates = decode(&raw, 3, &mut scope).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(
      candidates.bbox(0),
      BoundingBox {
        y1: 45.0,
        x1: 40.0,
        y2: 55.0,
        x2: 60.0
      }
    );
    assert_eq!(candidates.boxes(), &[45.0, 40.0, 55.0, 60.0]);
    assert_eq!(candidates.scores(), &[0.7]);
    assert_eq!(candidates.classes(), &[1]);
  }

  #[test]
  fn argmax_tie_prefers_lower_index() {
    let mut arena = TensorArena::default();
    let mut scope = arena.scope();
    let raw = raw(
      &[
        &[0.0, 0.0, 1.0, 1.0, 0.2, 0.9, 0.9],
        &[0.0, 0.0, 1.0, 1.0, 0.5, 0.5, 0.5],
        &[0.0, 0.0, 1.0, 1.0, f32::NAN, 0.4, 0.1],
      ],
      TensorLayout::CandidateMajor,
    );
    let candidates = decode(&raw, 3, &mut scope).unwrap();
    assert_eq!(candidates.classes(), &[1, 0, 1]);
    assert_eq!(candidates.scores(), &[0.9, 0.5, 0.4]);
  }

  #[test]
  fn attribute_major_matches_candidate_major() {
    let rows: [&[f32]; 3] = [
      &[10.0, 20.0, 4.0, 6.0, 0.1, 0.8],
      &[30.0, 40.0, 8.0, 2.0, 0.6, 0.3],
      &[5.0, 5.0, 2.0, 2.0, 0.0, 0.0],
    ];
    let mut arena = TensorArena::default();
    let mut scope = arena.scope();
    let a = decode(&raw(&rows, TensorLayout::CandidateMajor), 2, &mut scope).unwrap();
    let b = decode(&raw(&rows, TensorLayout::AttributeMajor), 2, &mut scope).unwrap();
    assert_eq!(a.iter().collect::<Vec<_>>(), b.iter().collect::<Vec<_>>());
    assert_eq!(a.detection(1).class_id, 0);
  }

  #[test]
  fn rejects_malformed_shapes() {
    let mut arena = TensorArena::default();
    let mut scope = arena.scope();

    // 属性数量与类别数不符
    let wrong_attrs = raw(&[&[0.0; 7]], TensorLayout::CandidateMajor);
    assert!(matches!(
      decode(&wrong_attrs, 30, &mut scope),
      Err(DecodeError::ShapeMismatch { num_classes: 30, .. })
    ));

    // batch 不为 1
    let batch =
      RawDetections::new(vec![2, 1, 5], vec![0.0; 10], TensorLayout::CandidateMajor).unwrap();
    assert!(decode(&batch, 1, &mut scope).is_err());

    // 维度不为 3
    let flat = RawDetections::new(vec![5], vec![0.0; 5], TensorLayout::CandidateMajor).unwrap();
    assert!(decode(&flat, 1, &mut scope).is_err());

    // 没有类别
    let no_class = raw(&[&[0.0; 4]], TensorLayout::CandidateMajor);
    assert!(decode(&no_class, 0, &mut scope).is_err());
  }

  #[test]
  fn empty_tensor_decodes_to_nothing() {
    let mut arena = TensorArena::default();
    let mut scope = arena.scope();
    let empty =
      RawDetections::new(vec![1, 0, 6], Vec::new(), TensorLayout::CandidateMajor).unwrap();
    let candidates = decode(&empty, 2, &mut scope).unwrap();
    assert!(candidates.is_empty());
    candidates.release(&mut scope);
  }

  #[test]
  fn iou_of_boxes() {
    let a = BoundingBox {
      y1: 0.0,
      x1: 0.0,
      y2: 10.0,
      x2: 10.0,
    };
    let b = BoundingBox {
      y1: 5.0,
      x1: 0.0,
      y2: 15.0,
      x2: 10.0,
    };
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    // 角点颠倒的框与正常框等价
    let flipped = BoundingBox {
      y1: 10.0,
      x1: 10.0,
      y2: 0.0,
      x2: 0.0,
    };
    assert!((a.iou(&flipped) - 1.0).abs() < 1e-6);
    let degenerate = BoundingBox {
      y1: 1.0,
      x1: 1.0,
      y2: 1.0,
      x2: 5.0,
    };
    assert_eq!(a.iou(&degenerate), 0.0);
  }
}
