// 该文件是 Xunying （巡影） 项目的一部分。
// src/model.rs - 推理服务与检测结果
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

use ndarray::{ArrayD, IxDyn, ShapeError};
use serde::{Deserialize, Serialize};

use crate::{
  config::CoordinateSpace,
  decode::{BoundingBox, Detection},
  frame::TensorFrame,
  letterbox::model_to_source_factor,
};

/// 推理服务：输入张量到原始检测张量的映射
pub trait InferenceService {
  type Error;

  fn execute(&self, input: &TensorFrame) -> Result<RawDetections, Self::Error>;
}

impl<T: InferenceService + ?Sized> InferenceService for &T {
  type Error = T::Error;

  fn execute(&self, input: &TensorFrame) -> Result<RawDetections, Self::Error> {
    (**self).execute(input)
  }
}

impl<T: InferenceService + ?Sized> InferenceService for Box<T> {
  type Error = T::Error;

  fn execute(&self, input: &TensorFrame) -> Result<RawDetections, Self::Error> {
    (**self).execute(input)
  }
}

/// 原始输出张量的轴顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
  /// [1, N, 4 + C]
  #[default]
  CandidateMajor,
  /// [1, 4 + C, N]，YOLOv8 导出模型的原生布局
  AttributeMajor,
}

/// 推理服务输出的原始检测张量，只读
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetections {
  tensor: ArrayD<f32>,
  layout: TensorLayout,
}

impl RawDetections {
  pub fn new(shape: Vec<usize>, data: Vec<f32>, layout: TensorLayout) -> Result<Self, ShapeError> {
    let tensor = ArrayD::from_shape_vec(IxDyn(&shape), data)?;
    Ok(Self { tensor, layout })
  }

  pub fn from_array(tensor: ArrayD<f32>, layout: TensorLayout) -> Self {
    Self { tensor, layout }
  }

  pub fn shape(&self) -> &[usize] {
    self.tensor.shape()
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn tensor(&self) -> &ArrayD<f32> {
    &self.tensor
  }
}

/// 一帧经过 NMS 后的检测结果，每帧丢弃
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSet {
  pub items: Box<[Detection]>,
  pub frame_width: u32,
  pub frame_height: u32,
  pub input_width: u32,
  pub input_height: u32,
  /// `items` 中框所在的坐标空间
  pub space: CoordinateSpace,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Detection> {
    self.items.iter()
  }

  /// 检测框在原始帧像素坐标下的位置，与上报空间无关
  pub fn source_box(&self, detection: &Detection) -> BoundingBox {
    match self.space {
      CoordinateSpace::Source => detection.bbox,
      CoordinateSpace::ModelInput => {
        let side = self.frame_width.max(self.frame_height);
        let (fx, fy) = model_to_source_factor(side, self.input_width, self.input_height);
        detection.bbox.scaled(fx, fy)
      }
    }
  }
}

#[cfg(feature = "replay_model")]
mod replay;
#[cfg(feature = "replay_model")]
pub use self::replay::{RecordedTensor, ReplayError, ReplayInference};

#[cfg(test)]
mod tests {
  use super::*;

  fn set(space: CoordinateSpace, bbox: BoundingBox) -> DetectionSet {
    DetectionSet {
      items: vec![Detection {
        bbox,
        score: 0.9,
        class_id: 3,
      }]
      .into_boxed_slice(),
      frame_width: 200,
      frame_height: 100,
      input_width: 800,
      input_height: 800,
      space,
    }
  }

  #[test]
  fn source_box_maps_model_space() {
    let bbox = BoundingBox {
      y1: 80.0,
      x1: 40.0,
      y2: 160.0,
      x2: 400.0,
    };
    let model = set(CoordinateSpace::ModelInput, bbox);
    let mapped = model.source_box(&model.items[0]);
    assert_eq!(
      mapped,
      BoundingBox {
        y1: 20.0,
        x1: 10.0,
        y2: 40.0,
        x2: 100.0
      }
    );

    let source = set(CoordinateSpace::Source, bbox);
    assert_eq!(source.source_box(&source.items[0]), bbox);
  }

  #[test]
  fn raw_detections_checks_shape() {
    assert!(RawDetections::new(vec![1, 2, 5], vec![0.0; 9], TensorLayout::CandidateMajor).is_err());
    let raw = RawDetections::new(vec![1, 5, 2], vec![0.0; 10], TensorLayout::AttributeMajor).unwrap();
    assert_eq!(raw.shape(), &[1, 5, 2]);
    assert_eq!(raw.layout(), TensorLayout::AttributeMajor);
  }
}
