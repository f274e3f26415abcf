// 该文件是 Xunying （巡影） 项目的一部分。
// src/config.rs - 流水线配置
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nms::NmsParams;

pub const MODEL_INPUT_WIDTH: u32 = 800;
pub const MODEL_INPUT_HEIGHT: u32 = 800;
pub const MODEL_CLASS_NUM: usize = 30;
pub const NMS_MAX_OUTPUTS: usize = 500;
pub const NMS_IOU_THRESHOLD: f32 = 0.45;
pub const NMS_SCORE_THRESHOLD: f32 = 0.2;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("模型输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("类别数量必须大于 0")]
  NoClasses,
  #[error("阈值 {name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
}

/// 检测框坐标所在的空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
  /// 原始帧像素坐标
  Source,
  /// 模型输入像素坐标（letterbox 之后）
  #[default]
  ModelInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub input_width: u32,
  pub input_height: u32,
  pub num_classes: usize,
  pub nms: NmsParams,
  pub space: CoordinateSpace,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      input_width: MODEL_INPUT_WIDTH,
      input_height: MODEL_INPUT_HEIGHT,
      num_classes: MODEL_CLASS_NUM,
      nms: NmsParams::default(),
      space: CoordinateSpace::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn with_nms(mut self, nms: NmsParams) -> Self {
    self.nms = nms;
    self
  }

  pub fn with_space(mut self, space: CoordinateSpace) -> Self {
    self.space = space;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize(
        self.input_width,
        self.input_height,
      ));
    }
    if self.num_classes == 0 {
      return Err(ConfigError::NoClasses);
    }
    check_unit("iou_threshold", self.nms.iou_threshold)?;
    check_unit("score_threshold", self.nms.score_threshold)?;
    Ok(())
  }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_matches_deployed_model() {
    let config = PipelineConfig::default();
    assert_eq!(config.input_width, 800);
    assert_eq!(config.input_height, 800);
    assert_eq!(config.num_classes, 30);
    assert_eq!(config.nms.max_outputs, 500);
    assert_eq!(config.space, CoordinateSpace::ModelInput);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn rejects_bad_values() {
    let config = PipelineConfig::default().with_input_size(0, 800);
    assert_eq!(
      config.validate(),
      Err(ConfigError::InvalidInputSize(0, 800))
    );

    let config = PipelineConfig::default().with_num_classes(0);
    assert_eq!(config.validate(), Err(ConfigError::NoClasses));

    let nms = NmsParams {
      iou_threshold: 1.5,
      ..NmsParams::default()
    };
    let config = PipelineConfig::default().with_nms(nms);
    assert!(matches!(
      config.validate(),
      Err(ConfigError::ThresholdOutOfRange {
        name: "iou_threshold",
        ..
      })
    ));
  }
}
