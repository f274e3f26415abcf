// 该文件是 Xunying （巡影） 项目的一部分。
// src/frame.rs - 帧与输入张量定义
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

use image::RgbImage;

pub const RGB_CHANNELS: usize = 3;

/// 帧源产出的一帧 RGB 图像 (H x W x 3)
#[derive(Debug, Clone)]
pub struct RgbFrame {
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl RgbFrame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    Self::new(image, 0, 0)
  }
}

/// 模型输入张量，NHWC 布局，batch 为 1，取值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct TensorFrame {
  width: u32,
  height: u32,
  data: Vec<f32>,
}

impl TensorFrame {
  /// `data` 的长度必须为 `width * height * 3`
  pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
    if data.len() != width as usize * height as usize * RGB_CHANNELS {
      return None;
    }
    Some(Self {
      width,
      height,
      data,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 形状 [1, H, W, C]
  pub fn shape(&self) -> [usize; 4] {
    [1, self.height as usize, self.width as usize, RGB_CHANNELS]
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }

  pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
    let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  pub fn into_raw(self) -> Vec<f32> {
    self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tensor_frame_checks_length() {
    assert!(TensorFrame::from_raw(2, 2, vec![0.0; 11]).is_none());
    let tensor = TensorFrame::from_raw(2, 1, vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
    assert_eq!(tensor.shape(), [1, 1, 2, 3]);
    assert_eq!(tensor.pixel(1, 0), [0.3, 0.4, 0.5]);
  }

  #[test]
  fn empty_frame() {
    let frame = RgbFrame::from(RgbImage::new(0, 4));
    assert!(frame.is_empty());
    assert_eq!(frame.channels(), 3);
  }
}
