// 该文件是 Xunying （巡影） 项目的一部分。
// src/letterbox.rs - Letterbox 预处理
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

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use crate::{
  arena::ArenaScope,
  decode::BoundingBox,
  frame::{RGB_CHANNELS, RgbFrame, TensorFrame},
};

#[derive(Error, Debug, PartialEq)]
pub enum LetterboxError {
  #[error("无效的帧尺寸: {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
  #[error("无效的目标尺寸: {width}x{height}")]
  InvalidTarget { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
pub struct LetterboxResult {
  /// 缩放并归一化后的模型输入
  pub input: TensorFrame,
  /// 补边后正方形的边长
  pub padded_side: u32,
  /// padded_side / 原始宽度
  pub scale_x: f32,
  /// padded_side / 原始高度
  pub scale_y: f32,
}

impl LetterboxResult {
  /// 把模型输入像素坐标映射回原始帧像素坐标
  pub fn to_source(&self, bbox: &BoundingBox) -> BoundingBox {
    let (fx, fy) = model_to_source_factor(
      self.padded_side,
      self.input.width(),
      self.input.height(),
    );
    bbox.scaled(fx, fy)
  }
}

/// 模型输入坐标到原始帧坐标的缩放系数。
/// 补边只在右侧和下方，所以只有缩放没有偏移。
pub fn model_to_source_factor(padded_side: u32, input_width: u32, input_height: u32) -> (f32, f32) {
  (
    padded_side as f32 / input_width as f32,
    padded_side as f32 / input_height as f32,
  )
}

/// 在右侧和下方补零，得到边长为 max(w, h) 的正方形
pub fn pad_to_square(frame: &RgbFrame) -> Result<RgbImage, LetterboxError> {
  check_frame(frame)?;
  let side = frame.width().max(frame.height());
  let mut padded = RgbImage::new(side, side);
  imageops::replace(&mut padded, &frame.image, 0, 0);
  Ok(padded)
}

/// 补边、双线性缩放到目标尺寸并归一化到 [0, 1]
pub fn letterbox(
  frame: &RgbFrame,
  target_width: u32,
  target_height: u32,
) -> Result<LetterboxResult, LetterboxError> {
  let len = target_width as usize * target_height as usize * RGB_CHANNELS;
  letterbox_into(frame, target_width, target_height, vec![0.0; len])
}

/// 与 [`letterbox`] 相同，输入张量的存储从作用域中分配
pub fn letterbox_in(
  frame: &RgbFrame,
  target_width: u32,
  target_height: u32,
  scope: &mut ArenaScope<'_>,
) -> Result<LetterboxResult, LetterboxError> {
  check_target(target_width, target_height)?;
  check_frame(frame)?;
  let len = target_width as usize * target_height as usize * RGB_CHANNELS;
  letterbox_into(frame, target_width, target_height, scope.alloc(len))
}

fn letterbox_into(
  frame: &RgbFrame,
  target_width: u32,
  target_height: u32,
  mut buf: Vec<f32>,
) -> Result<LetterboxResult, LetterboxError> {
  check_target(target_width, target_height)?;
  let padded = pad_to_square(frame)?;
  let side = padded.width();

  resize_bilinear_normalized(&padded, target_width, target_height, &mut buf);

  let scale_x = side as f32 / frame.width() as f32;
  let scale_y = side as f32 / frame.height() as f32;
  debug!(
    "letterbox: {}x{} -> {}x{} -> {}x{}, 缩放比例 ({:.3}, {:.3})",
    frame.width(),
    frame.height(),
    side,
    side,
    target_width,
    target_height,
    scale_x,
    scale_y
  );

  // 长度在上面已经与目标尺寸对齐
  let input = TensorFrame::from_raw(target_width, target_height, buf).ok_or(
    LetterboxError::InvalidTarget {
      width: target_width,
      height: target_height,
    },
  )?;

  Ok(LetterboxResult {
    input,
    padded_side: side,
    scale_x,
    scale_y,
  })
}

fn check_frame(frame: &RgbFrame) -> Result<(), LetterboxError> {
  if frame.is_empty() {
    return Err(LetterboxError::InvalidFrame {
      width: frame.width(),
      height: frame.height(),
    });
  }
  Ok(())
}

fn check_target(width: u32, height: u32) -> Result<(), LetterboxError> {
  if width == 0 || height == 0 {
    return Err(LetterboxError::InvalidTarget { width, height });
  }
  Ok(())
}

/// 双线性插值（不对齐角点、无半像素偏移），结果除以 255 写入 `out`。
/// 源坐标为 dst * in / out，右侧和下方的邻居夹取到最后一行/列。
fn resize_bilinear_normalized(src: &RgbImage, out_w: u32, out_h: u32, out: &mut Vec<f32>) {
  let (in_w, in_h) = src.dimensions();
  let scale_x = in_w as f32 / out_w as f32;
  let scale_y = in_h as f32 / out_h as f32;

  out.clear();
  out.resize(out_w as usize * out_h as usize * RGB_CHANNELS, 0.0);

  let xs: Vec<(u32, u32, f32)> = (0..out_w)
    .map(|x| {
      let in_x = x as f32 * scale_x;
      let x0 = (in_x.floor() as u32).min(in_w - 1);
      let x1 = (x0 + 1).min(in_w - 1);
      (x0, x1, in_x - x0 as f32)
    })
    .collect();

  let raw = src.as_raw();
  let texel = |x: u32, y: u32, c: usize| -> f32 {
    raw[(y as usize * in_w as usize + x as usize) * RGB_CHANNELS + c] as f32
  };

  for y in 0..out_h {
    let in_y = y as f32 * scale_y;
    let y0 = (in_y.floor() as u32).min(in_h - 1);
    let y1 = (y0 + 1).min(in_h - 1);
    let dy = in_y - y0 as f32;

    for (x, &(x0, x1, dx)) in xs.iter().enumerate() {
      let base = (y as usize * out_w as usize + x) * RGB_CHANNELS;
      for c in 0..RGB_CHANNELS {
        let top_left = texel(x0, y0, c);
        let top_right = texel(x1, y0, c);
        let bottom_left = texel(x0, y1, c);
        let bottom_right = texel(x1, y1, c);
        let top = top_left + (top_right - top_left) * dx;
        let bottom = bottom_left + (bottom_right - bottom_left) * dx;
        out[base + c] = (top + (bottom - top) * dy) / 255.0;
      }
    }
  }
}
