// 该文件是 Xunying （巡影） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{frame::RgbFrame, model::DetectionSet};

const PALETTE_SIZE: usize = 30;
const BOX_THICKNESS: u32 = 2;

/// 在原始帧上绘制检测框，每个类别一种颜色
pub struct Draw {
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();
    Self { colors }
  }
}

impl Draw {
  pub fn color(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectionSet) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    for detection in result.iter() {
      let bbox = result.source_box(detection).normalized();
      let x_min = (bbox.x1.floor() as i32).clamp(0, w - 1);
      let y_min = (bbox.y1.floor() as i32).clamp(0, h - 1);
      let x_max = (bbox.x2.ceil() as i32).clamp(0, w - 1);
      let y_max = (bbox.y2.ceil() as i32).clamp(0, h - 1);
      if x_min >= x_max || y_min >= y_max {
        continue;
      }

      let color = self.color(detection.class_id);
      // 加粗为 2 像素，向内收缩
      for t in 0..BOX_THICKNESS as i32 {
        let width = (x_max - x_min + 1 - 2 * t).max(0) as u32;
        let height = (y_max - y_min + 1 - 2 * t).max(0) as u32;
        if width == 0 || height == 0 {
          break;
        }
        draw_hollow_rect_mut(image, Rect::at(x_min + t, y_min + t).of_size(width, height), color);
      }
    }
  }

  pub fn draw_detection(&self, frame: &RgbFrame, result: &DetectionSet) -> RgbImage {
    let mut image = frame.image.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
