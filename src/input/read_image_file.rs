// 该文件是 Xunying （巡影） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::time::Instant;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, input::repeat_count, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图片作为帧源，可重复产出
pub struct ImageFileInput {
  image: RgbImage,
  /// 剩余帧数，`None` 表示无限
  remaining: Option<u64>,
  index: u64,
  started: Instant,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  /// `image:///path/to/a.png`、`image:///a.png?repeat=10` 或 `image:///a.png?loop`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let path = url_file_path(url);
    let image = ImageReader::open(&path)?.decode()?.into_rgb8();
    info!(
      "读取图片 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput::new(image, repeat_count(url)))
  }
}

impl ImageFileInput {
  pub fn new(image: RgbImage, repeat: Option<u64>) -> Self {
    Self {
      image,
      remaining: repeat,
      index: 0,
      started: Instant::now(),
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<RgbFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(remaining) = self.remaining.as_mut() {
      if *remaining == 0 {
        return None;
      }
      *remaining -= 1;
    }

    let frame = RgbFrame::new(
      self.image.clone(),
      self.index,
      self.started.elapsed().as_millis() as u64,
    );
    self.index += 1;
    Some(Ok(frame))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn repeats_the_image() {
    let mut input = ImageFileInput::new(RgbImage::from_pixel(3, 2, Rgb([9, 9, 9])), Some(3));
    let frames: Vec<_> = input.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(
      frames.iter().map(|f| f.index).collect::<Vec<_>>(),
      vec![0, 1, 2]
    );
    assert_eq!(frames[2].width(), 3);
    assert!(input.next().is_none());
  }

  #[test]
  fn loops_forever() {
    let input = ImageFileInput::new(RgbImage::new(1, 1), None);
    assert_eq!(input.take(100).count(), 100);
  }

  #[test]
  fn reads_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::from_pixel(5, 4, Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=2", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    let frames: Vec<_> = input.map(|r| r.unwrap()).collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].image.get_pixel(4, 3).0, [1, 2, 3]);

    let missing = Url::parse("image:///definitely/not/here.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&missing),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
