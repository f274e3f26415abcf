// 该文件是 Xunying （巡影） 项目的一部分。
// src/input/directory_input.rs - 图片目录输入
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

use std::{
  path::{Path, PathBuf},
  time::Instant,
};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, url_file_path, url_has_flag};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图片: {0:?}")]
  Empty(PathBuf),
  #[error("无法解码图片 {0:?}: {1}")]
  ImageLoadError(PathBuf, image::ImageError),
}

/// 按文件名顺序逐张读取目录中的图片
pub struct DirectoryInput {
  files: Vec<PathBuf>,
  cursor: usize,
  looping: bool,
  index: u64,
  started: Instant,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  /// `folder:///path/to/frames` 或 `folder:///path/to/frames?loop`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let directory = url_file_path(url);
    let input = DirectoryInput::open(&directory, url_has_flag(url, "loop"))?;
    info!("目录 {} 中共有 {} 张图片", directory.display(), input.len());
    Ok(input)
  }
}

impl DirectoryInput {
  pub fn open(directory: &Path, looping: bool) -> Result<Self, DirectoryInputError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }

    if files.is_empty() {
      return Err(DirectoryInputError::Empty(directory.to_path_buf()));
    }
    files.sort();

    Ok(Self {
      files,
      cursor: 0,
      looping,
      index: 0,
      started: Instant::now(),
    })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

impl Iterator for DirectoryInput {
  type Item = Result<RgbFrame, DirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor >= self.files.len() {
      if !self.looping {
        return None;
      }
      self.cursor = 0;
    }

    let path = &self.files[self.cursor];
    self.cursor += 1;
    debug!("读取 {}", path.display());

    let index = self.index;
    self.index += 1;

    let decoded = ImageReader::open(path)
      .map_err(DirectoryInputError::IoError)
      .and_then(|reader| {
        reader
          .with_guessed_format()
          .map_err(DirectoryInputError::IoError)
      })
      .and_then(|reader| {
        reader
          .decode()
          .map_err(|e| DirectoryInputError::ImageLoadError(path.clone(), e))
      });

    Some(decoded.map(|image| {
      RgbFrame::new(
        image.into_rgb8(),
        index,
        self.started.elapsed().as_millis() as u64,
      )
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn fill(dir: &Path) {
    RgbImage::from_pixel(2, 2, Rgb([20, 0, 0]))
      .save(dir.join("b.png"))
      .unwrap();
    RgbImage::from_pixel(2, 2, Rgb([10, 0, 0]))
      .save(dir.join("a.png"))
      .unwrap();
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
  }

  #[test]
  fn yields_sorted_images() {
    let dir = tempfile::tempdir().unwrap();
    fill(dir.path());

    let input = DirectoryInput::open(dir.path(), false).unwrap();
    assert_eq!(input.len(), 2);
    let reds: Vec<u8> = input
      .map(|r| r.unwrap().image.get_pixel(0, 0).0[0])
      .collect();
    assert_eq!(reds, vec![10, 20]);
  }

  #[test]
  fn loops_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    fill(dir.path());

    let url = Url::parse(&format!("folder://{}?loop", dir.path().display())).unwrap();
    let input = DirectoryInput::from_url(&url).unwrap();
    let frames: Vec<_> = input.take(5).map(|r| r.unwrap()).collect();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[4].index, 4);
    assert_eq!(frames[2].image.get_pixel(0, 0).0[0], 10);
  }

  #[test]
  fn broken_file_is_a_per_frame_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.png"), b"not an image").unwrap();
    RgbImage::new(1, 1).save(dir.path().join("b.png")).unwrap();

    let mut input = DirectoryInput::open(dir.path(), false).unwrap();
    assert!(matches!(
      input.next(),
      Some(Err(DirectoryInputError::ImageLoadError(..)))
    ));
    assert!(matches!(input.next(), Some(Ok(_))));
    assert!(input.next().is_none());
  }

  #[test]
  fn empty_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      DirectoryInput::open(dir.path(), false),
      Err(DirectoryInputError::Empty(_))
    ));
  }
}
