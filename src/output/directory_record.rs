// 该文件是 Xunying （巡影） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  labels::{ClassLabels, LabelsError},
  model::DetectionSet,
  output::{Render, draw::Draw, labels_from_url},
  url_file_path, url_has_flag, url_query_value,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签加载错误: {0}")]
  LabelsError(#[from] LabelsError),
}

/// 原始帧加一份文本记录，每行 `类别, 分数, x_min, y_min, x_max, y_max`
pub struct Record {
  pub label_with_name: bool,
  pub labels: ClassLabels,
}

impl Record {
  pub fn record(&self, result: &DetectionSet, path: &Path) -> Result<(), std::io::Error> {
    let mut records = Vec::with_capacity(result.len());
    for item in result.iter() {
      let name = if self.label_with_name {
        self.labels.name(item.class_id).into_owned()
      } else {
        item.class_id.to_string()
      };
      let bbox = result.source_box(item).normalized();
      records.push(format!(
        "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
        name, item.score, bbox.x1, bbox.y1, bbox.x2, bbox.y2
      ));
    }
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }
}

pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &RgbFrame,
    result: &DetectionSet,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_detection(frame, result).save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.image.save(path)?;
        record.record(result, path)?;
      }
    };

    Ok(())
  }
}

/// 按日期分目录保存结果帧，默认只保存有检测结果的帧
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  /// `folder:///dir`、`folder:///dir?record=id`、`folder:///dir?record=name&labels=/l.json&always`
  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let draw = match url_query_value(uri, "record") {
      Some(kind) => DrawWrapper::Record(Record {
        label_with_name: kind != "id",
        labels: labels_from_url(uri)?,
      }),
      None => DrawWrapper::Draw(Box::default()),
    };

    Ok(DirectoryRecordOutput {
      directory: url_file_path(uri),
      draw,
      frame_counter: Mutex::new(0),
      always: url_has_flag(uri, "always"),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let mut counter = match self.frame_counter.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbFrame, DetectionSet> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &DetectionSet) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let path = self.frame_path()?;
    debug!("记录帧 {} 到 {}", frame.index, path.display());
    self.draw.save_result(&path, frame, result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::CoordinateSpace,
    decode::{BoundingBox, Detection},
  };
  use image::RgbImage;

  fn result(items: Vec<Detection>) -> DetectionSet {
    DetectionSet {
      items: items.into_boxed_slice(),
      frame_width: 32,
      frame_height: 16,
      input_width: 800,
      input_height: 800,
      space: CoordinateSpace::Source,
    }
  }

  fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        found.extend(files_with_extension(&path, ext));
      } else if path.extension().is_some_and(|e| e == ext) {
        found.push(path);
      }
    }
    found
  }

  #[test]
  fn skips_empty_frames_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbFrame::from(RgbImage::new(32, 16));

    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&frame, &result(vec![])).unwrap();
    assert!(files_with_extension(dir.path(), "png").is_empty());

    let url = url::Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&frame, &result(vec![])).unwrap();
    assert_eq!(files_with_extension(dir.path(), "png").len(), 1);
  }

  #[test]
  fn record_mode_writes_text_with_names() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels.json");
    std::fs::write(&labels, r#"["helmet", "vest"]"#).unwrap();
    let records = dir.path().join("records");

    let url = url::Url::parse(&format!(
      "folder://{}?record=name&labels={}",
      records.display(),
      labels.display()
    ))
    .unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = RgbFrame::from(RgbImage::new(32, 16));
    let detection = Detection {
      bbox: BoundingBox {
        y1: 2.0,
        x1: 4.0,
        y2: 10.0,
        x2: 20.0,
      },
      score: 0.5,
      class_id: 1,
    };
    output.render_result(&frame, &result(vec![detection])).unwrap();

    let texts = files_with_extension(&records, "txt");
    assert_eq!(texts.len(), 1);
    let text = std::fs::read_to_string(&texts[0]).unwrap();
    assert_eq!(text, "vest, 0.5000, 4.00, 2.00, 20.00, 10.00");
    assert_eq!(files_with_extension(&records, "png").len(), 1);
  }
}
