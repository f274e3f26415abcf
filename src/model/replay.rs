// 该文件是 Xunying （巡影） 项目的一部分。
// src/model/replay.rs - 回放录制的原始输出
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
  sync::atomic::{AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::TensorFrame,
  model::{InferenceService, RawDetections, TensorLayout},
  url_file_path, url_query_value,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误 {0:?}: {1}")]
  JsonError(PathBuf, serde_json::Error),
  #[error("张量形状错误 {0:?}: {1}")]
  ShapeError(PathBuf, ndarray::ShapeError),
  #[error("没有可回放的张量: {0:?}")]
  Empty(PathBuf),
  #[error("输入尺寸不匹配: 期望 {expected:?}, 实际 {found:?}")]
  InputSizeMismatch {
    expected: (u32, u32),
    found: (u32, u32),
  },
}

/// 录制文件格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedTensor {
  pub shape: Vec<usize>,
  #[serde(default)]
  pub layout: TensorLayout,
  pub data: Vec<f32>,
}

impl From<&RawDetections> for RecordedTensor {
  fn from(raw: &RawDetections) -> Self {
    RecordedTensor {
      shape: raw.shape().to_vec(),
      layout: raw.layout(),
      data: raw.tensor().iter().copied().collect(),
    }
  }
}

impl RecordedTensor {
  pub fn load(path: &Path) -> Result<RawDetections, ReplayError> {
    let text = std::fs::read_to_string(path)?;
    let recorded: RecordedTensor =
      serde_json::from_str(&text).map_err(|e| ReplayError::JsonError(path.to_path_buf(), e))?;
    RawDetections::new(recorded.shape, recorded.data, recorded.layout)
      .map_err(|e| ReplayError::ShapeError(path.to_path_buf(), e))
  }

  pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
    let text =
      serde_json::to_string(self).map_err(|e| ReplayError::JsonError(path.to_path_buf(), e))?;
    std::fs::write(path, text)?;
    Ok(())
  }
}

/// 按顺序循环回放录制的原始张量，代替真实的推理运行时
#[derive(Debug)]
pub struct ReplayInference {
  tensors: Vec<RawDetections>,
  cursor: AtomicUsize,
  input_size: Option<(u32, u32)>,
}

impl FromUrlWithScheme for ReplayInference {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInference {
  type Error = ReplayError;

  /// `replay:///path/to/tensor.json` 或 `replay:///path/to/dir?width=800&height=800`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = url_file_path(url);
    let files = if path.is_dir() {
      let mut files: Vec<PathBuf> = std::fs::read_dir(&path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
      files.sort();
      files
    } else {
      vec![path.clone()]
    };

    info!("加载 {} 个录制张量: {}", files.len(), path.display());
    let tensors = files
      .iter()
      .map(|file| RecordedTensor::load(file))
      .collect::<Result<Vec<_>, _>>()?;
    if tensors.is_empty() {
      return Err(ReplayError::Empty(path));
    }

    let width = url_query_value(url, "width").and_then(|v| v.parse().ok());
    let height = url_query_value(url, "height").and_then(|v| v.parse().ok());
    let replay = ReplayInference::new(tensors)?;
    Ok(match (width, height) {
      (Some(w), Some(h)) => replay.with_input_size(w, h),
      _ => replay,
    })
  }
}

impl ReplayInference {
  pub fn new(tensors: Vec<RawDetections>) -> Result<Self, ReplayError> {
    if tensors.is_empty() {
      return Err(ReplayError::Empty(PathBuf::new()));
    }
    Ok(Self {
      tensors,
      cursor: AtomicUsize::new(0),
      input_size: None,
    })
  }

  /// 要求输入张量为指定尺寸
  pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
    self.input_size = Some((width, height));
    self
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }
}

impl InferenceService for ReplayInference {
  type Error = ReplayError;

  fn execute(&self, input: &TensorFrame) -> Result<RawDetections, Self::Error> {
    if let Some(expected) = self.input_size {
      let found = (input.width(), input.height());
      if expected != found {
        return Err(ReplayError::InputSizeMismatch { expected, found });
      }
    }
    let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.tensors.len();
    debug!("回放第 {} 个张量", idx);
    Ok(self.tensors[idx].clone())
  }
}
