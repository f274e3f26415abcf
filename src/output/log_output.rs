// 该文件是 Xunying （巡影） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  labels::{ClassLabels, LabelsError},
  model::DetectionSet,
  output::{Render, labels_from_url},
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("标签加载错误: {0}")]
  LabelsError(#[from] LabelsError),
}

/// 把每个检测结果写成一条 `info` 日志
pub struct LogOutput {
  labels: ClassLabels,
}

impl LogOutput {
  pub fn new(labels: ClassLabels) -> Self {
    Self { labels }
  }
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(LogOutput::new(labels_from_url(url)?))
  }
}

impl Render<RgbFrame, DetectionSet> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &RgbFrame, result: &DetectionSet) -> Result<(), Self::Error> {
    info!(
      frame = frame.index,
      timestamp_ms = frame.timestamp_ms,
      count = result.len(),
      "检测完成"
    );
    for item in result.iter() {
      let bbox = result.source_box(item);
      info!(
        frame = frame.index,
        class = %self.labels.name(item.class_id),
        score = item.score,
        "[{:.1}, {:.1}, {:.1}, {:.1}]",
        bbox.x1,
        bbox.y1,
        bbox.x2,
        bbox.y2
      );
    }
    Ok(())
  }
}
