// 该文件是 Xunying （巡影） 项目的一部分。
// src/pipeline.rs - 单帧检测流水线
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

use std::error::Error as StdError;

use thiserror::Error;
use tracing::debug;

use crate::{
  arena::ArenaScope,
  config::{ConfigError, CoordinateSpace, PipelineConfig},
  decode::{Candidates, DecodeError, decode},
  frame::{RgbFrame, TensorFrame},
  letterbox::{LetterboxError, LetterboxResult, letterbox_in},
  model::{DetectionSet, InferenceService, RawDetections},
  nms::non_max_suppression,
};

pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// 单次迭代的失败原因，只影响当前帧
#[derive(Error, Debug)]
pub enum IterationError {
  #[error("获取帧失败: {0}")]
  Capture(BoxedError),
  #[error("预处理失败: {0}")]
  InvalidFrame(#[from] LetterboxError),
  #[error("推理失败: {0}")]
  Inference(BoxedError),
  #[error("解码失败: {0}")]
  ShapeMismatch(#[from] DecodeError),
  #[error("渲染失败: {0}")]
  Render(BoxedError),
}

impl IterationError {
  pub fn capture<E: StdError + Send + Sync + 'static>(err: E) -> Self {
    IterationError::Capture(Box::new(err))
  }

  pub fn inference<E: StdError + Send + Sync + 'static>(err: E) -> Self {
    IterationError::Inference(Box::new(err))
  }

  pub fn render<E: StdError + Send + Sync + 'static>(err: E) -> Self {
    IterationError::Render(Box::new(err))
  }
}

/// 模型与配置绑定后的各个处理阶段
pub struct Pipeline<M> {
  model: M,
  config: PipelineConfig,
}

impl<M> Pipeline<M> {
  pub fn new(model: M, config: PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self { model, config })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn model(&self) -> &M {
    &self.model
  }
}

impl<M> Pipeline<M>
where
  M: InferenceService,
  M::Error: StdError + Send + Sync + 'static,
{
  pub fn preprocess(
    &self,
    frame: &RgbFrame,
    scope: &mut ArenaScope<'_>,
  ) -> Result<LetterboxResult, IterationError> {
    Ok(letterbox_in(
      frame,
      self.config.input_width,
      self.config.input_height,
      scope,
    )?)
  }

  pub fn infer(&self, input: &TensorFrame) -> Result<RawDetections, IterationError> {
    self.model.execute(input).map_err(IterationError::inference)
  }

  pub fn decode(
    &self,
    raw: &RawDetections,
    scope: &mut ArenaScope<'_>,
  ) -> Result<Candidates, IterationError> {
    Ok(decode(raw, self.config.num_classes, scope)?)
  }

  /// NMS 后按配置的坐标空间收集检测结果
  pub fn filter(
    &self,
    candidates: &Candidates,
    letterboxed: &LetterboxResult,
    frame: &RgbFrame,
  ) -> DetectionSet {
    let keep = non_max_suppression(candidates.boxes(), candidates.scores(), &self.config.nms);
    let items: Vec<_> = keep
      .into_iter()
      .map(|idx| {
        let mut detection = candidates.detection(idx);
        if self.config.space == CoordinateSpace::Source {
          detection.bbox = letterboxed.to_source(&detection.bbox);
        }
        detection
      })
      .collect();

    DetectionSet {
      items: items.into_boxed_slice(),
      frame_width: frame.width(),
      frame_height: frame.height(),
      input_width: letterboxed.input.width(),
      input_height: letterboxed.input.height(),
      space: self.config.space,
    }
  }

  /// 依次执行全部阶段
  pub fn detect(
    &self,
    frame: &RgbFrame,
    scope: &mut ArenaScope<'_>,
  ) -> Result<DetectionSet, IterationError> {
    let letterboxed = self.preprocess(frame, scope)?;
    let raw = self.infer(&letterboxed.input)?;
    let candidates = self.decode(&raw, scope)?;
    let result = self.filter(&candidates, &letterboxed, frame);
    debug!(
      "帧 {}: {} 个候选，{} 个检测结果",
      frame.index,
      candidates.len(),
      result.len()
    );
    candidates.release(scope);
    scope.recycle(letterboxed.input.into_raw());
    Ok(result)
  }
}
