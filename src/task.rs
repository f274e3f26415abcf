// 该文件是 Xunying （巡影） 项目的一部分。
// src/task.rs - 任务
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
  convert::Infallible,
  error::Error as StdError,
  sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  arena::{ArenaScope, TensorArena},
  cancel::CancellationToken,
  frame::RgbFrame,
  model::{DetectionSet, InferenceService},
  output::Render,
  pipeline::{IterationError, Pipeline},
};

/// 预热次数，统计平均耗时时跳过
const WARMUP_RUNS: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Report;
  type Error;
  fn run_task(self, input: I, pipeline: &Pipeline<M>, output: O)
  -> Result<Self::Report, Self::Error>;
}

/// 由单帧耗时换算帧率，`floor(1000 / ms)`
pub fn fps_from_latency(latency: Duration) -> u32 {
  let ms = latency.as_nanos() as f64 / 1_000_000.0;
  // 耗时为零时除法得到无穷大，转换饱和到 u32::MAX
  (1000.0 / ms).floor() as u32
}

/// 最近一次完成迭代的帧率，可在其他线程读取
#[derive(Debug, Clone, Default)]
pub struct FpsGauge {
  value: Arc<AtomicU32>,
}

impl FpsGauge {
  pub fn get(&self) -> u32 {
    self.value.load(Ordering::Relaxed)
  }

  fn publish(&self, latency: Duration) -> u32 {
    let fps = fps_from_latency(latency);
    self.value.store(fps, Ordering::Relaxed);
    fps
  }
}

#[derive(Debug)]
pub struct ShotReport {
  pub result: DetectionSet,
  pub latency: Duration,
}

pub struct OneShotTask;

impl<I, IE, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Result<RgbFrame, IE>>,
  IE: StdError + Send + Sync + 'static,
  M: InferenceService,
  M::Error: StdError + Send + Sync + 'static,
  O: Render<RgbFrame, DetectionSet>,
  O::Error: StdError + Send + Sync + 'static,
{
  type Report = ShotReport;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<Self::Report, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");

    let mut arena = TensorArena::default();
    let now = Instant::now();
    let result = pipeline.detect(&frame, &mut arena.scope())?;
    let latency = now.elapsed();
    info!("推理完成，耗时: {:.2?}，检测到 {} 个目标", latency, result.len());

    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(ShotReport { result, latency })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
  pub runs: usize,
  pub mean_latency: Duration,
  pub fps: u32,
}

/// 对同一帧重复执行流水线，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

/// 平均耗时，样本足够时跳过预热
pub fn mean_latency(times: &[Duration]) -> Duration {
  let samples = if times.len() > WARMUP_RUNS {
    &times[WARMUP_RUNS..]
  } else {
    times
  };
  if samples.is_empty() {
    return Duration::ZERO;
  }
  samples.iter().sum::<Duration>() / samples.len() as u32
}

impl<I, IE, M, O> Task<I, M, O> for RepeatShotTask
where
  I: Iterator<Item = Result<RgbFrame, IE>>,
  IE: StdError + Send + Sync + 'static,
  M: InferenceService,
  M::Error: StdError + Send + Sync + 'static,
  O: Render<RgbFrame, DetectionSet>,
  O::Error: StdError + Send + Sync + 'static,
{
  type Report = BenchmarkReport;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<Self::Report, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");

    let mut arena = TensorArena::default();
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = pipeline.detect(&frame, &mut arena.scope())?;
      let elapsed = now.elapsed();
      debug!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    let mean = mean_latency(&times);
    let report = BenchmarkReport {
      runs: times.len(),
      mean_latency: mean,
      fps: fps_from_latency(mean),
    };
    warn!(
      "平均推理时间: {:.2?} ({} FPS)，峰值张量内存 {} 字节",
      report.mean_latency,
      report.fps,
      arena.peak_bytes()
    );

    Ok(report)
  }
}

/// 循环当前所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Capturing,
  Preprocessing,
  Inferring,
  Decoding,
  Filtering,
  Rendering,
  Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
  #[default]
  Idle,
  Running(Stage),
  Finished,
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopReport {
  /// 取得过帧（含获取失败）的迭代次数
  pub iterations: usize,
  pub rendered: usize,
  pub failed: usize,
  pub last_fps: Option<u32>,
  pub final_state: LoopState,
}

enum Outcome {
  Rendered,
  Cancelled,
}

/// 连续帧循环：获取、预处理、推理、解码、过滤、渲染，一次只处理一帧
pub struct FrameLoop {
  token: CancellationToken,
  arena: TensorArena,
  fps: FpsGauge,
  state: LoopState,
  frame_number: Option<usize>,
  frame_interval: Option<Duration>,
}

impl FrameLoop {
  pub fn new(token: CancellationToken) -> Self {
    Self {
      token,
      arena: TensorArena::default(),
      fps: FpsGauge::default(),
      state: LoopState::Idle,
      frame_number: None,
      frame_interval: None,
    }
  }

  /// 处理指定帧数后结束
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 两次迭代开始之间的最小间隔
  pub fn with_frame_interval(mut self, frame_interval: Option<Duration>) -> Self {
    self.frame_interval = frame_interval;
    self
  }

  pub fn fps_gauge(&self) -> FpsGauge {
    self.fps.clone()
  }

  pub fn state(&self) -> LoopState {
    self.state
  }

  pub fn arena(&self) -> &TensorArena {
    &self.arena
  }

  pub fn run<I, IE, M, O>(&mut self, mut input: I, pipeline: &Pipeline<M>, output: &O) -> LoopReport
  where
    I: Iterator<Item = Result<RgbFrame, IE>>,
    IE: StdError + Send + Sync + 'static,
    M: InferenceService,
    M::Error: StdError + Send + Sync + 'static,
    O: Render<RgbFrame, DetectionSet>,
    O::Error: StdError + Send + Sync + 'static,
  {
    info!("开始帧循环...");
    let mut report = LoopReport::default();

    let final_state = loop {
      if self.token.is_cancelled() {
        warn!("中断信号接收，退出任务循环");
        break LoopState::Cancelled;
      }
      if self
        .frame_number
        .is_some_and(|limit| report.iterations >= limit)
      {
        info!("达到指定帧数 {}, 退出任务循环", report.iterations);
        break LoopState::Finished;
      }

      self.state = LoopState::Running(Stage::Capturing);
      let Some(captured) = input.next() else {
        info!("输入结束，退出任务循环");
        break LoopState::Finished;
      };
      report.iterations += 1;
      let started = Instant::now();

      let outcome = {
        let mut scope = self.arena.scope();
        run_iteration(
          captured,
          pipeline,
          output,
          &self.token,
          &mut self.state,
          &mut scope,
        )
      };

      if let Some(stopped) = self.settle(outcome, started, &mut report) {
        break stopped;
      }

      if let Some(interval) = self.frame_interval {
        let elapsed = started.elapsed();
        if elapsed < interval {
          thread::sleep(interval - elapsed);
        }
      }
    };

    self.state = final_state;
    report.final_state = final_state;
    info!(
      "任务完成：{} 次迭代，{} 帧已渲染，{} 次失败",
      report.iterations, report.rendered, report.failed
    );
    report
  }
}

impl FrameLoop {
  /// 结算一次迭代：渲染成功或失败都进入 `Scheduled`，观察到取消时返回终止状态
  fn settle(
    &mut self,
    outcome: Result<Outcome, IterationError>,
    started: Instant,
    report: &mut LoopReport,
  ) -> Option<LoopState> {
    match outcome {
      Ok(Outcome::Rendered) => {
        report.rendered += 1;
        let latency = started.elapsed();
        let fps = self.fps.publish(latency);
        report.last_fps = Some(fps);
        debug!("第 {} 帧完成，耗时: {:.2?}，{} FPS", report.iterations, latency, fps);
      }
      Ok(Outcome::Cancelled) => {
        warn!("中断信号接收，丢弃当前帧结果");
        return Some(LoopState::Cancelled);
      }
      Err(err) => {
        report.failed += 1;
        warn!("第 {} 次迭代失败，跳过: {}", report.iterations, err);
      }
    }
    self.state = LoopState::Running(Stage::Scheduled);
    None
  }
}

fn run_iteration<IE, M, O>(
  captured: Result<RgbFrame, IE>,
  pipeline: &Pipeline<M>,
  output: &O,
  token: &CancellationToken,
  state: &mut LoopState,
  scope: &mut ArenaScope<'_>,
) -> Result<Outcome, IterationError>
where
  IE: StdError + Send + Sync + 'static,
  M: InferenceService,
  M::Error: StdError + Send + Sync + 'static,
  O: Render<RgbFrame, DetectionSet>,
  O::Error: StdError + Send + Sync + 'static,
{
  let frame = captured.map_err(IterationError::capture)?;
  if token.is_cancelled() {
    return Ok(Outcome::Cancelled);
  }

  *state = LoopState::Running(Stage::Preprocessing);
  let letterboxed = pipeline.preprocess(&frame, scope)?;

  *state = LoopState::Running(Stage::Inferring);
  let raw = pipeline.infer(&letterboxed.input)?;
  if token.is_cancelled() {
    return Ok(Outcome::Cancelled);
  }

  *state = LoopState::Running(Stage::Decoding);
  let candidates = pipeline.decode(&raw, scope)?;

  *state = LoopState::Running(Stage::Filtering);
  let result = pipeline.filter(&candidates, &letterboxed, &frame);
  debug!(
    "帧 {}: {} 个候选，{} 个检测结果",
    frame.index,
    candidates.len(),
    result.len()
  );
  candidates.release(scope);
  scope.recycle(letterboxed.input.into_raw());

  if token.is_cancelled() {
    return Ok(Outcome::Cancelled);
  }
  *state = LoopState::Running(Stage::Rendering);
  output
    .render_result(&frame, &result)
    .map_err(IterationError::render)?;

  Ok(Outcome::Rendered)
}

impl<I, IE, M, O> Task<I, M, O> for &mut FrameLoop
where
  I: Iterator<Item = Result<RgbFrame, IE>>,
  IE: StdError + Send + Sync + 'static,
  M: InferenceService,
  M::Error: StdError + Send + Sync + 'static,
  O: Render<RgbFrame, DetectionSet>,
  O::Error: StdError + Send + Sync + 'static,
{
  type Report = LoopReport;
  type Error = Infallible;

  fn run_task(
    self,
    input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<Self::Report, Self::Error> {
    Ok(self.run(input, pipeline, &output))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fps_is_floor_of_inverse_latency() {
    assert_eq!(fps_from_latency(Duration::from_millis(16)), 62);
    assert_eq!(fps_from_latency(Duration::from_millis(1000)), 1);
    assert_eq!(fps_from_latency(Duration::from_millis(1500)), 0);
    assert_eq!(fps_from_latency(Duration::from_micros(2500)), 400);
    assert_eq!(fps_from_latency(Duration::ZERO), u32::MAX);
  }

  #[test]
  fn mean_skips_warmup() {
    let ms = Duration::from_millis;
    assert_eq!(mean_latency(&[ms(100), ms(50), ms(10), ms(20)]), ms(15));
    assert_eq!(mean_latency(&[ms(10), ms(30)]), ms(20));
    assert_eq!(mean_latency(&[]), Duration::ZERO);
  }

  #[test]
  fn failed_iteration_is_still_scheduled() {
    let mut frame_loop = FrameLoop::new(CancellationToken::new());
    frame_loop.state = LoopState::Running(Stage::Inferring);
    let mut report = LoopReport {
      iterations: 1,
      ..LoopReport::default()
    };

    let err = IterationError::capture(std::io::Error::other("坏帧"));
    assert_eq!(frame_loop.settle(Err(err), Instant::now(), &mut report), None);
    assert_eq!(frame_loop.state(), LoopState::Running(Stage::Scheduled));
    assert_eq!(report.failed, 1);
    assert_eq!(report.last_fps, None);

    frame_loop.state = LoopState::Running(Stage::Rendering);
    assert_eq!(
      frame_loop.settle(Ok(Outcome::Rendered), Instant::now(), &mut report),
      None
    );
    assert_eq!(frame_loop.state(), LoopState::Running(Stage::Scheduled));
    assert_eq!(report.rendered, 1);

    assert_eq!(
      frame_loop.settle(Ok(Outcome::Cancelled), Instant::now(), &mut report),
      Some(LoopState::Cancelled)
    );
  }

  #[test]
  fn gauge_is_shared() {
    let gauge = FpsGauge::default();
    let reader = gauge.clone();
    assert_eq!(reader.get(), 0);
    gauge.publish(Duration::from_millis(20));
    assert_eq!(reader.get(), 50);
  }
}
