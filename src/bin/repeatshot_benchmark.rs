// 该文件是 Xunying （巡影） 项目的一部分。
// src/bin/repeatshot_benchmark.rs - 重复检测基准
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use xunying::{
  FromUrl,
  args::{PipelineArgs, ServiceArgs},
  input::InputWrapper,
  model::ReplayInference,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::{RepeatShotTask, Task},
};

/// 对同一帧重复执行流水线并统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub services: ServiceArgs,
  #[command(flatten)]
  pub pipeline: PipelineArgs,
  /// 重复次数
  #[arg(long, default_value_t = 1000, value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理服务: {}", args.services.model);
  info!("输入来源: {}", args.services.input);
  info!("输出路径: {}", args.services.output);

  let config = args.pipeline.to_config();
  let input = InputWrapper::from_url(&args.services.input)?;
  let model = ReplayInference::from_url(&args.services.model)?
    .with_input_size(config.input_width, config.input_height);
  let output = OutputWrapper::from_url(&args.services.output)?;
  let pipeline = Pipeline::new(model, config)?;

  let report = RepeatShotTask::default()
    .with_repeat(args.repeat)
    .run_task(input, &pipeline, output)?;
  info!(
    "{} 次运行，平均 {:.2?}，{} FPS",
    report.runs, report.mean_latency, report.fps
  );

  Ok(())
}
