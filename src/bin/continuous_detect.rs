// 该文件是 Xunying （巡影） 项目的一部分。
// src/bin/continuous_detect.rs - 连续检测
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

use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use xunying::{
  FromUrl,
  args::{PipelineArgs, ServiceArgs},
  cancel::CancellationToken,
  input::InputWrapper,
  model::ReplayInference,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::FrameLoop,
};

/// 连续处理输入帧，直到输入结束或收到中断信号
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub services: ServiceArgs,
  #[command(flatten)]
  pub pipeline: PipelineArgs,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 两帧之间的最小间隔（毫秒）
  #[arg(long, value_name = "MILLIS")]
  pub frame_interval: Option<u64>,
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

  let token = CancellationToken::new();
  let handler_token = token.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handler_token.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let mut frame_loop = FrameLoop::new(token)
    .with_frame_number(args.frame_number)
    .with_frame_interval(args.frame_interval.map(Duration::from_millis));
  let report = frame_loop.run(input, &pipeline, &output);

  info!(
    "结束状态 {:?}：{} 次迭代，{} 帧已渲染，{} 次失败，最近 {} FPS",
    report.final_state,
    report.iterations,
    report.rendered,
    report.failed,
    report.last_fps.unwrap_or(0)
  );

  Ok(())
}
