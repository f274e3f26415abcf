// 该文件是 Xunying （巡影） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Args;
use url::Url;

use crate::{
  config::{
    CoordinateSpace, MODEL_CLASS_NUM, MODEL_INPUT_HEIGHT, MODEL_INPUT_WIDTH, NMS_IOU_THRESHOLD,
    NMS_MAX_OUTPUTS, NMS_SCORE_THRESHOLD, PipelineConfig,
  },
  nms::NmsParams,
};

/// 各个程序共用的服务地址
#[derive(Args, Debug)]
pub struct ServiceArgs {
  /// 推理服务，例如 replay:///path/to/tensors
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  /// - 图片: image:///path/to/a.png?repeat=N 或 ?loop
  /// - 目录: folder:///path/to/frames?loop
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出
  /// - 图片: image:///path/to/out.png
  /// - 目录: folder:///path/to/dir?record=id|name&always
  /// - 日志: log://
  /// - JSON Lines: jsonl:///path/to/out.jsonl
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

/// 流水线配置
#[derive(Args, Debug)]
pub struct PipelineArgs {
  /// 模型输入宽度
  #[arg(long, default_value_t = MODEL_INPUT_WIDTH, value_name = "PIXELS")]
  pub input_width: u32,
  /// 模型输入高度
  #[arg(long, default_value_t = MODEL_INPUT_HEIGHT, value_name = "PIXELS")]
  pub input_height: u32,
  /// 类别数
  #[arg(long, default_value_t = MODEL_CLASS_NUM, value_name = "COUNT")]
  pub num_classes: usize,
  /// NMS 最多保留的检测数
  #[arg(long, default_value_t = NMS_MAX_OUTPUTS, value_name = "COUNT")]
  pub max_outputs: usize,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = NMS_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou_threshold: f32,
  /// 分数阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = NMS_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub score_threshold: f32,
  /// 检测框映射回原始帧坐标系，默认保留模型输入坐标
  #[arg(long)]
  pub source_space: bool,
}

impl PipelineArgs {
  pub fn to_config(&self) -> PipelineConfig {
    let space = if self.source_space {
      CoordinateSpace::Source
    } else {
      CoordinateSpace::ModelInput
    };
    PipelineConfig::default()
      .with_input_size(self.input_width, self.input_height)
      .with_num_classes(self.num_classes)
      .with_nms(NmsParams {
        max_outputs: self.max_outputs,
        iou_threshold: self.iou_threshold,
        score_threshold: self.score_threshold,
      })
      .with_space(space)
  }
}
