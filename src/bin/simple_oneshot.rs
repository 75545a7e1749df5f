// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测并输出标注
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

use std::time::Duration;

use ab_glyph::FontArc;
use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use biankuang::{
  FromUrl,
  detect::CancelToken,
  input::ImageFileInput,
  model::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_LABELS_PER_OBJECT, DetectorConfig, ReplayDetector,
  },
  output::SaveImageFileOutput,
  task::{OneShotTask, Task},
};

/// Biankuang 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器，例如 replay:///path/to/detections.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///path/to/out.png?font=/path/to/font.ttf&record
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 分类置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 每个目标最多保留的标签数
  #[arg(long, default_value_t = DEFAULT_MAX_LABELS_PER_OBJECT, value_name = "COUNT")]
  pub max_labels: usize,
  /// 只检测最显著的一个目标
  #[arg(long)]
  pub single_object: bool,
  /// 关闭分类，只输出边界框
  #[arg(long)]
  pub no_classification: bool,
  /// 检测超时（毫秒，0 表示不限制）
  #[arg(long, default_value = "10000", value_name = "MILLIS")]
  pub timeout_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测器: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);

  let config = DetectorConfig::default()
    .with_confidence_threshold(args.confidence)
    .with_max_labels_per_object(args.max_labels)
    .with_multi_object(!args.single_object)
    .with_classification(!args.no_classification);
  let timeout = (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms));

  let cancel = CancelToken::new();
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，取消检测...");
      cancel.cancel();
    })?;
  }

  let input = ImageFileInput::from_url(&args.input)?;
  let model = ReplayDetector::from_url(&args.model)?;
  let output = SaveImageFileOutput::<FontArc>::from_url(&args.output)?;

  OneShotTask::new(config)
    .with_timeout(timeout)
    .with_cancel_token(cancel)
    .run_task(input, model, output)?;

  info!("处理完成!");
  Ok(())
}
