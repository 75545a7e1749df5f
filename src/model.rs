// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/model.rs - 检测模型接口与检测结果
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

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// 检测器配置的默认值，与移动端检测器的设置一致
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_LABELS_PER_OBJECT: usize = 3;

/// 检测后端接口，任何目标检测实现都可以替换
pub trait Detector {
  type Error;

  fn detect(
    &self,
    image: &RgbaImage,
    config: &DetectorConfig,
  ) -> Result<DetectResult, Self::Error>;

  fn name(&self) -> &str;
}

/// 图像坐标系下的轴对齐边界框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
  left: f32,
  top: f32,
  right: f32,
  bottom: f32,
}

impl BoundingBox {
  /// 构造边界框，颠倒的边会被交换，保证 left <= right, top <= bottom
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
    Self {
      left: left.min(right),
      top: top.min(bottom),
      right: left.max(right),
      bottom: top.max(bottom),
    }
  }

  pub fn left(&self) -> f32 {
    self.left
  }

  pub fn top(&self) -> f32 {
    self.top
  }

  pub fn right(&self) -> f32 {
    self.right
  }

  pub fn bottom(&self) -> f32 {
    self.bottom
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// 裁剪到 [0, width] x [0, height]
  pub fn clip(&self, width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self::new(
      self.left.clamp(0.0, w),
      self.top.clamp(0.0, h),
      self.right.clamp(0.0, w),
      self.bottom.clamp(0.0, h),
    )
  }
}

impl From<[f32; 4]> for BoundingBox {
  fn from(bbox: [f32; 4]) -> Self {
    Self::new(bbox[0], bbox[1], bbox[2], bbox[3])
  }
}

impl From<BoundingBox> for [f32; 4] {
  fn from(bbox: BoundingBox) -> Self {
    [bbox.left, bbox.top, bbox.right, bbox.bottom]
  }
}

/// 分类标签：类别文本与置信度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
  pub text: String,
  pub confidence: f32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub index: Option<u32>,
}

impl Label {
  pub fn new(text: impl Into<String>, confidence: f32) -> Self {
    Self {
      text: text.into(),
      confidence,
      index: None,
    }
  }
}

/// 一个检测到的目标。labels 按置信度降序排列，由检测器保证
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
  pub bounding_box: BoundingBox,
  #[serde(default)]
  pub labels: Vec<Label>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tracking_id: Option<i32>,
}

impl DetectedObject {
  pub fn new(bounding_box: BoundingBox) -> Self {
    Self {
      bounding_box,
      labels: Vec::new(),
      tracking_id: None,
    }
  }

  pub fn with_label(mut self, label: Label) -> Self {
    self.labels.push(label);
    self
  }

  pub fn with_tracking_id(mut self, tracking_id: i32) -> Self {
    self.tracking_id = Some(tracking_id);
    self
  }

  /// 置信度最高的标签
  pub fn best_label(&self) -> Option<&Label> {
    self.labels.first()
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectedObject]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl From<Vec<DetectedObject>> for DetectResult {
  fn from(items: Vec<DetectedObject>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum InvalidConfig {
  #[error("置信度阈值超出范围 [0, 1]: {0}")]
  ConfidenceThreshold(f32),
}

/// 检测器配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub confidence_threshold: f32,
  pub max_labels_per_object: usize,
  pub multi_object: bool,
  pub classification_enabled: bool,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      max_labels_per_object: DEFAULT_MAX_LABELS_PER_OBJECT,
      multi_object: true,
      classification_enabled: true,
    }
  }
}

impl DetectorConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_max_labels_per_object(mut self, max_labels: usize) -> Self {
    self.max_labels_per_object = max_labels;
    self
  }

  pub fn with_multi_object(mut self, multi_object: bool) -> Self {
    self.multi_object = multi_object;
    self
  }

  pub fn with_classification(mut self, enabled: bool) -> Self {
    self.classification_enabled = enabled;
    self
  }

  pub fn validate(&self) -> Result<(), InvalidConfig> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(InvalidConfig::ConfidenceThreshold(
        self.confidence_threshold,
      ));
    }
    Ok(())
  }
}

/// 逐个目标输出诊断日志
pub fn log_detections(result: &DetectResult) {
  for (index, object) in result.items.iter().enumerate() {
    let bbox = &object.bounding_box;
    info!("检测到目标: {}", index);
    info!(" 跟踪 ID: {:?}", object.tracking_id);
    info!(
      " 边界框: ({}, {}) - ({}, {})",
      bbox.left(),
      bbox.top(),
      bbox.right(),
      bbox.bottom()
    );
    for label in object.labels.iter() {
      info!(" 类别: {}", label.text);
      info!(" 置信度: {}", label.confidence);
    }
  }
}

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayDetector, ReplayDetectorError};
