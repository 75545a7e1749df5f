// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/model/replay.rs - 回放检测器：从 JSON 读取检测器输出
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
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, DetectedObject, Detector, DetectorConfig, InvalidConfig},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum ReplayDetectorError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("检测结果文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("检测结果文件格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
  #[error("检测器配置无效: {0}")]
  InvalidConfig(#[from] InvalidConfig),
}

#[derive(Debug, Deserialize)]
struct ReplayDocument {
  #[serde(default)]
  objects: Vec<DetectedObject>,
}

/// 回放预先导出的检测器输出，并按配置进行过滤，
/// 行为与设备端检测器一致
#[derive(Debug, Clone)]
pub struct ReplayDetector {
  name: String,
  objects: Vec<DetectedObject>,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayDetectorError::SchemeMismatch(format!(
        "检测器路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = url_file_path(url);
    info!("加载检测结果文件: {}", path);
    let data = std::fs::read_to_string(&path)?;
    let detector = Self::from_json(&data)?;
    Ok(detector.with_name(path))
  }
}

impl ReplayDetector {
  pub fn new(objects: Vec<DetectedObject>) -> Self {
    Self {
      name: Self::SCHEME.to_string(),
      objects,
    }
  }

  pub fn from_json(data: &str) -> Result<Self, ReplayDetectorError> {
    let document: ReplayDocument = serde_json::from_str(data)?;
    debug!("检测结果文件包含 {} 个目标", document.objects.len());
    Ok(Self::new(document.objects))
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  fn filter_object(
    object: &DetectedObject,
    config: &DetectorConfig,
    width: u32,
    height: u32,
  ) -> DetectedObject {
    let mut labels = if config.classification_enabled {
      object
        .labels
        .iter()
        .filter(|label| label.confidence >= config.confidence_threshold)
        .cloned()
        .collect::<Vec<_>>()
    } else {
      Vec::new()
    };
    // sort_by 是稳定排序，同置信度保持原顺序
    labels.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    labels.truncate(config.max_labels_per_object);

    DetectedObject {
      bounding_box: object.bounding_box.clip(width, height),
      labels,
      tracking_id: object.tracking_id,
    }
  }
}

impl Detector for ReplayDetector {
  type Error = ReplayDetectorError;

  fn detect(
    &self,
    image: &RgbaImage,
    config: &DetectorConfig,
  ) -> Result<DetectResult, Self::Error> {
    config.validate()?;
    let (width, height) = image.dimensions();

    let mut items: Vec<DetectedObject> = self
      .objects
      .iter()
      .map(|object| Self::filter_object(object, config, width, height))
      .collect();

    if !config.multi_object && items.len() > 1 {
      // 单目标模式下只保留最显著（面积最大）的目标
      let mut best = 0;
      for (index, object) in items.iter().enumerate() {
        if object.bounding_box.area() > items[best].bounding_box.area() {
          best = index;
        }
      }
      items = vec![items.swap_remove(best)];
    }

    debug!("回放检测器返回 {} 个目标", items.len());
    Ok(DetectResult::from(items))
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, Label};

  fn sample() -> ReplayDetector {
    ReplayDetector::from_json(
      r#"{
        "objects": [
          {
            "bounding_box": [10, 10, 60, 40],
            "labels": [
              {"text": "cat", "confidence": 0.4},
              {"text": "dog", "confidence": 0.9},
              {"text": "fox", "confidence": 0.7},
              {"text": "wolf", "confidence": 0.6}
            ],
            "tracking_id": 7
          },
          {
            "bounding_box": [0, 0, 500, 500],
            "labels": [{"text": "sofa", "confidence": 0.3}]
          }
        ]
      }"#,
    )
    .unwrap()
  }

  fn canvas() -> RgbaImage {
    RgbaImage::new(200, 100)
  }

  #[test]
  fn drops_labels_below_threshold_and_sorts() {
    let result = sample().detect(&canvas(), &DetectorConfig::default()).unwrap();
    assert_eq!(result.len(), 2);

    let texts: Vec<_> = result.items[0]
      .labels
      .iter()
      .map(|l| l.text.as_str())
      .collect();
    assert_eq!(texts, vec!["dog", "fox", "wolf"]);
    assert_eq!(result.items[0].tracking_id, Some(7));
    // 标签全部被过滤的目标仍然保留
    assert!(result.items[1].labels.is_empty());
  }

  #[test]
  fn truncates_to_max_labels() {
    let config = DetectorConfig::default()
      .with_confidence_threshold(0.0)
      .with_max_labels_per_object(2);
    let result = sample().detect(&canvas(), &config).unwrap();
    let texts: Vec<_> = result.items[0]
      .labels
      .iter()
      .map(|l| l.text.as_str())
      .collect();
    assert_eq!(texts, vec!["dog", "fox"]);
  }

  #[test]
  fn classification_disabled_drops_all_labels() {
    let config = DetectorConfig::default().with_classification(false);
    let result = sample().detect(&canvas(), &config).unwrap();
    assert!(result.items.iter().all(|o| o.labels.is_empty()));
  }

  #[test]
  fn single_object_mode_keeps_largest() {
    let config = DetectorConfig::default().with_multi_object(false);
    let result = sample().detect(&canvas(), &config).unwrap();
    assert_eq!(result.len(), 1);
    // 第二个目标被裁剪到 200x100，仍然是最大的
    assert_eq!(
      result.items[0].bounding_box,
      BoundingBox::new(0.0, 0.0, 200.0, 100.0)
    );
  }

  #[test]
  fn invalid_threshold_is_rejected() {
    let config = DetectorConfig::default().with_confidence_threshold(-0.1);
    assert!(matches!(
      sample().detect(&canvas(), &config),
      Err(ReplayDetectorError::InvalidConfig(_))
    ));
  }

  #[test]
  fn empty_document_yields_no_objects() {
    let detector = ReplayDetector::from_json("{}").unwrap();
    let result = detector.detect(&canvas(), &DetectorConfig::default()).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn from_url_requires_replay_scheme() {
    let url = Url::parse("yolo26:///tmp/model.rknn").unwrap();
    assert!(matches!(
      ReplayDetector::from_url(&url),
      Err(ReplayDetectorError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn from_url_reads_document() {
    let path = std::env::temp_dir().join(format!("biankuang-replay-{}.json", std::process::id()));
    let document = r#"{"objects": [{"bounding_box": [1, 1, 5, 5], "labels": [{"text": "cup", "confidence": 0.8}]}]}"#;
    std::fs::write(&path, document).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("replay://{}", url.path())).unwrap();
    let detector = ReplayDetector::from_url(&url).unwrap();
    let result = detector.detect(&canvas(), &DetectorConfig::default()).unwrap();
    assert_eq!(result.items[0].labels, vec![Label::new("cup", 0.8)]);

    std::fs::remove_file(&path).ok();
  }
}
