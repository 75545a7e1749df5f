// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/annotate.rs - 由检测结果生成标注
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

use crate::model::{BoundingBox, DetectedObject};

/// 没有任何标签时显示的文本
pub const UNKNOWN_LABEL_TEXT: &str = "Unknown";

/// 渲染用的标注：边界框与显示文本
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub bbox: BoundingBox,
  pub text: String,
}

/// 置信度转为整数百分比，截断小数部分
pub fn confidence_percent(confidence: f32) -> u32 {
  (confidence.clamp(0.0, 1.0) * 100.0) as u32
}

/// 取置信度最高的标签生成显示文本，例如 "cat, 87%"
pub fn annotation_text(object: &DetectedObject) -> String {
  match object.best_label() {
    Some(label) => format!("{}, {}%", label.text, confidence_percent(label.confidence)),
    None => UNKNOWN_LABEL_TEXT.to_string(),
  }
}

/// 每个检测目标生成一个标注，保持输入顺序
pub fn derive_annotations(objects: &[DetectedObject]) -> Vec<Annotation> {
  objects
    .iter()
    .map(|object| Annotation {
      bbox: object.bounding_box,
      text: annotation_text(object),
    })
    .collect()
}
