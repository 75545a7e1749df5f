// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/output/record.rs - 检测结果文本记录
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

use std::path::{Path, PathBuf};

use crate::model::DetectResult;

/// 每个标签一行：序号, 跟踪 ID, 边界框, 类别, 置信度。
/// 没有标签的目标输出一行，类别为空
pub struct Record;

impl Record {
  pub fn lines(result: &DetectResult) -> Vec<String> {
    let mut records = Vec::new();
    for (index, item) in result.items.iter().enumerate() {
      let bbox = &item.bounding_box;
      let tracking_id = item
        .tracking_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
      let prefix = format!(
        "{}, {}, {:.1}, {:.1}, {:.1}, {:.1}",
        index,
        tracking_id,
        bbox.left(),
        bbox.top(),
        bbox.right(),
        bbox.bottom()
      );
      if item.labels.is_empty() {
        records.push(format!("{}, , ", prefix));
      }
      for label in item.labels.iter() {
        records.push(format!("{}, {}, {:.4}", prefix, label.text, label.confidence));
      }
    }
    records
  }

  /// 记录文件路径为图像路径追加 .txt 后缀
  pub fn record_path(path: &Path) -> PathBuf {
    let mut path = path.as_os_str().to_owned();
    path.push(".txt");
    PathBuf::from(path)
  }

  /// 写入记录文件，返回记录文件路径
  pub fn record(result: &DetectResult, path: &Path) -> Result<PathBuf, std::io::Error> {
    let path = Self::record_path(path);
    std::fs::write(&path, Self::lines(result).join("\n"))?;
    Ok(path)
  }
}
