// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::Path;

use ab_glyph::FontArc;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  annotate::derive_annotations,
  model::DetectResult,
  output::{
    Render,
    draw::{DEFAULT_FONT_PATH, Draw, FontLoadError, LabelFont, load_font},
    record::Record,
  },
  url_file_path,
};

pub struct SaveImageFileOutput<F> {
  path: String,
  draw: Draw<F>,
  record: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("字体错误: {0}")]
  FontError(#[from] FontLoadError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl<F> FromUrlWithScheme for SaveImageFileOutput<F>
where
  SaveImageFileOutput<F>: FromUrl,
{
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput<FontArc> {
  type Error = SaveImageFileError;

  /// image:///path/to/out.png?font=/path/to/font.ttf&record
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let font_path = uri
      .query_pairs()
      .find(|(k, _)| k == "font")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_FONT_PATH.to_string());
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    let font = load_font(&font_path)?;
    Ok(SaveImageFileOutput::new(url_file_path(uri), Draw::new(font)).with_record(record))
  }
}

impl<F: LabelFont> SaveImageFileOutput<F> {
  pub fn new(path: impl Into<String>, draw: Draw<F>) -> Self {
    Self {
      path: path.into(),
      draw,
      record: false,
    }
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn with_draw<G: LabelFont>(self, draw: Draw<G>) -> SaveImageFileOutput<G> {
    SaveImageFileOutput {
      path: self.path,
      draw,
      record: self.record,
    }
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  fn save_image(&self, image: RgbaImage) -> Result<(), SaveImageFileError> {
    let path = Path::new(&self.path);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    // JPEG 不支持透明通道
    let is_jpeg = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
      .unwrap_or(false);
    if is_jpeg {
      DynamicImage::ImageRgba8(image)
        .to_rgb8()
        .save(path)
        .map_err(SaveImageFileError::ImageError)?;
    } else {
      image.save(path).map_err(SaveImageFileError::ImageError)?;
    }

    warn!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl<F: LabelFont> Render<RgbaImage, DetectResult> for SaveImageFileOutput<F> {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbaImage, result: &DetectResult) -> Result<(), Self::Error> {
    let annotations = derive_annotations(&result.items);
    let image = self.draw.render(frame, &annotations);
    self.save_image(image)?;

    if self.record {
      let record_path =
        Record::record(result, Path::new(&self.path)).map_err(SaveImageFileError::IoError)?;
      info!("保存检测记录到文件: {}", record_path.display());
    }

    Ok(())
  }
}
