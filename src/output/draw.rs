// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/output/draw.rs - 标注渲染：边界框与自适应字号的标签文本
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

use ab_glyph::{FontArc, FontRef, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, info};

use crate::annotate::Annotation;

// 渲染常量
const BOX_COLOR: [u8; 4] = [0, 255, 0, 255]; // 绿色
const TEXT_COLOR: [u8; 4] = [0, 0, 255, 255]; // 蓝色
const BOX_STROKE_WIDTH: f32 = 1.5;
const BASE_FONT_SIZE: f32 = 80.0;
// 测量宽度的最小除数，避免除零
const MIN_TEXT_WIDTH: f32 = 1.0;

/// 系统中常见的默认字体位置
pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Error, Debug)]
pub enum FontLoadError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 从文件加载字体
pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, FontLoadError> {
  let path = path.as_ref();
  info!("加载字体文件: {}", path.display());
  let data = std::fs::read(path)?;
  Ok(FontArc::try_from_vec(data)?)
}

/// 标签文本的测量与绘制
pub trait LabelFont {
  /// 指定字号下文本的 (宽, 高)
  fn text_extent(&self, size: f32, text: &str) -> (u32, u32);

  /// 以 (x, y) 为左上角绘制填充文本
  fn draw_label(
    &self,
    canvas: &mut RgbaImage,
    color: Rgba<u8>,
    x: i32,
    y: i32,
    size: f32,
    text: &str,
  );
}

impl LabelFont for FontArc {
  fn text_extent(&self, size: f32, text: &str) -> (u32, u32) {
    text_size(PxScale::from(size), self, text)
  }

  fn draw_label(
    &self,
    canvas: &mut RgbaImage,
    color: Rgba<u8>,
    x: i32,
    y: i32,
    size: f32,
    text: &str,
  ) {
    draw_text_mut(canvas, color, x, y, PxScale::from(size), self, text);
  }
}

impl LabelFont for FontRef<'_> {
  fn text_extent(&self, size: f32, text: &str) -> (u32, u32) {
    text_size(PxScale::from(size), self, text)
  }

  fn draw_label(
    &self,
    canvas: &mut RgbaImage,
    color: Rgba<u8>,
    x: i32,
    y: i32,
    size: f32,
    text: &str,
  ) {
    draw_text_mut(canvas, color, x, y, PxScale::from(size), self, text);
  }
}

/// 绘制样式
#[derive(Debug, Clone, PartialEq)]
pub struct DrawStyle {
  pub box_color: [u8; 4],
  pub text_color: [u8; 4],
  pub stroke_width: f32,
  pub base_font_size: f32,
}

impl Default for DrawStyle {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
      stroke_width: BOX_STROKE_WIDTH,
      base_font_size: BASE_FONT_SIZE,
    }
  }
}

/// 标签在框内的布局结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelLayout {
  pub font_size: f32,
  pub x: i32,
  pub y: i32,
  pub width: u32,
  pub height: u32,
}

impl LabelLayout {
  /// 文本区域是否与画布相交
  pub fn overlaps(&self, canvas_width: u32, canvas_height: u32) -> bool {
    let (x, y) = (i64::from(self.x), i64::from(self.y));
    x < i64::from(canvas_width)
      && y < i64::from(canvas_height)
      && x + i64::from(self.width) > 0
      && y + i64::from(self.height) > 0
  }
}

pub struct Draw<F> {
  font: F,
  style: DrawStyle,
}

impl<F: LabelFont> Draw<F> {
  pub fn new(font: F) -> Self {
    Self {
      font,
      style: DrawStyle::default(),
    }
  }

  pub fn with_style(mut self, style: DrawStyle) -> Self {
    self.style = style;
    self
  }

  pub fn style(&self) -> &DrawStyle {
    &self.style
  }

  /// 在原图的副本上绘制所有标注，原图不会被修改
  pub fn render(&self, image: &RgbaImage, annotations: &[Annotation]) -> RgbaImage {
    let mut canvas = image.clone();
    for annotation in annotations {
      self.draw_annotation(&mut canvas, annotation);
    }
    debug!("绘制了 {} 个标注", annotations.len());
    canvas
  }

  /// 字号只缩不放：文本超出框宽时缩小到恰好填满框宽
  pub fn layout_label(&self, annotation: &Annotation) -> LabelLayout {
    let bbox = &annotation.bbox;
    let base = self.style.base_font_size;
    let box_width = bbox.width();

    let (measured_width, _) = self.font.text_extent(base, &annotation.text);
    let mut font_size = base;
    if box_width > 0.0 {
      let scale = base * box_width / (measured_width as f32).max(MIN_TEXT_WIDTH);
      if scale < base {
        font_size = scale;
      }
    }

    let (width, height) = self.font.text_extent(font_size, &annotation.text);
    let margin = ((box_width - width as f32) / 2.0).max(0.0);

    // 文本基线位于 top + 文本高度，即左上角在 (left + margin, top)
    LabelLayout {
      font_size,
      x: (bbox.left() + margin).round() as i32,
      y: bbox.top().round() as i32,
      width,
      height,
    }
  }

  fn draw_annotation(&self, canvas: &mut RgbaImage, annotation: &Annotation) {
    self.draw_outline(canvas, annotation);

    let layout = self.layout_label(annotation);
    if !layout.overlaps(canvas.width(), canvas.height()) {
      return;
    }
    self.font.draw_label(
      canvas,
      Rgba(self.style.text_color),
      layout.x,
      layout.y,
      layout.font_size,
      &annotation.text,
    );
  }

  // 线宽取整后向内绘制多层一像素边框
  fn draw_outline(&self, canvas: &mut RgbaImage, annotation: &Annotation) {
    let bbox = &annotation.bbox;
    let (width, height) = canvas.dimensions();
    // 超过画布尺寸的层数不可见
    let max_rings = width.max(height).max(1) as f32;
    let rings = self.style.stroke_width.round().clamp(1.0, max_rings) as i32;
    // 坐标限制在画布外 rings 像素以内，画布内可见部分不变
    let left = clamp_to_canvas(bbox.left(), width, rings);
    let top = clamp_to_canvas(bbox.top(), height, rings);
    let right = clamp_to_canvas(bbox.right(), width, rings);
    let bottom = clamp_to_canvas(bbox.bottom(), height, rings);
    let color = Rgba(self.style.box_color);

    for thickness in 0..rings {
      let (x_min, y_min) = (left + thickness, top + thickness);
      let (x_max, y_max) = (right - thickness, bottom - thickness);
      if x_min > x_max || y_min > y_max {
        break;
      }
      // 像素包含两端，宽高至少为 1
      let rect = Rect::at(x_min, y_min)
        .of_size((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32);
      draw_hollow_rect_mut(canvas, rect, color);
    }
  }
}

fn clamp_to_canvas(value: f32, extent: u32, rings: i32) -> i32 {
  let min = -(rings as f32);
  let max = extent as f32 + rings as f32;
  value.round().clamp(min, max) as i32
}
