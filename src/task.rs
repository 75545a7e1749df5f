// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/task.rs - 任务编排：输入、检测、标注、输出
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

use std::{sync::Arc, time::Duration};

use image::RgbaImage;
use tracing::{error, info};

use crate::{
  detect::{CancelToken, DetectionWorker},
  model::{DetectResult, Detector, DetectorConfig, log_detections},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 读取一帧图像，检测一次并输出标注结果
#[derive(Debug, Default)]
pub struct OneShotTask {
  config: DetectorConfig,
  timeout: Option<Duration>,
  cancel: CancelToken,
}

impl OneShotTask {
  pub fn new(config: DetectorConfig) -> Self {
    Self {
      config,
      ..Self::default()
    }
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }
}

impl<
  ME: std::fmt::Display,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaImage>,
  M: Detector<Error = ME> + Send + 'static,
  O: Render<RgbaImage, DetectResult, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    self.config.validate()?;
    let frame = Arc::new(input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?);
    info!("输入帧获取成功，开始检测...");

    let worker = DetectionWorker::spawn(model)?;
    let now = std::time::Instant::now();
    let handle = worker.submit_with_cancel(frame.clone(), self.config.clone(), self.cancel.clone());
    let reply = match self.timeout {
      Some(timeout) => handle.wait_timeout(timeout),
      None => handle.wait(),
    };
    let result = reply.inspect_err(|e| error!("检测未完成，不输出标注: {}", e))?;
    info!("检测完成，耗时: {:.2?}", now.elapsed());

    log_detections(&result);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::DetectError;
  use crate::model::{BoundingBox, DetectedObject, Label};
  use std::sync::Mutex;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("never")]
  struct NeverError;

  /// 记录每次渲染收到的检测结果
  #[derive(Default, Clone)]
  struct CapturingOutput {
    results: Arc<Mutex<Vec<(u32, u32, DetectResult)>>>,
  }

  impl Render<RgbaImage, DetectResult> for CapturingOutput {
    type Error = NeverError;

    fn render_result(&self, frame: &RgbaImage, result: &DetectResult) -> Result<(), NeverError> {
      let (w, h) = frame.dimensions();
      self.results.lock().unwrap().push((w, h, result.clone()));
      Ok(())
    }
  }

  struct FixedDetector {
    result: Result<DetectResult, String>,
    delay: Duration,
  }

  impl Detector for FixedDetector {
    type Error = String;

    fn detect(&self, _image: &RgbaImage, _config: &DetectorConfig) -> Result<DetectResult, String> {
      std::thread::sleep(self.delay);
      self.result.clone()
    }

    fn name(&self) -> &str {
      "fixed"
    }
  }

  fn dog() -> DetectResult {
    DetectResult::from(vec![
      DetectedObject::new(BoundingBox::new(50.0, 50.0, 350.0, 250.0))
        .with_label(Label::new("dog", 0.91)),
    ])
  }

  fn input() -> std::vec::IntoIter<RgbaImage> {
    vec![RgbaImage::new(400, 300)].into_iter()
  }

  #[test]
  fn renders_detector_result() {
    let output = CapturingOutput::default();
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::ZERO,
    };
    OneShotTask::default()
      .run_task(input(), detector, output.clone())
      .unwrap();

    let results = output.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0], (400, 300, dog()));
  }

  #[test]
  fn detector_failure_skips_output() {
    let output = CapturingOutput::default();
    let detector = FixedDetector {
      result: Err("boom".to_string()),
      delay: Duration::ZERO,
    };
    let err = OneShotTask::default()
      .run_task(input(), detector, output.clone())
      .unwrap_err();

    assert_eq!(
      err.downcast_ref::<DetectError>(),
      Some(&DetectError::Detector("boom".to_string()))
    );
    assert!(output.results.lock().unwrap().is_empty());
  }

  #[test]
  fn timeout_skips_output() {
    let output = CapturingOutput::default();
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::from_millis(300),
    };
    let err = OneShotTask::default()
      .with_timeout(Some(Duration::from_millis(10)))
      .run_task(input(), detector, output.clone())
      .unwrap_err();

    assert!(matches!(
      err.downcast_ref::<DetectError>(),
      Some(DetectError::Timeout(_))
    ));
    assert!(output.results.lock().unwrap().is_empty());
  }

  #[test]
  fn timeout_returns_without_waiting_for_slow_detector() {
    let output = CapturingOutput::default();
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::from_secs(3),
    };
    let now = std::time::Instant::now();
    let result = OneShotTask::default()
      .with_timeout(Some(Duration::from_millis(50)))
      .run_task(input(), detector, output.clone());

    assert!(result.is_err());
    assert!(now.elapsed() < Duration::from_secs(1));
    assert!(output.results.lock().unwrap().is_empty());
  }

  #[test]
  fn cancel_during_detection_returns_promptly() {
    let output = CapturingOutput::default();
    let cancel = CancelToken::new();
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::from_secs(3),
    };
    let canceller = {
      let cancel = cancel.clone();
      std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
      })
    };

    let now = std::time::Instant::now();
    let err = OneShotTask::default()
      .with_cancel_token(cancel)
      .run_task(input(), detector, output.clone())
      .unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err.downcast_ref::<DetectError>(), Some(&DetectError::Cancelled));
    assert!(now.elapsed() < Duration::from_secs(1));
    assert!(output.results.lock().unwrap().is_empty());
  }

  #[test]
  fn cancelled_task_skips_output() {
    let output = CapturingOutput::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::ZERO,
    };
    let err = OneShotTask::default()
      .with_cancel_token(cancel)
      .run_task(input(), detector, output.clone())
      .unwrap_err();

    assert_eq!(err.downcast_ref::<DetectError>(), Some(&DetectError::Cancelled));
    assert!(output.results.lock().unwrap().is_empty());
  }

  #[test]
  fn missing_input_frame_is_an_error() {
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::ZERO,
    };
    let result = OneShotTask::default().run_task(
      std::iter::empty::<RgbaImage>(),
      detector,
      CapturingOutput::default(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn invalid_config_is_rejected() {
    let detector = FixedDetector {
      result: Ok(dog()),
      delay: Duration::ZERO,
    };
    let task = OneShotTask::new(DetectorConfig::default().with_confidence_threshold(2.0));
    assert!(task.run_task(input(), detector, CapturingOutput::default()).is_err());
  }

  #[cfg(feature = "model_replay")]
  #[test]
  fn replay_detector_end_to_end() {
    use crate::model::ReplayDetector;

    let detector = ReplayDetector::from_json(
      r#"{"objects": [{"bounding_box": [50, 50, 350, 250], "labels": [{"text": "dog", "confidence": 0.91}]}]}"#,
    )
    .unwrap();
    let output = CapturingOutput::default();
    OneShotTask::default()
      .run_task(input(), detector, output.clone())
      .unwrap();

    let results = output.results.lock().unwrap();
    assert_eq!(results[0].2, dog());
  }
}
