// 该文件是 Biankuang （边框标注） 项目的一部分。
// src/detect.rs - 异步检测：后台线程执行检测，请求/应答通道返回结果
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, RecvTimeoutError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{DetectResult, Detector, DetectorConfig};

// 等待结果时检查取消标志的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
  #[error("检测失败: {0}")]
  Detector(String),
  #[error("检测超时: {0:?}")]
  Timeout(Duration),
  #[error("检测已取消")]
  Cancelled,
  #[error("检测线程已退出")]
  WorkerGone,
}

/// 取消标志，可在线程间共享
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

type Reply = Result<DetectResult, DetectError>;

struct Request {
  index: u64,
  image: Arc<RgbaImage>,
  config: DetectorConfig,
  cancel: CancelToken,
  reply: mpsc::Sender<Reply>,
}

/// 一次检测请求的结果句柄，只能等待一次
pub struct DetectionHandle {
  receiver: mpsc::Receiver<Reply>,
  cancel: CancelToken,
}

impl DetectionHandle {
  fn resolved(reply: Reply, cancel: CancelToken) -> Self {
    let (tx, receiver) = mpsc::channel();
    let _ = tx.send(reply);
    Self { receiver, cancel }
  }

  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// 阻塞等待结果，直到完成或被取消
  pub fn wait(self) -> Reply {
    self.wait_until(None)
  }

  /// 超时后请求被标记为取消，尚未开始的请求不会再执行
  pub fn wait_timeout(self, timeout: Duration) -> Reply {
    self.wait_until(Some((Instant::now() + timeout, timeout)))
  }

  fn wait_until(self, deadline: Option<(Instant, Duration)>) -> Reply {
    loop {
      if self.cancel.is_cancelled() {
        return Err(DetectError::Cancelled);
      }

      let step = match deadline {
        Some((deadline, timeout)) => {
          let now = Instant::now();
          if now >= deadline {
            warn!("检测超时: {:?}", timeout);
            self.cancel.cancel();
            return Err(DetectError::Timeout(timeout));
          }
          (deadline - now).min(POLL_INTERVAL)
        }
        None => POLL_INTERVAL,
      };

      match self.receiver.recv_timeout(step) {
        Ok(reply) => return reply,
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => return Err(DetectError::WorkerGone),
      }
    }
  }
}

/// 在独立线程上持有检测器，按提交顺序逐个处理请求
pub struct DetectionWorker {
  sender: Option<mpsc::Sender<Request>>,
  thread: Option<JoinHandle<()>>,
  next_index: AtomicU64,
}

impl DetectionWorker {
  pub fn spawn<D>(detector: D) -> Result<Self, std::io::Error>
  where
    D: Detector + Send + 'static,
    D::Error: std::fmt::Display,
  {
    let (sender, receiver) = mpsc::channel::<Request>();
    let thread = thread::Builder::new()
      .name("detection-worker".to_string())
      .spawn(move || {
        info!("检测线程启动: {}", detector.name());
        for request in receiver {
          Self::serve(&detector, request);
        }
        info!("检测线程退出");
      })?;

    Ok(Self {
      sender: Some(sender),
      thread: Some(thread),
      next_index: AtomicU64::new(0),
    })
  }

  fn serve<D>(detector: &D, request: Request)
  where
    D: Detector,
    D::Error: std::fmt::Display,
  {
    if request.cancel.is_cancelled() {
      debug!("({})请求在执行前已取消", request.index);
      let _ = request.reply.send(Err(DetectError::Cancelled));
      return;
    }

    let now = Instant::now();
    let reply = detector
      .detect(&request.image, &request.config)
      .map_err(|e| DetectError::Detector(e.to_string()));
    let elapsed = now.elapsed();

    let reply = match reply {
      Ok(_) if request.cancel.is_cancelled() => {
        debug!("({})请求已取消，丢弃结果", request.index);
        Err(DetectError::Cancelled)
      }
      Ok(result) => {
        info!(
          "({})检测完成，{} 个目标，耗时: {:.2?}",
          request.index,
          result.len(),
          elapsed
        );
        Ok(result)
      }
      Err(e) => {
        error!("({})检测失败: {}", request.index, e);
        Err(e)
      }
    };
    // 调用方可能已放弃等待
    let _ = request.reply.send(reply);
  }

  pub fn submit(&self, image: Arc<RgbaImage>, config: DetectorConfig) -> DetectionHandle {
    self.submit_with_cancel(image, config, CancelToken::new())
  }

  pub fn submit_with_cancel(
    &self,
    image: Arc<RgbaImage>,
    config: DetectorConfig,
    cancel: CancelToken,
  ) -> DetectionHandle {
    let index = self.next_index.fetch_add(1, Ordering::Relaxed);

    let Some(sender) = self.sender.as_ref() else {
      return DetectionHandle::resolved(Err(DetectError::WorkerGone), cancel);
    };

    let (reply, receiver) = mpsc::channel();
    let request = Request {
      index,
      image,
      config,
      cancel: cancel.clone(),
      reply,
    };
    if sender.send(request).is_err() {
      error!("检测线程已退出，无法提交请求");
      return DetectionHandle::resolved(Err(DetectError::WorkerGone), cancel);
    }
    DetectionHandle { receiver, cancel }
  }
}

impl Drop for DetectionWorker {
  fn drop(&mut self) {
    // 关闭请求通道，线程处理完已排队的请求后自行退出
    self.sender.take();
    let Some(thread) = self.thread.take() else {
      return;
    };
    if !thread.is_finished() {
      // 超时或取消后检测可能仍在运行，不阻塞调用方
      debug!("检测线程仍在运行，不再等待其退出");
      return;
    }
    if thread.join().is_err() {
      error!("检测线程异常退出");
    }
  }
}
