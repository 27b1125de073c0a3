//! 音频输出端接口

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::Serialize;

/// 输出端就绪程度
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(into = "u8")]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl From<ReadyState> for u8 {
    fn from(state: ReadyState) -> Self {
        state as u8
    }
}

/// 输出端事件（输出端 -> 控制器）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Play,
    Pause,
    Ended,
    LoadedMetadata,
    TimeUpdate,
    CanPlay,
}

/// 输出端事件回调
pub type SinkListener = Rc<dyn Fn(SinkEvent)>;

/// 输出端错误
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// 设备策略拒绝开始播放
    #[error("{0}")]
    PlayRejected(String),

    #[error("Sink release failed: {0}")]
    Release(String),
}

/// 一次播放请求的结果
pub type PlayRequest = LocalBoxFuture<'static, Result<(), SinkError>>;

/// 音频输出端
///
/// 事件可以在触发它的调用内部同步派发，控制器会推迟到调用返回后处理。
pub trait AudioSink {
    fn subscribe(&mut self, listener: SinkListener);

    /// 请求播放；返回的 future 在设备接受或拒绝后完成
    fn play(&mut self) -> PlayRequest;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64);

    /// 当前位置（秒）
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, time: f64);

    /// 总时长（秒），未知时为 `None`
    fn duration(&self) -> Option<f64>;

    fn ready_state(&self) -> ReadyState;

    /// 解绑并释放设备
    fn release(&mut self) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_ordinal() {
        assert!(ReadyState::HaveEnoughData > ReadyState::HaveMetadata);
        assert_eq!(ReadyState::default(), ReadyState::HaveNothing);
        assert_eq!(u8::from(ReadyState::HaveFutureData), 3);
        assert_eq!(serde_json::to_string(&ReadyState::HaveMetadata).unwrap(), "1");
    }
}
