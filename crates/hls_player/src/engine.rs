//! 解码引擎接口
//!
//! 引擎负责拉取并解析分段清单、下载分片、切换清晰度。
//! 控制器只通过这里的 trait 与它交互。

use std::rc::Rc;

use crate::{AudioSink, EngineConfig};

/// 引擎错误类型标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    Network,
    Media,
    KeySystem,
    Mux,
    Other,
    /// 未知的引擎标签，原样保留
    Unrecognized(String),
}

impl EngineErrorKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "networkError" => Self::Network,
            "mediaError" => Self::Media,
            "keySystemError" => Self::KeySystem,
            "muxError" => Self::Mux,
            "otherError" => Self::Other,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Network => "networkError",
            Self::Media => "mediaError",
            Self::KeySystem => "keySystemError",
            Self::Mux => "muxError",
            Self::Other => "otherError",
            Self::Unrecognized(tag) => tag,
        }
    }
}

/// 引擎上报的错误
#[derive(Debug, Clone, PartialEq)]
pub struct EngineErrorData {
    pub kind: EngineErrorKind,
    /// 引擎内部的细分原因，例如 `manifestLoadError`
    pub details: String,
    pub fatal: bool,
}

impl EngineErrorData {
    pub fn new(kind: EngineErrorKind, details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind,
            details: details.into(),
            fatal,
        }
    }
}

/// 引擎当前的一个清晰度档位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLevel {
    /// 码率 (bits/sec)
    pub bitrate: u64,
    pub audio_codec: Option<String>,
}

impl EngineLevel {
    pub fn new(bitrate: u64) -> Self {
        Self {
            bitrate,
            audio_codec: None,
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = Some(codec.into());
        self
    }
}

/// 引擎事件（引擎 -> 控制器）
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// 清单解析完成，档位列表可读
    ManifestParsed,
    /// 档位列表发生变化
    LevelsUpdated,
    /// 已切换到指定档位
    LevelSwitched { level: usize },
    /// 错误（致命或可恢复）
    Error(EngineErrorData),
}

/// 引擎事件回调
pub type EngineListener = Rc<dyn Fn(EngineEvent)>;

/// 引擎自身的故障
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Engine construction failed: {0}")]
    Create(String),

    #[error("Engine teardown failed: {0}")]
    Destroy(String),
}

/// 解码引擎实例
///
/// 在 `load_source` 等方法内部同步派发的事件，由控制器推迟到调用返回后处理。
/// `destroy` 之后不得再调用任何已注册的回调。
pub trait MediaEngine {
    /// 注册事件回调
    fn subscribe(&mut self, listener: EngineListener);

    /// 绑定到输出端
    fn attach_media(&mut self, sink: &mut dyn AudioSink);

    /// 开始加载清单
    fn load_source(&mut self, url: &str);

    /// 当前档位列表
    fn levels(&self) -> Vec<EngineLevel>;

    /// 锁定档位，`None` 表示交给引擎自动选择
    fn set_current_level(&mut self, level: Option<usize>);

    fn current_level(&self) -> Option<usize>;

    /// 销毁实例并移除所有回调
    fn destroy(&mut self) -> Result<(), EngineError>;
}

/// 按配置创建引擎实例
pub trait EngineFactory {
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn MediaEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tag_parsing() {
        assert_eq!(EngineErrorKind::from_tag("networkError"), EngineErrorKind::Network);
        assert_eq!(EngineErrorKind::from_tag("muxError"), EngineErrorKind::Mux);
        assert_eq!(
            EngineErrorKind::from_tag("somethingNew"),
            EngineErrorKind::Unrecognized("somethingNew".to_string())
        );
        assert_eq!(EngineErrorKind::from_tag("somethingNew").as_tag(), "somethingNew");
    }
}
