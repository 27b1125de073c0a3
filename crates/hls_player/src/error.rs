//! 播放器错误与引擎错误映射

use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};

use crate::{EngineErrorData, EngineErrorKind};

/// 对外暴露的错误类别，固定五种
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NetworkError,
    MediaError,
    PlaybackError,
    FormatNotSupported,
    UnknownError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 5] = [
        Self::NetworkError,
        Self::MediaError,
        Self::PlaybackError,
        Self::FormatNotSupported,
        Self::UnknownError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::MediaError => "MEDIA_ERROR",
            Self::PlaybackError => "PLAYBACK_ERROR",
            Self::FormatNotSupported => "FORMAT_NOT_SUPPORTED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 播放器错误
///
/// `details` 仅用于诊断，控制器不会解析它。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code}: {message}")]
pub struct PlayerError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

const REASON_SUPERSEDED: &str = "superseded";
const REASON_DESTROYED: &str = "destroyed";

impl PlayerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 设备拒绝播放等情况
    pub fn playback(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PlaybackError, message)
    }

    /// 被后续的 `set_source` 取代
    pub fn superseded() -> Self {
        Self::new(ErrorCode::UnknownError, "Source load superseded by a newer source")
            .with_details(json!({ "reason": REASON_SUPERSEDED }))
    }

    /// 播放器已销毁
    pub fn destroyed() -> Self {
        Self::new(ErrorCode::UnknownError, "Player has been destroyed")
            .with_details(json!({ "reason": REASON_DESTROYED }))
    }

    pub fn is_superseded(&self) -> bool {
        self.reason() == Some(REASON_SUPERSEDED)
    }

    pub fn is_destroyed(&self) -> bool {
        self.reason() == Some(REASON_DESTROYED)
    }

    fn reason(&self) -> Option<&str> {
        self.details.as_ref()?.get("reason")?.as_str()
    }
}

/// 将引擎错误归类到固定的错误类别
pub fn map_engine_error(data: &EngineErrorData) -> PlayerError {
    let (code, message) = match data.kind {
        EngineErrorKind::Network => (ErrorCode::NetworkError, "Network error occurred"),
        EngineErrorKind::Media => (ErrorCode::MediaError, "Media error occurred"),
        EngineErrorKind::Mux => (ErrorCode::FormatNotSupported, "Format not supported"),
        EngineErrorKind::KeySystem | EngineErrorKind::Other | EngineErrorKind::Unrecognized(_) => {
            (ErrorCode::UnknownError, "An unknown error occurred")
        }
    };

    PlayerError::new(code, message).with_details(json!({
        "type": data.kind.as_tag(),
        "details": data.details,
        "fatal": data.fatal,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_kinds() {
        let cases = [
            ("networkError", ErrorCode::NetworkError),
            ("mediaError", ErrorCode::MediaError),
            ("muxError", ErrorCode::FormatNotSupported),
            ("keySystemError", ErrorCode::UnknownError),
            ("otherError", ErrorCode::UnknownError),
        ];

        for (tag, expected) in cases {
            let data = EngineErrorData::new(EngineErrorKind::from_tag(tag), "x", true);
            assert_eq!(map_engine_error(&data).code, expected, "tag {}", tag);
        }
    }

    #[test]
    fn test_unrecognized_kind_is_unknown() {
        let data = EngineErrorData::new(EngineErrorKind::from_tag("formatRejected"), "", false);
        let error = map_engine_error(&data);
        assert_eq!(error.code, ErrorCode::UnknownError);
        assert!(ErrorCode::ALL.contains(&error.code));
    }

    #[test]
    fn test_details_are_attached() {
        let data = EngineErrorData::new(EngineErrorKind::Network, "manifestLoadError", true);
        let error = map_engine_error(&data);
        let details = error.details.unwrap();
        assert_eq!(details["type"], "networkError");
        assert_eq!(details["details"], "manifestLoadError");
        assert_eq!(details["fatal"], true);
    }

    #[test]
    fn test_display_and_serialize() {
        let error = PlayerError::playback("NotAllowedError");
        assert_eq!(error.to_string(), "PLAYBACK_ERROR: NotAllowedError");

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "PLAYBACK_ERROR");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_reason_markers() {
        assert!(PlayerError::superseded().is_superseded());
        assert!(!PlayerError::superseded().is_destroyed());
        assert!(PlayerError::destroyed().is_destroyed());
        assert!(!PlayerError::playback("x").is_superseded());
    }
}
