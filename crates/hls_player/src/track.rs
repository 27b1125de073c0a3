//! 曲目与播放状态快照

use serde::Serialize;

use crate::{PlayerError, ReadyState};

/// 当前曲目
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: Option<String>,
    pub url: String,
    /// 总时长（秒），元数据到达前未知
    pub duration: Option<f64>,
    /// 当前位置（秒）
    pub current_time: f64,
}

impl Track {
    pub fn from_url(url: &str) -> Self {
        let title = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);

        Self {
            id: url.to_string(),
            title,
            url: url.to_string(),
            duration: None,
            current_time: 0.0,
        }
    }
}

/// 对外的播放状态快照，由内部状态投影而来
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub track: Option<Track>,
    pub current_time: f64,
    /// 仅在时长有限时给出
    pub duration: Option<f64>,
    pub volume: f64,
    pub loading: bool,
    pub error: Option<PlayerError>,
    pub ready_state: ReadyState,
    pub is_playing: bool,
    pub is_scrubbing: bool,
    /// 拖动中显示预览位置，否则等于 `current_time`
    pub display_time: f64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            track: None,
            current_time: 0.0,
            duration: None,
            volume: 1.0,
            loading: false,
            error: None,
            ready_state: ReadyState::HaveNothing,
            is_playing: false,
            is_scrubbing: false,
            display_time: 0.0,
        }
    }
}

/// `timeupdate` 事件的负载
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUpdate {
    pub current_time: f64,
    pub duration: Option<f64>,
}

/// 输出端报告的时长中，0 与 NaN 视为未知
pub(crate) fn usable_duration(duration: Option<f64>) -> Option<f64> {
    duration.filter(|d| !d.is_nan() && *d != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_from_url() {
        let track = Track::from_url("https://cdn.example.com/audio/show/master.m3u8?token=abc");
        assert_eq!(track.id, "https://cdn.example.com/audio/show/master.m3u8?token=abc");
        assert_eq!(track.title.as_deref(), Some("master.m3u8"));
        assert_eq!(track.duration, None);
        assert_eq!(track.current_time, 0.0);
    }

    #[test]
    fn test_track_without_segment() {
        assert_eq!(Track::from_url("https://cdn.example.com/").title, None);
        assert_eq!(Track::from_url("stream").title.as_deref(), Some("stream"));
    }

    #[test]
    fn test_usable_duration() {
        assert_eq!(usable_duration(None), None);
        assert_eq!(usable_duration(Some(0.0)), None);
        assert_eq!(usable_duration(Some(f64::NAN)), None);
        assert_eq!(usable_duration(Some(12.5)), Some(12.5));
        assert_eq!(usable_duration(Some(f64::INFINITY)), Some(f64::INFINITY));
    }
}
