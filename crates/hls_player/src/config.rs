//! 播放器配置与引擎配置合并

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 配置错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// 网络配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub headers: BTreeMap<String, String>,
    /// 请求超时（毫秒）
    pub timeout: Option<u64>,
    pub retry_count: Option<u32>,
}

/// 音频配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioConfig {
    pub crossfade: bool,
    pub normalization: bool,
    pub preload: bool,
    /// 初始音量 (0.0 - 1.0)
    pub volume: Option<f64>,
}

/// 播放行为配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackConfig {
    pub auto_play: bool,
    /// 起播位置（秒）
    pub start_time: Option<f64>,
}

/// 播放器配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
}

impl PlayerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// 单次 `set_source` 的附加选项
///
/// 未识别的字段保存在 `extra` 中，原样交给引擎。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOptions {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceOptions {
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

/// 引擎缓冲与延迟参数
///
/// 这些值是固定策略，不开放给调用方配置。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineTuning {
    pub enable_worker: bool,
    pub low_latency_mode: bool,
    /// 秒
    pub back_buffer_length: f64,
    /// 秒
    pub max_max_buffer_length: f64,
    /// 字节
    pub max_buffer_size: u64,
    /// 秒
    pub max_buffer_hole: f64,
    /// 秒
    pub max_frag_lookup_tolerance: f64,
}

impl EngineTuning {
    pub const POLICY: EngineTuning = EngineTuning {
        enable_worker: true,
        low_latency_mode: true,
        back_buffer_length: 90.0,
        max_max_buffer_length: 30.0,
        max_buffer_size: 60 * 1000 * 1000,
        max_buffer_hole: 0.5,
        max_frag_lookup_tolerance: 0.25,
    };
}

/// 交给引擎的最终配置
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// 每个请求都会带上的请求头
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<u64>,
    pub retry_count: Option<u32>,
    pub audio: AudioConfig,
    /// 起播位置（秒）
    pub start_position: Option<f64>,
    pub tuning: EngineTuning,
    pub extra: Map<String, Value>,
}

/// 合并基础配置与单次选项
///
/// 单次选项中的请求头覆盖同名的基础请求头，其余基础字段原样保留。
pub fn merge_config(base: &PlayerConfig, options: Option<&SourceOptions>) -> EngineConfig {
    let mut headers = base.network.headers.clone();
    let mut start_position = base.playback.start_time;
    let mut extra = Map::new();

    if let Some(options) = options {
        headers.extend(options.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        if options.start_time.is_some() {
            start_position = options.start_time;
        }
        extra = options.extra.clone();
    }

    EngineConfig {
        headers,
        timeout: base.network.timeout,
        retry_count: base.network.retry_count,
        audio: base.audio.clone(),
        start_position,
        tuning: EngineTuning::POLICY,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PlayerConfig {
        let mut config = PlayerConfig::default();
        config.network.headers.insert("Authorization".into(), "Bearer base".into());
        config.network.headers.insert("X-Client".into(), "hls".into());
        config.network.timeout = Some(10_000);
        config.network.retry_count = Some(3);
        config.playback.start_time = Some(5.0);
        config
    }

    #[test]
    fn test_override_headers_win() {
        let base = base();
        let options = SourceOptions::default()
            .with_header("Authorization", "Bearer call")
            .with_header("X-Trace", "1");

        let merged = merge_config(&base, Some(&options));

        assert_eq!(merged.headers["Authorization"], "Bearer call");
        assert_eq!(merged.headers["X-Client"], "hls");
        assert_eq!(merged.headers["X-Trace"], "1");
        assert_eq!(merged.timeout, Some(10_000));
        assert_eq!(merged.retry_count, Some(3));
    }

    #[test]
    fn test_inputs_untouched() {
        let base = base();
        let snapshot = base.clone();
        let options = SourceOptions::default().with_header("Authorization", "other");
        let options_snapshot = options.clone();

        let _ = merge_config(&base, Some(&options));

        assert_eq!(base, snapshot);
        assert_eq!(options, options_snapshot);
    }

    #[test]
    fn test_start_time_precedence() {
        let base = base();
        assert_eq!(merge_config(&base, None).start_position, Some(5.0));

        let options = SourceOptions::default().with_start_time(42.0);
        assert_eq!(merge_config(&base, Some(&options)).start_position, Some(42.0));
    }

    #[test]
    fn test_tuning_is_fixed() {
        let merged = merge_config(&PlayerConfig::default(), None);
        assert_eq!(merged.tuning, EngineTuning::POLICY);
        assert!(merged.tuning.low_latency_mode);
        assert_eq!(merged.tuning.max_buffer_size, 60_000_000);
    }

    #[test]
    fn test_parse_config_json() {
        let config = PlayerConfig::from_json_str(
            r#"{
                "network": { "headers": { "X-Key": "abc" }, "timeout": 5000, "retryCount": 2 },
                "audio": { "volume": 0.5 },
                "playback": { "autoPlay": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.network.headers["X-Key"], "abc");
        assert_eq!(config.network.retry_count, Some(2));
        assert_eq!(config.audio.volume, Some(0.5));
        assert!(config.playback.auto_play);
        assert_eq!(config.playback.start_time, None);
    }

    #[test]
    fn test_source_options_keep_extra_fields() {
        let options: SourceOptions = serde_json::from_str(
            r#"{ "headers": { "A": "1" }, "startTime": 3.5, "lowLatency": false }"#,
        )
        .unwrap();

        assert_eq!(options.start_time, Some(3.5));
        assert_eq!(options.extra["lowLatency"], false);

        let merged = merge_config(&PlayerConfig::default(), Some(&options));
        assert_eq!(merged.extra["lowLatency"], false);
        assert_eq!(merged.headers["A"], "1");
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            PlayerConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
