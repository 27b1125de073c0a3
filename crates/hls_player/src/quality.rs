//! 清晰度档位目录

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::EngineLevel;

/// 低档上限 (bits/sec)
pub const LOW_MAX_BITRATE: u64 = 200_000;
/// 中档上限 (bits/sec)
pub const MEDIUM_MAX_BITRATE: u64 = 500_000;

/// 粗粒度档位名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityName {
    Low,
    Medium,
    High,
}

impl QualityName {
    pub fn for_bitrate(bitrate: u64) -> Self {
        if bitrate > MEDIUM_MAX_BITRATE {
            Self::High
        } else if bitrate > LOW_MAX_BITRATE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for QualityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(()),
        }
    }
}

/// 可选择的清晰度档位
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityLevel {
    /// 在引擎当前档位列表中的下标，换源后不保留
    pub id: usize,
    pub name: QualityName,
    pub bitrate: u64,
    pub audio_codec: Option<String>,
}

/// 清晰度选择方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualitySelector {
    /// 交给引擎自适应
    Auto,
    Level(usize),
    /// 按档位名选择第一个匹配的档位
    Name(String),
}

impl From<usize> for QualitySelector {
    fn from(id: usize) -> Self {
        Self::Level(id)
    }
}

/// 负数（如 -1）表示自动选择
impl From<i64> for QualitySelector {
    fn from(id: i64) -> Self {
        usize::try_from(id).map_or(Self::Auto, Self::Level)
    }
}

impl From<i32> for QualitySelector {
    fn from(id: i32) -> Self {
        Self::from(i64::from(id))
    }
}

impl From<QualityName> for QualitySelector {
    fn from(name: QualityName) -> Self {
        Self::Name(name.as_str().to_string())
    }
}

impl From<&str> for QualitySelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// 解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityResolution {
    Auto,
    Level(usize),
    /// 无法匹配，调用方应当忽略
    Unresolved,
}

/// 由引擎档位列表整体重建的目录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityCatalog {
    levels: Vec<QualityLevel>,
}

impl QualityCatalog {
    pub fn from_engine_levels(levels: &[EngineLevel]) -> Self {
        let levels = levels
            .iter()
            .enumerate()
            .map(|(id, level)| QualityLevel {
                id,
                name: QualityName::for_bitrate(level.bitrate),
                bitrate: level.bitrate,
                audio_codec: level.audio_codec.clone(),
            })
            .collect();

        Self { levels }
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    pub fn get(&self, id: usize) -> Option<&QualityLevel> {
        self.levels.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn resolve(&self, selector: &QualitySelector) -> QualityResolution {
        match selector {
            QualitySelector::Auto => QualityResolution::Auto,
            QualitySelector::Level(id) if *id < self.levels.len() => QualityResolution::Level(*id),
            QualitySelector::Level(_) => QualityResolution::Unresolved,
            QualitySelector::Name(name) => {
                let Ok(name) = name.parse::<QualityName>() else {
                    return QualityResolution::Unresolved;
                };
                self.levels
                    .iter()
                    .find(|level| level.name == name)
                    .map_or(QualityResolution::Unresolved, |level| {
                        QualityResolution::Level(level.id)
                    })
            }
        }
    }
}
