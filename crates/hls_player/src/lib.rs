//! hls_player - HLS 音频播放控制器
//!
//! 位于解码引擎与音频输出端之间，维护统一的播放状态，
//! 负责换源、拖动定位、清晰度选择以及错误归类。

mod config;
mod engine;
mod error;
mod event;
mod player;
mod quality;
mod seek;
mod sink;
mod source;
mod track;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use event::*;
pub use player::*;
pub use quality::*;
pub use seek::*;
pub use sink::*;
pub use source::*;
pub use track::*;
