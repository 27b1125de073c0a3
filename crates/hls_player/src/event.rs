//! 播放器事件与订阅表

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::str::FromStr;

use crate::{PlayerError, QualityLevel, TimeUpdate, Track};

/// 事件名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerEventKind {
    Play,
    Pause,
    TrackEnd,
    Error,
    QualityChange,
    PlaylistReady,
    LoadedMetadata,
    TimeUpdate,
    Loading,
    CanPlay,
}

impl PlayerEventKind {
    pub const ALL: [PlayerEventKind; 10] = [
        Self::Play,
        Self::Pause,
        Self::TrackEnd,
        Self::Error,
        Self::QualityChange,
        Self::PlaylistReady,
        Self::LoadedMetadata,
        Self::TimeUpdate,
        Self::Loading,
        Self::CanPlay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::TrackEnd => "track-end",
            Self::Error => "error",
            Self::QualityChange => "quality-change",
            Self::PlaylistReady => "playlist-ready",
            Self::LoadedMetadata => "loadedmetadata",
            Self::TimeUpdate => "timeupdate",
            Self::Loading => "loading",
            Self::CanPlay => "canplay",
        }
    }
}

impl fmt::Display for PlayerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerEventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or(())
    }
}

/// 播放器事件（控制器 -> 订阅者）
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Play,
    Pause,
    /// 播放结束，附带结束时的曲目
    TrackEnd(Option<Track>),
    Error(PlayerError),
    QualityChange(QualityLevel),
    /// 清单解析完成
    PlaylistReady,
    LoadedMetadata(Option<Track>),
    TimeUpdate(TimeUpdate),
    /// 开始加载新的源
    Loading,
    CanPlay,
}

impl PlayerEvent {
    pub fn kind(&self) -> PlayerEventKind {
        match self {
            Self::Play => PlayerEventKind::Play,
            Self::Pause => PlayerEventKind::Pause,
            Self::TrackEnd(_) => PlayerEventKind::TrackEnd,
            Self::Error(_) => PlayerEventKind::Error,
            Self::QualityChange(_) => PlayerEventKind::QualityChange,
            Self::PlaylistReady => PlayerEventKind::PlaylistReady,
            Self::LoadedMetadata(_) => PlayerEventKind::LoadedMetadata,
            Self::TimeUpdate(_) => PlayerEventKind::TimeUpdate,
            Self::Loading => PlayerEventKind::Loading,
            Self::CanPlay => PlayerEventKind::CanPlay,
        }
    }
}

/// 订阅句柄，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Rc<dyn Fn(&PlayerEvent)>;

/// 每个播放器实例独享的订阅表
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<HashMap<PlayerEventKind, Vec<(ListenerId, Handler)>>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: PlayerEventKind, handler: impl Fn(&PlayerEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// 移除订阅，返回是否找到
    pub fn off(&self, kind: PlayerEventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(listener_id, _)| *listener_id != id);
        before != handlers.len()
    }

    /// 按注册顺序同步派发
    ///
    /// 派发前先复制订阅列表，处理函数内部可以自由订阅或取消订阅。
    /// 单个处理函数 panic 不影响其余处理函数。
    pub fn emit(&self, event: &PlayerEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = match self.listeners.borrow().get(&kind) {
            Some(handlers) => handlers.iter().map(|(_, h)| Rc::clone(h)).collect(),
            None => return,
        };

        for handler in handlers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
            if result.is_err() {
                log::warn!("listener for '{}' panicked; continuing fan-out", kind);
            }
        }
    }

    pub fn listener_count(&self, kind: PlayerEventKind) -> usize {
        self.listeners.borrow().get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().values().all(Vec::is_empty)
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
