//! 播放控制器
//!
//! 把引擎事件与输出端事件合并成一份播放状态，负责换源、
//! 播放控制、拖动定位与清晰度选择。所有回调都在调用方所在的
//! 单线程上下文中执行，派发事件时不持有内部状态的借用，
//! 事件处理函数可以再次调用控制器。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::source::LoadResult;
use crate::track::usable_duration;
use crate::{
    map_engine_error, merge_config, AudioSink, EngineEvent, EngineFactory, ErrorCode, EventBus,
    ListenerId, MediaEngine, PlayerConfig, PlayerError, PlayerEvent, PlayerEventKind,
    PlayerState, QualityCatalog, QualityLevel, QualityResolution, QualitySelector, ReadyState,
    SeekCoordinator, SeekPhase, SinkEvent, SourceLoad, SourceOptions, TimeUpdate, Track,
};

/// 播放控制器句柄
///
/// 克隆得到的句柄指向同一个播放器。
#[derive(Clone)]
pub struct HlsPlayer {
    shared: Rc<Shared>,
}

struct Shared {
    inner: RefCell<PlayerInner>,
    bus: EventBus,
    spawner: Rc<dyn LocalSpawn>,
    /// 内部状态被占用时收到的回调，调用返回后再处理
    deferred: RefCell<VecDeque<Deferred>>,
}

enum Deferred {
    Sink(SinkEvent),
    Engine(u64, EngineEvent),
}

struct PlayerInner {
    config: PlayerConfig,
    engines: Box<dyn EngineFactory>,
    engine: Option<Box<dyn MediaEngine>>,
    sink: Option<Box<dyn AudioSink>>,
    track: Option<Track>,
    quality: QualityCatalog,
    seek: SeekCoordinator,
    /// 尚未完成的 `set_source`
    pending: Option<oneshot::Sender<LoadResult>>,
    /// 每次换源或销毁递增，旧引擎的回调据此丢弃
    generation: u64,
    volume: f64,
    loading: bool,
    error: Option<PlayerError>,
    is_playing: bool,
    destroyed: bool,
}

impl HlsPlayer {
    /// 创建播放器
    ///
    /// `spawner` 用于执行不等待结果的 [`play`](Self::play)。
    pub fn new(
        config: PlayerConfig,
        sink: Box<dyn AudioSink>,
        engines: Box<dyn EngineFactory>,
        spawner: impl LocalSpawn + 'static,
    ) -> Self {
        let mut sink = sink;
        if let Some(volume) = config.audio.volume {
            if !volume.is_nan() {
                sink.set_volume(volume.clamp(0.0, 1.0));
            }
        }
        let volume = sink.volume();

        let shared = Rc::new(Shared {
            inner: RefCell::new(PlayerInner {
                config,
                engines,
                engine: None,
                sink: Some(sink),
                track: None,
                quality: QualityCatalog::default(),
                seek: SeekCoordinator::new(),
                pending: None,
                generation: 0,
                volume,
                loading: false,
                error: None,
                is_playing: false,
                destroyed: false,
            }),
            bus: EventBus::new(),
            spawner: Rc::new(spawner),
            deferred: RefCell::new(VecDeque::new()),
        });

        let weak = Rc::downgrade(&shared);
        if let Some(sink) = shared.inner.borrow_mut().sink.as_mut() {
            sink.subscribe(Rc::new(move |event| {
                if let Some(player) = Self::upgrade(&weak) {
                    player.handle_sink_event(event);
                }
            }));
        }

        Self { shared }
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    // ------------------------------------------------------------------
    // 订阅
    // ------------------------------------------------------------------

    pub fn on(&self, kind: PlayerEventKind, handler: impl Fn(&PlayerEvent) + 'static) -> ListenerId {
        self.shared.bus.on(kind, handler)
    }

    pub fn off(&self, kind: PlayerEventKind, id: ListenerId) -> bool {
        self.shared.bus.off(kind, id)
    }

    pub fn listener_count(&self, kind: PlayerEventKind) -> usize {
        self.shared.bus.listener_count(kind)
    }

    /// 处理同步回调期间被推迟的事件
    fn drain_deferred(&self) {
        loop {
            let next = self.shared.deferred.borrow_mut().pop_front();
            match next {
                Some(Deferred::Sink(event)) => self.handle_sink_event(event),
                Some(Deferred::Engine(generation, event)) => {
                    self.handle_engine_event(generation, event)
                }
                None => break,
            }
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.shared.inner.borrow().destroyed {
            return;
        }
        self.shared.bus.emit(&event);
    }

    // ------------------------------------------------------------------
    // 换源
    // ------------------------------------------------------------------

    /// 切换到新的源
    ///
    /// 同步完成旧引擎的销毁与新引擎的创建，返回的 future 在清单解析后
    /// 得到新曲目。再次调用会使之前尚未完成的 future 以 superseded 错误结束。
    /// 空的地址只通过返回的 future 报错，不会发出任何事件。
    pub fn set_source(&self, url: &str, options: Option<SourceOptions>) -> SourceLoad {
        if url.trim().is_empty() {
            return SourceLoad::rejected(PlayerError::new(
                ErrorCode::UnknownError,
                "Source locator is empty",
            ));
        }

        {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.destroyed {
                return SourceLoad::rejected(PlayerError::destroyed());
            }
            inner.loading = true;
            inner.error = None;
        }
        log::info!("loading source {}", url);
        self.emit(PlayerEvent::Loading);

        let result = {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.destroyed {
                return SourceLoad::rejected(PlayerError::destroyed());
            }
            inner.replace_engine(url, options.as_ref(), Rc::downgrade(&self.shared))
        };
        self.drain_deferred();

        match result {
            Ok(load) => load,
            Err(error) => {
                self.emit(PlayerEvent::Error(error.clone()));
                SourceLoad::rejected(error)
            }
        }
    }

    fn handle_engine_event(&self, generation: u64, event: EngineEvent) {
        let mut events = Vec::new();
        let mut auto_play = false;

        {
            let Ok(mut inner) = self.shared.inner.try_borrow_mut() else {
                self.defer(Deferred::Engine(generation, event));
                return;
            };
            if inner.destroyed || inner.generation != generation {
                log::debug!("dropping {:?} from a stale engine instance", event);
                return;
            }

            match event {
                EngineEvent::ManifestParsed => {
                    inner.rebuild_quality();
                    if let Some(tx) = inner.pending.take() {
                        let result = inner.refresh_track().ok_or_else(PlayerError::destroyed);
                        let _ = tx.send(result);
                        auto_play = inner.config.playback.auto_play;
                    }
                    events.push(PlayerEvent::PlaylistReady);
                }
                EngineEvent::LevelsUpdated => inner.rebuild_quality(),
                EngineEvent::LevelSwitched { level } => match inner.quality.get(level) {
                    Some(quality) => events.push(PlayerEvent::QualityChange(quality.clone())),
                    None => log::debug!("engine switched to unknown level {}", level),
                },
                EngineEvent::Error(data) => {
                    let error = map_engine_error(&data);
                    log::warn!("engine error: {} ({}, fatal: {})", error, data.details, data.fatal);
                    inner.error = Some(error.clone());
                    if data.fatal {
                        inner.loading = false;
                        if let Some(tx) = inner.pending.take() {
                            let _ = tx.send(Err(error.clone()));
                        }
                    }
                    events.push(PlayerEvent::Error(error));
                }
            }
        }

        for event in events {
            self.emit(event);
        }
        if auto_play {
            self.play();
        }
    }

    fn defer(&self, callback: Deferred) {
        self.shared.deferred.borrow_mut().push_back(callback);
    }

    fn handle_sink_event(&self, event: SinkEvent) {
        let relayed = {
            let Ok(mut inner) = self.shared.inner.try_borrow_mut() else {
                self.defer(Deferred::Sink(event));
                return;
            };
            if inner.destroyed {
                return;
            }

            match event {
                SinkEvent::Play => {
                    inner.is_playing = true;
                    PlayerEvent::Play
                }
                SinkEvent::Pause => {
                    inner.is_playing = false;
                    PlayerEvent::Pause
                }
                SinkEvent::Ended => {
                    inner.is_playing = false;
                    PlayerEvent::TrackEnd(inner.refresh_track())
                }
                SinkEvent::LoadedMetadata => PlayerEvent::LoadedMetadata(inner.refresh_track()),
                SinkEvent::TimeUpdate => {
                    let update = match inner.refresh_track() {
                        Some(track) => TimeUpdate {
                            current_time: track.current_time,
                            duration: track.duration,
                        },
                        None => inner.sink_time(),
                    };
                    PlayerEvent::TimeUpdate(update)
                }
                SinkEvent::CanPlay => {
                    inner.loading = false;
                    PlayerEvent::CanPlay
                }
            }
        };

        self.emit(relayed);
    }

    // ------------------------------------------------------------------
    // 播放控制
    // ------------------------------------------------------------------

    /// 请求播放，不等待结果
    ///
    /// 被拒绝时通过 `error` 事件报告 PLAYBACK_ERROR。
    pub fn play(&self) -> &Self {
        let player = self.clone();
        let spawned = self.shared.spawner.spawn_local(async move {
            let _ = player.play_async().await;
        });
        if let Err(e) = spawned {
            self.fail_playback(format!("Playback could not be scheduled: {}", e));
        }
        self
    }

    /// 请求播放并等待输出端接受或拒绝
    pub async fn play_async(&self) -> Result<(), PlayerError> {
        let request = {
            let mut inner = self.shared.inner.borrow_mut();
            match inner.sink.as_mut() {
                Some(sink) => sink.play(),
                None => return Err(PlayerError::destroyed()),
            }
        };
        self.drain_deferred();

        let result = request.await;
        self.drain_deferred();
        result.map_err(|e| self.fail_playback(e.to_string()))
    }

    fn fail_playback(&self, message: String) -> PlayerError {
        let error = PlayerError::playback(message);
        log::warn!("playback rejected: {}", error.message);
        {
            let mut inner = self.shared.inner.borrow_mut();
            if !inner.destroyed {
                inner.error = Some(error.clone());
            }
        }
        self.emit(PlayerEvent::Error(error.clone()));
        error
    }

    pub fn pause(&self) -> &Self {
        if let Some(sink) = self.shared.inner.borrow_mut().sink.as_mut() {
            sink.pause();
        }
        self.drain_deferred();
        self
    }

    /// 设置音量，超出范围的值被截断到 [0, 1]，NaN 被忽略
    pub fn set_volume(&self, volume: f64) -> &Self {
        if volume.is_nan() {
            log::debug!("ignoring NaN volume");
            return self;
        }
        let volume = volume.clamp(0.0, 1.0);

        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.volume = volume;
            if let Some(sink) = inner.sink.as_mut() {
                sink.set_volume(volume);
            }
        }
        self.drain_deferred();
        self
    }

    pub fn volume(&self) -> f64 {
        self.shared.inner.borrow().volume()
    }

    // ------------------------------------------------------------------
    // 拖动定位
    // ------------------------------------------------------------------

    /// 开始拖动，记录当前位置
    pub fn begin_seek(&self) {
        let mut inner = self.shared.inner.borrow_mut();
        let position = inner.sink.as_ref().map_or(0.0, |sink| sink.current_time());
        inner.seek.begin(position);
    }

    /// 拖动中的预览，不写入输出端
    pub fn preview_seek(&self, time: f64) {
        self.shared.inner.borrow_mut().seek.preview(time);
    }

    pub fn update_seek(&self, time: f64) {
        self.shared.inner.borrow_mut().seek.update(time);
    }

    /// 结束拖动并写入一次位置；没有会话或时长不可用时不写入
    pub fn commit_seek(&self) {
        {
            let mut inner = self.shared.inner.borrow_mut();
            let duration = inner
                .sink
                .as_ref()
                .and_then(|sink| usable_duration(sink.duration()));

            let Some(target) = inner.seek.commit(duration) else {
                return;
            };
            inner.write_position(target);
            inner.seek.settle();
        }
        self.drain_deferred();
    }

    pub fn cancel_seek(&self) {
        self.shared.inner.borrow_mut().seek.cancel();
    }

    /// 直接跳转，拖动会话进行中时忽略
    pub fn set_current_time(&self, time: f64) {
        if !time.is_finite() {
            return;
        }
        {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.seek.phase() != SeekPhase::Idle {
                log::debug!("ignoring direct seek while scrubbing");
                return;
            }
            inner.write_position(time.max(0.0));
        }
        self.drain_deferred();
    }

    // ------------------------------------------------------------------
    // 清晰度
    // ------------------------------------------------------------------

    pub fn get_quality_levels(&self) -> Vec<QualityLevel> {
        self.shared.inner.borrow().quality.levels().to_vec()
    }

    /// 选择清晰度
    ///
    /// 无法匹配的档位名或越界的下标不做任何改变。
    pub fn set_quality(&self, selector: impl Into<QualitySelector>) {
        let selector = selector.into();
        {
            let mut inner = self.shared.inner.borrow_mut();
            let resolution = inner.quality.resolve(&selector);

            let Some(engine) = inner.engine.as_mut() else {
                log::debug!("no engine; ignoring quality selector {:?}", selector);
                return;
            };
            match resolution {
                QualityResolution::Auto => engine.set_current_level(None),
                QualityResolution::Level(id) => engine.set_current_level(Some(id)),
                QualityResolution::Unresolved => {
                    log::debug!("quality selector {:?} matched no level", selector)
                }
            }
        }
        self.drain_deferred();
    }

    /// 引擎当前锁定的档位，自动模式下为 `None`
    pub fn current_quality(&self) -> Option<QualityLevel> {
        let inner = self.shared.inner.borrow();
        let id = inner.engine.as_ref()?.current_level()?;
        inner.quality.get(id).cloned()
    }

    // ------------------------------------------------------------------
    // 状态
    // ------------------------------------------------------------------

    /// 当前曲目，位置与时长取自输出端
    pub fn get_current_track(&self) -> Option<Track> {
        self.shared.inner.borrow_mut().refresh_track()
    }

    /// 状态快照，不修改任何内部状态
    pub fn get_state(&self) -> PlayerState {
        let inner = self.shared.inner.borrow();
        let track = inner.live_track();
        let current_time = track.as_ref().map_or(0.0, |t| t.current_time);
        let duration = track
            .as_ref()
            .and_then(|t| t.duration)
            .filter(|d| d.is_finite());

        PlayerState {
            current_time,
            duration,
            volume: inner.volume(),
            loading: inner.loading,
            error: inner.error.clone(),
            ready_state: inner.ready_state(),
            is_playing: inner.is_playing,
            is_scrubbing: inner.seek.is_scrubbing(),
            display_time: inner.seek.display_time().unwrap_or(current_time),
            track,
        }
    }

    pub fn loading(&self) -> bool {
        self.shared.inner.borrow().loading
    }

    pub fn error(&self) -> Option<PlayerError> {
        self.shared.inner.borrow().error.clone()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.inner.borrow().ready_state()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.inner.borrow().is_playing
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.inner.borrow().destroyed
    }

    // ------------------------------------------------------------------
    // 销毁
    // ------------------------------------------------------------------

    /// 销毁引擎、释放输出端并清空订阅
    ///
    /// 每一步单独处理失败，可重复调用。
    pub fn destroy(&self) {
        let pending = {
            let mut inner = self.shared.inner.borrow_mut();
            let first = !inner.destroyed;
            inner.destroyed = true;
            inner.generation += 1;

            inner.teardown_engine();
            if let Some(mut sink) = inner.sink.take() {
                if let Err(e) = sink.release() {
                    log::warn!("sink release failed: {}", e);
                }
            }

            inner.track = None;
            inner.quality = QualityCatalog::default();
            inner.seek.cancel();
            inner.loading = false;
            inner.error = None;
            inner.is_playing = false;

            if first {
                log::info!("player destroyed");
            }
            inner.pending.take()
        };

        if let Some(tx) = pending {
            let _ = tx.send(Err(PlayerError::destroyed()));
        }
        self.shared.deferred.borrow_mut().clear();
        self.shared.bus.clear();
    }
}

impl PlayerInner {
    fn replace_engine(
        &mut self,
        url: &str,
        options: Option<&SourceOptions>,
        player: Weak<Shared>,
    ) -> Result<SourceLoad, PlayerError> {
        if let Some(sink) = self.sink.as_mut() {
            if !sink.is_paused() {
                sink.pause();
            }
            sink.set_current_time(0.0);
        }
        self.seek.cancel();

        if let Some(tx) = self.pending.take() {
            log::debug!("superseding pending source load");
            let _ = tx.send(Err(PlayerError::superseded()));
        }
        self.teardown_engine();

        self.generation += 1;
        let generation = self.generation;
        self.quality = QualityCatalog::default();
        self.track = Some(Track::from_url(url));

        let config = merge_config(&self.config, options);
        let mut engine = match self.engines.create(&config) {
            Ok(engine) => engine,
            Err(e) => {
                let error = PlayerError::new(ErrorCode::MediaError, e.to_string());
                self.loading = false;
                self.error = Some(error.clone());
                return Err(error);
            }
        };

        engine.subscribe(Rc::new(move |event| {
            if let Some(player) = HlsPlayer::upgrade(&player) {
                player.handle_engine_event(generation, event);
            }
        }));
        if let Some(sink) = self.sink.as_mut() {
            engine.attach_media(&mut **sink);
        }
        engine.load_source(url);
        self.engine = Some(engine);

        let (tx, load) = SourceLoad::pending();
        self.pending = Some(tx);
        Ok(load)
    }

    fn teardown_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.destroy() {
                log::warn!("engine teardown failed: {}", e);
            }
        }
    }

    fn rebuild_quality(&mut self) {
        if let Some(engine) = self.engine.as_ref() {
            self.quality = QualityCatalog::from_engine_levels(&engine.levels());
        }
    }

    fn write_position(&mut self, time: f64) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_current_time(time);
        }
        if let Some(track) = self.track.as_mut() {
            track.current_time = time;
        }
    }

    /// 用输出端的位置与时长刷新曲目的副本
    fn live_track(&self) -> Option<Track> {
        let mut track = self.track.clone()?;
        if let Some(sink) = self.sink.as_ref() {
            track.current_time = sink.current_time();
            track.duration = usable_duration(sink.duration());
        }
        Some(track)
    }

    fn refresh_track(&mut self) -> Option<Track> {
        let track = self.live_track();
        if track.is_some() {
            self.track.clone_from(&track);
        }
        track
    }

    fn sink_time(&self) -> TimeUpdate {
        match self.sink.as_ref() {
            Some(sink) => TimeUpdate {
                current_time: sink.current_time(),
                duration: usable_duration(sink.duration()),
            },
            None => TimeUpdate {
                current_time: 0.0,
                duration: None,
            },
        }
    }

    fn volume(&self) -> f64 {
        self.sink.as_ref().map_or(self.volume, |sink| sink.volume())
    }

    fn ready_state(&self) -> ReadyState {
        self.sink
            .as_ref()
            .map_or(ReadyState::HaveNothing, |sink| sink.ready_state())
    }
}
