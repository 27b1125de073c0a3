//! 内存模拟的引擎与输出端
//!
//! 供单元测试与命令行演示使用，全部由调用方手动驱动：
//! 输出端的事件先排队，调用 [`SimSink::flush`] 时才派发；
//! 引擎事件由 [`SimEngine`] 的驱动方法直接派发。
//! 两者都不会在借用内部状态时回调。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::{
    AudioSink, EngineConfig, EngineError, EngineErrorData, EngineErrorKind, EngineEvent,
    EngineFactory, EngineLevel, EngineListener, MediaEngine, PlayRequest, ReadyState, SinkError,
    SinkEvent, SinkListener,
};

// ----------------------------------------------------------------------
// 输出端
// ----------------------------------------------------------------------

struct SinkState {
    paused: bool,
    volume: f64,
    current_time: f64,
    duration: Option<f64>,
    ready_state: ReadyState,
    listener: Option<SinkListener>,
    queue: VecDeque<SinkEvent>,
    play_rejection: Option<String>,
    release_failure: Option<String>,
    position_writes: Vec<f64>,
    released: bool,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            paused: true,
            volume: 1.0,
            current_time: 0.0,
            duration: None,
            ready_state: ReadyState::HaveNothing,
            listener: None,
            queue: VecDeque::new(),
            play_rejection: None,
            release_failure: None,
            position_writes: Vec::new(),
            released: false,
        }
    }
}

/// 模拟输出端，克隆得到的句柄共享同一份状态
#[derive(Clone, Default)]
pub struct SimSink {
    state: Rc<RefCell<SinkState>>,
}

impl SimSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派发所有排队的事件，返回派发数量
    ///
    /// 回调中产生的新事件也会在本次调用中派发。
    pub fn flush(&self) -> usize {
        let mut count = 0;
        loop {
            let (listener, event) = {
                let mut state = self.state.borrow_mut();
                let Some(event) = state.queue.pop_front() else {
                    break;
                };
                (state.listener.clone(), event)
            };
            if let Some(listener) = listener {
                listener(event);
            }
            count += 1;
        }
        count
    }

    pub fn pending_events(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// 元数据就绪
    pub fn load_metadata(&self, duration: f64) {
        let mut state = self.state.borrow_mut();
        state.duration = Some(duration);
        state.ready_state = state.ready_state.max(ReadyState::HaveMetadata);
        state.queue.push_back(SinkEvent::LoadedMetadata);
    }

    /// 缓冲足够，可以播放
    pub fn make_playable(&self) {
        let mut state = self.state.borrow_mut();
        state.ready_state = ReadyState::HaveEnoughData;
        state.queue.push_back(SinkEvent::CanPlay);
    }

    pub fn set_duration(&self, duration: Option<f64>) {
        self.state.borrow_mut().duration = duration;
    }

    /// 播放中推进 `seconds` 秒，到达时长末尾时结束播放
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.borrow_mut();
        if state.paused {
            return;
        }

        let mut position = state.current_time + seconds.max(0.0);
        let ended = match state.duration.filter(|d| d.is_finite()) {
            Some(duration) if position >= duration => {
                position = duration;
                true
            }
            _ => false,
        };

        state.current_time = position;
        state.queue.push_back(SinkEvent::TimeUpdate);
        if ended {
            state.paused = true;
            state.queue.push_back(SinkEvent::Pause);
            state.queue.push_back(SinkEvent::Ended);
        }
    }

    /// 下一次播放请求被拒绝
    pub fn reject_next_play(&self, reason: impl Into<String>) {
        self.state.borrow_mut().play_rejection = Some(reason.into());
    }

    pub fn fail_release(&self, reason: impl Into<String>) {
        self.state.borrow_mut().release_failure = Some(reason.into());
    }

    /// 取出控制器写入过的播放位置
    pub fn take_position_writes(&self) -> Vec<f64> {
        std::mem::take(&mut self.state.borrow_mut().position_writes)
    }

    pub fn is_released(&self) -> bool {
        self.state.borrow().released
    }

    pub fn has_listener(&self) -> bool {
        self.state.borrow().listener.is_some()
    }
}

impl AudioSink for SimSink {
    fn subscribe(&mut self, listener: SinkListener) {
        self.state.borrow_mut().listener = Some(listener);
    }

    fn play(&mut self) -> PlayRequest {
        let state = Rc::clone(&self.state);
        Box::pin(async move {
            let mut state = state.borrow_mut();
            if let Some(reason) = state.play_rejection.take() {
                return Err(SinkError::PlayRejected(reason));
            }
            if state.released {
                return Err(SinkError::PlayRejected("sink released".to_string()));
            }
            if state.paused {
                state.paused = false;
                state.queue.push_back(SinkEvent::Play);
            }
            Ok(())
        })
    }

    fn pause(&mut self) {
        let mut state = self.state.borrow_mut();
        if !state.paused {
            state.paused = true;
            state.queue.push_back(SinkEvent::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.borrow_mut().volume = volume;
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().current_time
    }

    fn set_current_time(&mut self, time: f64) {
        let mut state = self.state.borrow_mut();
        state.current_time = time;
        state.position_writes.push(time);
        state.queue.push_back(SinkEvent::TimeUpdate);
    }

    fn duration(&self) -> Option<f64> {
        self.state.borrow().duration
    }

    fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready_state
    }

    fn release(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.borrow_mut();
        state.paused = true;
        state.listener = None;
        state.queue.clear();
        if let Some(reason) = state.release_failure.take() {
            return Err(SinkError::Release(reason));
        }
        state.released = true;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// 引擎
// ----------------------------------------------------------------------

struct EngineState {
    config: EngineConfig,
    levels: Vec<EngineLevel>,
    listeners: Vec<EngineListener>,
    attached: bool,
    source: Option<String>,
    current_level: Option<usize>,
    destroyed: bool,
    /// 销毁后仍保留回调，模拟不守约定的引擎
    leak_listeners: bool,
    destroy_failure: Option<String>,
}

/// 模拟引擎
#[derive(Clone)]
pub struct SimEngine {
    state: Rc<RefCell<EngineState>>,
}

impl SimEngine {
    pub fn new(config: EngineConfig, levels: Vec<EngineLevel>) -> Self {
        Self {
            state: Rc::new(RefCell::new(EngineState {
                config,
                levels,
                listeners: Vec::new(),
                attached: false,
                source: None,
                current_level: None,
                destroyed: false,
                leak_listeners: false,
                destroy_failure: None,
            })),
        }
    }

    fn dispatch(&self, event: EngineEvent) -> usize {
        let listeners = self.state.borrow().listeners.clone();
        for listener in &listeners {
            listener(event.clone());
        }
        listeners.len()
    }

    /// 清单解析完成，返回被调用的回调数量
    pub fn parse_manifest(&self) -> usize {
        self.dispatch(EngineEvent::ManifestParsed)
    }

    /// 替换档位列表并通知
    pub fn update_levels(&self, levels: Vec<EngineLevel>) -> usize {
        self.state.borrow_mut().levels = levels;
        self.dispatch(EngineEvent::LevelsUpdated)
    }

    pub fn switch_level(&self, level: usize) -> usize {
        self.state.borrow_mut().current_level = Some(level);
        self.dispatch(EngineEvent::LevelSwitched { level })
    }

    pub fn fail(&self, kind: EngineErrorKind, details: &str, fatal: bool) -> usize {
        self.dispatch(EngineEvent::Error(EngineErrorData::new(kind, details, fatal)))
    }

    pub fn fail_destroy(&self, reason: impl Into<String>) {
        self.state.borrow_mut().destroy_failure = Some(reason.into());
    }

    pub fn config(&self) -> EngineConfig {
        self.state.borrow().config.clone()
    }

    pub fn source(&self) -> Option<String> {
        self.state.borrow().source.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().attached
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn current_level(&self) -> Option<usize> {
        self.state.borrow().current_level
    }
}

impl MediaEngine for SimEngine {
    fn subscribe(&mut self, listener: EngineListener) {
        self.state.borrow_mut().listeners.push(listener);
    }

    fn attach_media(&mut self, _sink: &mut dyn AudioSink) {
        self.state.borrow_mut().attached = true;
    }

    fn load_source(&mut self, url: &str) {
        self.state.borrow_mut().source = Some(url.to_string());
    }

    fn levels(&self) -> Vec<EngineLevel> {
        self.state.borrow().levels.clone()
    }

    fn set_current_level(&mut self, level: Option<usize>) {
        self.state.borrow_mut().current_level = level;
    }

    fn current_level(&self) -> Option<usize> {
        self.state.borrow().current_level
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.destroyed = true;
        state.attached = false;
        if !state.leak_listeners {
            state.listeners.clear();
        }
        match state.destroy_failure.take() {
            Some(reason) => Err(EngineError::Destroy(reason)),
            None => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------
// 引擎工厂
// ----------------------------------------------------------------------

#[derive(Default)]
struct FactoryState {
    engines: Vec<SimEngine>,
    levels: Vec<EngineLevel>,
    create_failure: Option<String>,
    leak_listeners: bool,
}

/// 记录每一个创建出的 [`SimEngine`]
#[derive(Clone, Default)]
pub struct SimEngineFactory {
    state: Rc<RefCell<FactoryState>>,
}

impl SimEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建引擎的初始档位列表
    pub fn with_levels(self, levels: Vec<EngineLevel>) -> Self {
        self.state.borrow_mut().levels = levels;
        self
    }

    pub fn fail_next_create(&self, reason: impl Into<String>) {
        self.state.borrow_mut().create_failure = Some(reason.into());
    }

    /// 之后创建的引擎在销毁时不清理回调
    pub fn leak_listeners_on_destroy(&self) {
        self.state.borrow_mut().leak_listeners = true;
    }

    pub fn latest(&self) -> Option<SimEngine> {
        self.state.borrow().engines.last().cloned()
    }

    pub fn created(&self) -> usize {
        self.state.borrow().engines.len()
    }
}

impl EngineFactory for SimEngineFactory {
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn MediaEngine>, EngineError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.create_failure.take() {
            return Err(EngineError::Create(reason));
        }

        let engine = SimEngine::new(config.clone(), state.levels.clone());
        engine.state.borrow_mut().leak_listeners = state.leak_listeners;
        state.engines.push(engine.clone());
        Ok(Box::new(engine))
    }
}
