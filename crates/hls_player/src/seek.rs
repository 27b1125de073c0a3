//! 拖动定位协调
//!
//! 拖动过程中的高频预览只更新显示值，松手时才向输出端写入一次位置。
//! 分片流中每次真实的 seek 都可能触发重新缓冲。

/// 拖动会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SeekPhase {
    #[default]
    Idle,
    /// 会话进行中，忽略输出端的位置
    Scrubbing,
    /// 正在写入最终位置
    Committing,
}

/// 拖动定位状态机
#[derive(Debug, Clone, Default)]
pub struct SeekCoordinator {
    phase: SeekPhase,
    /// 将要提交的位置
    target: f64,
    /// 仅供界面显示的位置
    display: f64,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SeekPhase {
        self.phase
    }

    pub fn is_scrubbing(&self) -> bool {
        self.phase == SeekPhase::Scrubbing
    }

    /// 拖动中返回预览位置
    pub fn display_time(&self) -> Option<f64> {
        self.is_scrubbing().then_some(self.display)
    }

    /// 开始拖动；已在拖动中时不做任何改变
    pub fn begin(&mut self, position: f64) {
        if self.phase != SeekPhase::Idle {
            return;
        }
        self.phase = SeekPhase::Scrubbing;
        self.target = position;
        self.display = position;
    }

    /// 界面预览，同时作为提交值
    pub fn preview(&mut self, time: f64) {
        if !self.is_scrubbing() || !time.is_finite() {
            return;
        }
        self.target = time;
        self.display = time;
    }

    /// 记录提交值，不改变显示值
    pub fn update(&mut self, time: f64) {
        if !self.is_scrubbing() || !time.is_finite() {
            return;
        }
        self.target = time;
    }

    /// 结束拖动，返回需要写入输出端的位置
    ///
    /// 没有会话时返回 `None`；时长不可用时关闭会话但不写入。
    /// 返回 `Some` 后状态为 `Committing`，写入完成后调用 [`settle`](Self::settle)。
    pub fn commit(&mut self, duration: Option<f64>) -> Option<f64> {
        if !self.is_scrubbing() {
            return None;
        }

        match duration.filter(|d| d.is_finite() && *d > 0.0) {
            Some(duration) => {
                self.phase = SeekPhase::Committing;
                Some(self.target.clamp(0.0, duration))
            }
            None => {
                log::debug!("seek commit rejected: no usable duration");
                self.phase = SeekPhase::Idle;
                None
            }
        }
    }

    pub fn settle(&mut self) {
        if self.phase == SeekPhase::Committing {
            self.phase = SeekPhase::Idle;
        }
    }

    /// 放弃会话，不写入
    pub fn cancel(&mut self) {
        self.phase = SeekPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_preview_wins() {
        let mut seek = SeekCoordinator::new();
        seek.begin(1.0);
        seek.preview(5.0);
        seek.preview(9.0);

        assert_eq!(seek.display_time(), Some(9.0));
        assert_eq!(seek.commit(Some(60.0)), Some(9.0));
        assert_eq!(seek.phase(), SeekPhase::Committing);

        seek.settle();
        assert_eq!(seek.phase(), SeekPhase::Idle);
        assert_eq!(seek.display_time(), None);
    }

    #[test]
    fn test_begin_is_idempotent() {
        let mut seek = SeekCoordinator::new();
        seek.begin(3.0);
        seek.preview(20.0);
        seek.begin(4.0);

        assert_eq!(seek.commit(Some(60.0)), Some(20.0));
    }

    #[test]
    fn test_commit_without_session() {
        let mut seek = SeekCoordinator::new();
        assert_eq!(seek.commit(Some(60.0)), None);
        assert_eq!(seek.phase(), SeekPhase::Idle);
    }

    #[test]
    fn test_commit_without_duration_closes_session() {
        for duration in [None, Some(0.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let mut seek = SeekCoordinator::new();
            seek.begin(0.0);
            seek.update(10.0);
            assert_eq!(seek.commit(duration), None);
            assert_eq!(seek.phase(), SeekPhase::Idle);
        }
    }

    #[test]
    fn test_update_keeps_display() {
        let mut seek = SeekCoordinator::new();
        seek.begin(2.0);
        seek.update(7.0);

        assert_eq!(seek.display_time(), Some(2.0));
        assert_eq!(seek.commit(Some(30.0)), Some(7.0));
    }

    #[test]
    fn test_target_is_clamped() {
        let mut seek = SeekCoordinator::new();
        seek.begin(0.0);
        seek.preview(120.0);
        assert_eq!(seek.commit(Some(90.0)), Some(90.0));
        seek.settle();

        seek.begin(0.0);
        seek.preview(-4.0);
        assert_eq!(seek.commit(Some(90.0)), Some(0.0));
    }

    #[test]
    fn test_preview_outside_session_is_ignored() {
        let mut seek = SeekCoordinator::new();
        seek.preview(8.0);
        seek.update(8.0);
        assert_eq!(seek.phase(), SeekPhase::Idle);

        seek.begin(1.0);
        seek.preview(f64::NAN);
        assert_eq!(seek.display_time(), Some(1.0));
    }

    #[test]
    fn test_cancel() {
        let mut seek = SeekCoordinator::new();
        seek.begin(1.0);
        seek.preview(50.0);
        seek.cancel();

        assert_eq!(seek.commit(Some(60.0)), None);
    }
}
