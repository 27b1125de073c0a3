//! 换源结果

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::{PlayerError, Track};

pub(crate) type LoadResult = Result<Track, PlayerError>;

/// `set_source` 返回的 future
///
/// 清单解析完成时得到新曲目；加载失败、被新的 `set_source` 取代
/// 或播放器被销毁时得到错误。
#[must_use = "the source keeps loading, but its outcome is only observable by awaiting"]
#[derive(Debug)]
pub struct SourceLoad {
    rx: oneshot::Receiver<LoadResult>,
}

impl SourceLoad {
    pub(crate) fn pending() -> (oneshot::Sender<LoadResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub(crate) fn rejected(error: PlayerError) -> Self {
        let (tx, load) = Self::pending();
        let _ = tx.send(Err(error));
        load
    }
}

impl Future for SourceLoad {
    type Output = LoadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // 发送端未回复就被丢弃，只会发生在播放器整体释放时
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(PlayerError::destroyed())),
            Poll::Pending => Poll::Pending,
        }
    }
}
