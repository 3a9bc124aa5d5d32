//! 通道维度的异步结果：[`ChannelFuture`]（只读端）与 [`ChannelPromise`]（可写端）。
//!
//! # 设计目标（Why）
//! - 注册与绑定的结果都要携带“对应的通道”，即便操作失败，调用方仍需拿到通道做清理与诊断；
//! - 通知执行器随通道的生命周期变化：注册前使用兜底执行器，注册完成后自动切换到通道所属事件循环。
//!
//! # 契约（What）
//! - [`ChannelFuture::channel`] 永远可用；
//! - 监听器收到的是基于同一结果单元重建的 `ChannelFuture`，不会形成“结果单元持有自身”的引用环。

use std::{
    borrow::Cow,
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use crate::{
    channel::ChannelRef,
    error::BootstrapError,
    executor::{EventExecutor, RejectedTask, Task},
    future::Promise,
};

/// 跟随通道注册状态切换的通知执行器。
///
/// 通道分配到事件循环之后所有调用都转发给该事件循环，之前则转发给 `fallback`。
struct ChannelExecutor {
    channel: ChannelRef,
    fallback: Arc<dyn EventExecutor>,
}

impl ChannelExecutor {
    fn current(&self) -> Arc<dyn EventExecutor> {
        if let Some(event_loop) = self.channel.event_loop() {
            return event_loop;
        }
        Arc::clone(&self.fallback)
    }
}

impl EventExecutor for ChannelExecutor {
    fn in_event_loop(&self) -> bool {
        self.current().in_event_loop()
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        self.current().execute(task)
    }

    fn describe(&self) -> Cow<'static, str> {
        self.current().describe()
    }
}

/// 通道异步操作的只读结果。
#[derive(Clone)]
pub struct ChannelFuture {
    channel: ChannelRef,
    inner: Promise<()>,
}

impl ChannelFuture {
    /// 创建已经成功的结果。
    pub fn succeeded(channel: ChannelRef, fallback: Arc<dyn EventExecutor>) -> Self {
        let promise = ChannelPromise::new(channel, fallback);
        promise.try_success();
        promise.future()
    }

    /// 创建已经失败的结果。
    pub fn failed(
        channel: ChannelRef,
        fallback: Arc<dyn EventExecutor>,
        cause: BootstrapError,
    ) -> Self {
        let promise = ChannelPromise::new(channel, fallback);
        promise.try_failure(cause);
        promise.future()
    }

    /// 结果对应的通道；失败时同样可用。
    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    pub fn is_success(&self) -> bool {
        self.inner.is_success()
    }

    /// 失败原因；未完成或成功时为 `None`。
    pub fn cause(&self) -> Option<BootstrapError> {
        self.inner.cause()
    }

    /// 注册完成监听器，语义与 [`Promise::add_listener`] 相同。
    pub fn add_listener<L>(&self, listener: L)
    where
        L: ChannelFutureListener,
    {
        let channel = Arc::clone(&self.channel);
        let listener = Box::new(listener);
        self.inner.add_listener(move |promise| {
            let future = ChannelFuture {
                channel,
                inner: promise.clone(),
            };
            listener.operation_complete(&future);
        });
    }

    /// 阻塞等待完成，成功时返回通道。
    pub fn wait(&self) -> Result<ChannelRef, BootstrapError> {
        self.inner.wait().map(|()| Arc::clone(&self.channel))
    }

    /// 在超时前阻塞等待；超时返回 `None`。
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<ChannelRef, BootstrapError>> {
        self.inner
            .wait_timeout(timeout)
            .map(|outcome| outcome.map(|()| Arc::clone(&self.channel)))
    }
}

impl Future for ChannelFuture {
    type Output = Result<ChannelRef, BootstrapError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let channel = Arc::clone(&self.channel);
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|outcome| outcome.map(|()| channel))
    }
}

impl fmt::Debug for ChannelFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelFuture")
            .field("channel", &self.channel.id())
            .field("promise", &self.inner)
            .finish()
    }
}

/// 通道异步操作的可写端。
#[derive(Clone)]
pub struct ChannelPromise {
    channel: ChannelRef,
    inner: Promise<()>,
}

impl ChannelPromise {
    /// 创建未完成的结果单元。
    ///
    /// 通知执行器在通道注册前为 `fallback`，注册后为通道的事件循环。
    pub fn new(channel: ChannelRef, fallback: Arc<dyn EventExecutor>) -> Self {
        let executor = Arc::new(ChannelExecutor {
            channel: Arc::clone(&channel),
            fallback,
        });
        Self {
            channel,
            inner: Promise::new(executor),
        }
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// 只读视图。
    pub fn future(&self) -> ChannelFuture {
        ChannelFuture {
            channel: Arc::clone(&self.channel),
            inner: self.inner.clone(),
        }
    }

    pub fn try_success(&self) -> bool {
        self.inner.try_success(())
    }

    pub fn try_failure(&self, cause: BootstrapError) -> bool {
        self.inner.try_failure(cause)
    }

    pub fn set_success(&self) {
        self.inner.set_success(());
    }

    pub fn set_failure(&self, cause: BootstrapError) {
        self.inner.set_failure(cause);
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    pub fn add_listener<L>(&self, listener: L)
    where
        L: ChannelFutureListener,
    {
        self.future().add_listener(listener);
    }
}

impl fmt::Debug for ChannelPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPromise")
            .field("channel", &self.channel.id())
            .field("promise", &self.inner)
            .finish()
    }
}

/// [`ChannelFuture`] 的一次性监听器。
///
/// 闭包 `FnOnce(&ChannelFuture)` 自动实现该 trait；需要具名、可复用的监听逻辑时实现为结构体，
/// 例如 [`CloseOnFailure`]。
pub trait ChannelFutureListener: Send + 'static {
    fn operation_complete(self: Box<Self>, future: &ChannelFuture);
}

impl<F> ChannelFutureListener for F
where
    F: FnOnce(&ChannelFuture) + Send + 'static,
{
    fn operation_complete(self: Box<Self>, future: &ChannelFuture) {
        (*self)(future)
    }
}

/// 操作失败时优雅关闭通道。
#[derive(Clone, Copy, Debug, Default)]
pub struct CloseOnFailure;

impl ChannelFutureListener for CloseOnFailure {
    fn operation_complete(self: Box<Self>, future: &ChannelFuture) {
        if !future.is_success() {
            future.channel().close();
        }
    }
}
