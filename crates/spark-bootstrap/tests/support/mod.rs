//! 集成测试共用的测试替身。
//!
//! # 模块定位（Why）
//! - 编排层的顺序约束（先注册、后绑定）与失败路径需要可注入、可观测的事件循环组与通道工厂；
//! - 把这些替身集中在此处，避免每个测试文件重复拼装。
//!
//! # 使用说明（How）
//! - [`ManualEventLoop`]：只排队、由测试手动驱动的事件循环，用于复现“注册挂起”路径；
//! - [`RecordingGroup`]：记录注册调用次数，可选择同步失败或“注册后失败”；
//! - [`FixedFactory`]：总是返回预先构造的 [`EmbeddedChannel`]，测试可直接观察其事件日志；
//! - [`OrderLog`] + [`RecordingHandler`]：把 Handler 回调与绑定调用写入同一条时间线。
//!
//! # 风险提示（Trade-offs）
//! - 各测试二进制只使用其中一部分替身，因此模块整体允许 `dead_code`。

#![allow(dead_code)]

use std::{
    borrow::Cow,
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use spark_bootstrap::{
    BootstrapError, Channel, ChannelFactory, ChannelFuture, ChannelHandler, ChannelRef,
    EmbeddedChannel, EventExecutor, EventLoop, EventLoopGroup, ImmediateEventExecutor,
    ImmediateEventLoop, RejectedTask, Task, event_loop::register_on,
};

/// 共享的事件时间线。
#[derive(Clone, Default)]
pub struct OrderLog(Arc<Mutex<Vec<String>>>);

impl OrderLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|candidate| candidate == entry)
    }
}

/// 把生命周期回调写入 [`OrderLog`] 的 Handler。
pub struct RecordingHandler {
    log: OrderLog,
}

impl RecordingHandler {
    pub fn new(log: OrderLog) -> Arc<Self> {
        Arc::new(Self { log })
    }
}

impl ChannelHandler for RecordingHandler {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("recording")
    }

    fn handler_added(&self, _channel: &dyn Channel) {
        self.log.push("handler_added");
    }

    fn channel_registered(&self, _channel: &dyn Channel) {
        self.log.push("registered");
    }

    fn channel_active(&self, _channel: &dyn Channel) {
        self.log.push("active");
    }

    fn channel_inactive(&self, _channel: &dyn Channel) {
        self.log.push("inactive");
    }
}

/// 按调用顺序依次交出预先构造的通道，并记录调用次数。
pub struct FixedFactory {
    channels: Mutex<VecDeque<Arc<EmbeddedChannel>>>,
    calls: AtomicUsize,
}

impl FixedFactory {
    pub fn new(channels: impl IntoIterator<Item = Arc<EmbeddedChannel>>) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(channels.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn single(channel: &Arc<EmbeddedChannel>) -> Arc<Self> {
        Self::new([Arc::clone(channel)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChannelFactory for FixedFactory {
    fn new_channel(&self) -> Result<ChannelRef, BootstrapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.channels.lock().pop_front() {
            Some(channel) => Ok(channel),
            None => Err(BootstrapError::channel_creation(
                "FixedFactory",
                spark_bootstrap::Message::new("no prepared channel left"),
            )),
        }
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("FixedFactory")
    }
}

/// 总是失败、并记录调用次数的工厂。
#[derive(Default)]
pub struct FailingFactory {
    calls: AtomicUsize,
}

impl FailingFactory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChannelFactory for FailingFactory {
    fn new_channel(&self) -> Result<ChannelRef, BootstrapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BootstrapError::channel_creation(
            "FailingFactory",
            spark_bootstrap::Message::new("file descriptor limit reached"),
        ))
    }
}

/// 注册行为。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationMode {
    /// 委托给内联事件循环，正常注册。
    Delegate,
    /// 不触碰通道，同步返回失败。
    FailBeforeAttach,
    /// 先完成注册，再报告失败。
    FailAfterAttach,
}

/// 记录注册调用的事件循环组。
pub struct RecordingGroup {
    mode: RegistrationMode,
    registrations: AtomicUsize,
}

impl RecordingGroup {
    pub fn new(mode: RegistrationMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            registrations: AtomicUsize::new(0),
        })
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl EventLoopGroup for RecordingGroup {
    fn next(&self) -> Arc<dyn EventLoop> {
        Arc::new(ImmediateEventLoop)
    }

    fn register(&self, channel: ChannelRef) -> ChannelFuture {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            RegistrationMode::Delegate => register_on(self.next(), channel),
            RegistrationMode::FailBeforeAttach => {
                let cause =
                    BootstrapError::registration(channel.id(), "injected registration failure");
                ChannelFuture::failed(channel, Arc::new(ImmediateEventExecutor), cause)
            }
            RegistrationMode::FailAfterAttach => {
                let attached = channel.attach(self.next());
                assert!(attached.is_ok(), "替身注册应当成功");
                let cause = BootstrapError::registration(channel.id(), "injected late failure");
                ChannelFuture::failed(channel, Arc::new(ImmediateEventExecutor), cause)
            }
        }
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("RecordingGroup")
    }
}

/// 只排队、由测试手动驱动的事件循环。
///
/// `in_event_loop()` 仅在 [`ManualEventLoop::run_pending`] 执行任务期间为真，从而让注册从测试线程
/// 发起时必然走“提交任务”路径。
#[derive(Clone, Default)]
pub struct ManualEventLoop {
    inner: Arc<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    queue: Mutex<VecDeque<Task>>,
    draining: AtomicBool,
    shut_down: AtomicBool,
    submitted: AtomicUsize,
}

impl ManualEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// 运行队列直到为空（包括执行期间新提交的任务），返回执行的任务数。
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;
        loop {
            let next = self.inner.queue.lock().pop_front();
            let Some(task) = next else {
                return executed;
            };
            self.inner.draining.store(true, Ordering::SeqCst);
            task();
            self.inner.draining.store(false, Ordering::SeqCst);
            executed += 1;
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// 累计提交过的任务数。
    pub fn submitted(&self) -> usize {
        self.inner.submitted.load(Ordering::SeqCst)
    }

    /// 之后的提交全部被拒绝。
    pub fn shut_down(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
    }
}

impl EventExecutor for ManualEventLoop {
    fn in_event_loop(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(RejectedTask(task));
        }
        self.inner.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.queue.lock().push_back(task);
        Ok(())
    }
}

impl EventLoop for ManualEventLoop {
    fn register(self: Arc<Self>, channel: ChannelRef) -> ChannelFuture {
        register_on(self, channel)
    }
}

impl EventLoopGroup for ManualEventLoop {
    fn next(&self) -> Arc<dyn EventLoop> {
        Arc::new(self.clone())
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("ManualEventLoop")
    }
}
