//! 事件循环与事件循环组：通道注册的落点。
//!
//! # 设计目标（Why）
//! - 通道注册后只属于一个事件循环，之后的一切状态变更都在该循环的线程上发生；
//! - 事件循环组负责“选哪个循环”，注册的具体过程由 [`register_on`] 统一实现，保证所有循环语义一致。
//!
//! # 注册流程（How）
//! 1. 通道已注册：立即以 `RegistrationFailed` 失败；
//! 2. 调用方已在目标循环线程：内联执行注册；否则把注册作为任务提交；
//! 3. 提交被拒绝：强制关闭通道并以 `RegistrationFailed` 失败；
//! 4. 注册任务内调用 [`Channel::attach`]，通道在返回前触发 `channel_registered`，随后完成注册结果。

#[cfg(feature = "runtime-tokio")]
mod group;
mod immediate;
#[cfg(feature = "runtime-tokio")]
mod single_thread;

use std::{borrow::Cow, sync::Arc};

use tracing::{debug, warn};

#[cfg(feature = "runtime-tokio")]
pub use group::MultiThreadEventLoopGroup;
pub use immediate::ImmediateEventLoop;
#[cfg(feature = "runtime-tokio")]
pub use single_thread::SingleThreadEventLoop;

use crate::{
    channel::{Channel, ChannelFuture, ChannelPromise, ChannelRef},
    error::BootstrapError,
    executor::{EventExecutor, short_type_name},
};

/// 单线程事件循环：一个 [`EventExecutor`] 外加注册能力。
pub trait EventLoop: EventExecutor {
    /// 把通道注册到该循环；结果在注册完成后完成。
    fn register(self: Arc<Self>, channel: ChannelRef) -> ChannelFuture;
}

/// 事件循环组：为新通道挑选事件循环。
///
/// # 契约（What）
/// - `next`：返回下一个事件循环，挑选策略由实现决定；
/// - `register`：默认委托给 `next()` 选出的循环；测试替身可以覆写以注入失败或延迟；
/// - 实现必须可跨线程共享，多个引导器可以同时持有同一个组。
pub trait EventLoopGroup: Send + Sync + 'static {
    fn next(&self) -> Arc<dyn EventLoop>;

    fn register(&self, channel: ChannelRef) -> ChannelFuture {
        self.next().register(channel)
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

/// 所有事件循环共享的注册例程。
pub fn register_on(event_loop: Arc<dyn EventLoop>, channel: ChannelRef) -> ChannelFuture {
    let executor: Arc<dyn EventExecutor> = event_loop.clone();
    let promise = ChannelPromise::new(Arc::clone(&channel), executor);
    if channel.is_registered() {
        promise.set_failure(BootstrapError::registration(
            channel.id(),
            "registered to an event loop already",
        ));
        return promise.future();
    }

    if event_loop.in_event_loop() {
        register0(&event_loop, channel.as_ref(), &promise);
        return promise.future();
    }

    let task = {
        let event_loop = Arc::clone(&event_loop);
        let channel = Arc::clone(&channel);
        let promise = promise.clone();
        Box::new(move || register0(&event_loop, channel.as_ref(), &promise))
    };
    if event_loop.execute(task).is_err() {
        warn!(
            channel = %channel.id(),
            event_loop = %event_loop.describe(),
            "force-closing a channel whose registration task was rejected by the event loop"
        );
        channel.close_forcibly();
        promise.set_failure(BootstrapError::registration(
            channel.id(),
            "event loop rejected the registration task",
        ));
    }
    promise.future()
}

fn register0(event_loop: &Arc<dyn EventLoop>, channel: &dyn Channel, promise: &ChannelPromise) {
    if promise.is_done() || !channel.is_open() {
        promise.try_failure(BootstrapError::registration(
            channel.id(),
            "channel closed before registration",
        ));
        return;
    }
    match channel.attach(Arc::clone(event_loop)) {
        Ok(()) => {
            debug!(
                channel = %channel.id(),
                event_loop = %event_loop.describe(),
                "channel registered"
            );
            promise.try_success();
        }
        Err(error) => {
            channel.close_forcibly();
            promise.try_failure(error);
        }
    }
}
