use std::sync::Arc;

use crate::{
    channel::{ChannelFuture, ChannelRef},
    event_loop::{EventLoop, EventLoopGroup, register_on},
    executor::{EventExecutor, RejectedTask, Task},
};

/// 在调用线程上同步完成一切的事件循环。
///
/// 注册、绑定与监听器通知都在调用栈上立即执行，`bind()` 返回时结果已经完成。
/// 它同时是只含自身的事件循环组，适合示例、单元测试与不需要 I/O 线程的嵌入式场景。
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateEventLoop;

impl EventExecutor for ImmediateEventLoop {
    fn in_event_loop(&self) -> bool {
        true
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        task();
        Ok(())
    }
}

impl EventLoop for ImmediateEventLoop {
    fn register(self: Arc<Self>, channel: ChannelRef) -> ChannelFuture {
        register_on(self, channel)
    }
}

impl EventLoopGroup for ImmediateEventLoop {
    fn next(&self) -> Arc<dyn EventLoop> {
        Arc::new(*self)
    }
}
