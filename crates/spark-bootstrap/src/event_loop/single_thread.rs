//! 基于 Tokio current-thread 运行时的单线程事件循环。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 为引导层提供一个真实的“线程亲和”事件循环：所有任务都在同一条专用线程上按提交顺序执行；
//! - 复用 Tokio 的调度器而不是手写任务队列，任务内部可以安全地 `tokio::spawn` 后续工作。
//!
//! ## 逻辑（How）
//! - 构造时在调用线程上创建 current-thread 运行时，再移交给专用线程 `block_on` 一个接收循环；
//! - 提交通过无界 `mpsc` 通道完成；关闭时丢弃发送端，工作线程排空已排队任务后退出；
//! - 单个任务 panic 只记录告警，不终止事件循环。
//!
//! ## 契约（What）
//! - `in_event_loop`：比较当前线程与工作线程的 `ThreadId`；
//! - 关闭后提交的任务一律返回 [`RejectedTask`]。
//!
//! ## 风险提示（Trade-offs）
//! - 在工作线程上调用 [`SingleThreadEventLoop::shutdown`] 不会等待自身退出，只停止接收新任务。

use std::{
    borrow::Cow,
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    channel::{ChannelFuture, ChannelRef},
    event_loop::{EventLoop, EventLoopGroup, register_on},
    executor::{EventExecutor, RejectedTask, Task},
};

/// 单线程事件循环句柄；克隆得到同一循环的另一个句柄。
#[derive(Clone)]
pub struct SingleThreadEventLoop {
    shared: Arc<Shared>,
}

struct Shared {
    name: Cow<'static, str>,
    thread_id: ThreadId,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SingleThreadEventLoop {
    /// 启动一个以 `name` 命名工作线程的事件循环。
    pub fn spawn(name: impl Into<Cow<'static, str>>) -> io::Result<Self> {
        let name = name.into();
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let thread_name = name.to_string();
        let worker = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let label = thread_name.as_str();
                runtime.block_on(async move {
                    while let Some(task) = receiver.recv().await {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            warn!(event_loop = %label, "event loop task panicked");
                        }
                    }
                });
                debug!(event_loop = %thread_name, "event loop terminated");
            })?;
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                thread_id: worker.thread().id(),
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// 是否仍在接收任务。
    pub fn is_running(&self) -> bool {
        self.shared.sender.lock().is_some()
    }

    /// 停止接收新任务，排空已排队的任务后退出。
    ///
    /// 从循环外调用时阻塞等待工作线程结束。
    pub fn shutdown(&self) {
        if self.shared.sender.lock().take().is_none() {
            return;
        }
        debug!(event_loop = %self.shared.name, "shutting down event loop");
        if self.in_event_loop() {
            return;
        }
        let worker = self.shared.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(event_loop = %self.shared.name, "event loop thread panicked");
            }
        }
    }
}

impl EventExecutor for SingleThreadEventLoop {
    fn in_event_loop(&self) -> bool {
        thread::current().id() == self.shared.thread_id
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        match self.shared.sender.lock().as_ref() {
            Some(sender) => sender.send(task).map_err(|error| RejectedTask(error.0)),
            None => Err(RejectedTask(task)),
        }
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Owned(format!("SingleThreadEventLoop({})", self.shared.name))
    }
}

impl EventLoop for SingleThreadEventLoop {
    fn register(self: Arc<Self>, channel: ChannelRef) -> ChannelFuture {
        register_on(self, channel)
    }
}

impl EventLoopGroup for SingleThreadEventLoop {
    fn next(&self) -> Arc<dyn EventLoop> {
        Arc::new(self.clone())
    }

    fn describe(&self) -> Cow<'static, str> {
        EventExecutor::describe(self)
    }
}

impl std::fmt::Debug for SingleThreadEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleThreadEventLoop")
            .field("name", &self.shared.name)
            .field("running", &self.is_running())
            .finish()
    }
}
