//! 执行器契约：提交任务、报告线程亲和性。
//!
//! # 设计目标（Why）
//! - 引导层只依赖执行子系统的最小能力：判断“当前是否位于该执行器线程”，以及“把任务排入该执行器”；
//! - 调度算法属于执行子系统内部细节，本模块不做任何假设。
//!
//! # 契约与约束（What）
//! - `execute` 接收 `'static + Send` 的一次性任务；执行器关闭后必须返回 [`RejectedTask`]，
//!   并把任务原样还给调用方，由调用方决定降级策略；
//! - `in_event_loop` 必须是无锁、无阻塞的快速判断。

use std::{any::type_name, borrow::Cow, fmt};

/// 一次性任务，执行器至多运行一次。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 执行器拒绝任务时返回的错误，携带被拒绝的任务。
pub struct RejectedTask(pub Task);

impl RejectedTask {
    /// 取回被拒绝的任务。
    pub fn into_task(self) -> Task {
        self.0
    }
}

impl fmt::Debug for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RejectedTask(..)")
    }
}

impl fmt::Display for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task rejected: executor is shutting down")
    }
}

impl std::error::Error for RejectedTask {}

/// `EventExecutor` 定义线程亲和的任务调度契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 通道注册完成后，所有影响其 Pipeline 与绑定状态的变更都必须在其所属执行器上执行；
///   `EventExecutor` 就是这条规则在类型层面的落点；
/// - 同一契约也被 [`Promise`](crate::future::Promise) 用于决定监听器在哪个线程被通知。
///
/// ## 契约（What）
/// - `in_event_loop`：当前线程是否就是该执行器的工作线程；
/// - `execute`：把任务排入队列，稍后在该执行器线程上运行；关闭后返回 `Err(RejectedTask)`；
/// - `describe`：诊断输出使用的名称，默认取类型名的最后一段。
///
/// ## 风险提示（Trade-offs）
/// - 即便调用方已经位于执行器线程，`execute` 也只排队而不内联；需要内联语义的调用方应先检查
///   `in_event_loop`；
/// - 内联执行器（见 [`ImmediateEventExecutor`]）会在调用栈上直接运行任务，深度嵌套时注意栈深。
pub trait EventExecutor: Send + Sync + 'static {
    /// 当前线程是否属于该执行器。
    fn in_event_loop(&self) -> bool;

    /// 提交任务。
    fn execute(&self, task: Task) -> Result<(), RejectedTask>;

    /// 诊断名称。
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

/// 在调用线程上立即运行任务的执行器。
///
/// 它永远报告 `in_event_loop() == true`，适合作为尚未分配事件循环时的兜底通知执行器，
/// 也适合测试中需要确定性同步行为的场景。
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateEventExecutor;

impl EventExecutor for ImmediateEventExecutor {
    fn in_event_loop(&self) -> bool {
        true
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        task();
        Ok(())
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
