//! 一次写入、监听器通知的异步结果单元。
//!
//! # 设计目标（Why）
//! - 注册与绑定是两个独立完成的异步操作，编排层需要一个能够“先挂监听、后完成”的结果单元来串联它们；
//! - 监听器必须在结果所属资源（通道）的执行上下文中被调用，避免与该通道自身的事件分发产生竞争。
//!
//! # 契约与约束（What）
//! - 三态：`pending` → `succeeded(value)` | `failed(cause)`，完成后不可覆盖；
//! - [`Promise::add_listener`]：未完成时排队，完成时按注册顺序通知；
//! - 通知总在绑定执行器上进行：当前线程属于该执行器则内联，否则作为任务提交；
//! - 同一时刻最多一轮通知在进行，通知期间追加的监听器由这一轮接着执行，整体保持注册顺序；
//! - 同时实现 [`std::future::Future`]，`.await` 得到 `Result<T, BootstrapError>`；也可用 [`Promise::wait`] 阻塞等待。
//!
//! # 风险提示（Trade-offs & Gotchas）
//! - 执行器拒绝通知任务时（通常意味着事件循环已关闭）会退化为在完成线程上内联通知，保证监听器不丢失；
//! - 在执行器线程上调用 `wait` 等待由同一执行器完成的结果会自锁，调用方应改用监听器或 `.await`。

use std::{
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::{
    error::BootstrapError,
    executor::{EventExecutor, ImmediateEventExecutor},
};

/// 结果单元上的一次性监听器。
pub type Listener<T> = Box<dyn FnOnce(&Promise<T>) + Send + 'static>;

/// 可写、可共享的异步结果单元。克隆得到的是同一个单元的另一个句柄。
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    executor: Arc<dyn EventExecutor>,
    state: Mutex<State<T>>,
    completed: Condvar,
}

struct State<T> {
    outcome: Option<Result<T, BootstrapError>>,
    listeners: Vec<Listener<T>>,
    wakers: Vec<Waker>,
    dispatching: bool,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// 创建绑定到 `executor` 的未完成结果单元。
    pub fn new(executor: Arc<dyn EventExecutor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                state: Mutex::new(State {
                    outcome: None,
                    listeners: Vec::new(),
                    wakers: Vec::new(),
                    dispatching: false,
                }),
                completed: Condvar::new(),
            }),
        }
    }

    /// 创建不绑定任何事件循环的结果单元，通知总是在完成线程上内联执行。
    pub fn detached() -> Self {
        Self::new(Arc::new(ImmediateEventExecutor))
    }

    /// 创建已经成功的结果单元。
    pub fn succeeded(executor: Arc<dyn EventExecutor>, value: T) -> Self {
        let promise = Self::new(executor);
        promise.try_success(value);
        promise
    }

    /// 创建已经失败的结果单元。
    pub fn failed(executor: Arc<dyn EventExecutor>, cause: BootstrapError) -> Self {
        let promise = Self::new(executor);
        promise.try_failure(cause);
        promise
    }

    /// 负责通知监听器的执行器。
    pub fn executor(&self) -> &Arc<dyn EventExecutor> {
        &self.inner.executor
    }

    /// 尝试以成功完成；已完成时返回 `false` 且不覆盖原结果。
    pub fn try_success(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// 尝试以失败完成；已完成时返回 `false` 且不覆盖原结果。
    pub fn try_failure(&self, cause: BootstrapError) -> bool {
        self.complete(Err(cause))
    }

    /// 以成功完成；重复完成只记录诊断日志。
    pub fn set_success(&self, value: T) {
        if !self.try_success(value) {
            warn!(promise = ?self, "ignoring second completion of an already completed promise");
        }
    }

    /// 以失败完成；重复完成只记录诊断日志。
    pub fn set_failure(&self, cause: BootstrapError) {
        if !self.try_failure(cause.clone()) {
            warn!(
                promise = ?self,
                error = %cause,
                "ignoring failure of an already completed promise"
            );
        }
    }

    /// 是否已经完成（成功或失败）。
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// 是否已经成功完成。
    pub fn is_success(&self) -> bool {
        matches!(self.inner.state.lock().outcome, Some(Ok(_)))
    }

    /// 失败原因；未完成或成功时为 `None`。
    pub fn cause(&self) -> Option<BootstrapError> {
        match &self.inner.state.lock().outcome {
            Some(Err(cause)) => Some(cause.clone()),
            _ => None,
        }
    }

    /// 当前结果的快照；未完成时为 `None`。
    pub fn outcome(&self) -> Option<Result<T, BootstrapError>> {
        self.inner.state.lock().outcome.clone()
    }

    /// 注册监听器，恰好通知一次。
    ///
    /// - 未完成，或已有一轮通知在进行：排队，按注册顺序通知；
    /// - 已完成且当前线程属于绑定执行器：立即内联执行；
    /// - 已完成但位于其他线程：作为任务提交给绑定执行器。
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnOnce(&Promise<T>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.outcome.is_none() || state.dispatching {
            state.listeners.push(Box::new(listener));
            return;
        }
        state.dispatching = true;
        drop(state);
        self.dispatch(vec![Box::new(listener)]);
    }

    /// 阻塞当前线程直到完成。
    pub fn wait(&self) -> Result<T, BootstrapError> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.inner.completed.wait(&mut state);
        }
    }

    /// 在超时前阻塞等待；超时返回 `None`。
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, BootstrapError>> {
        let mut state = self.inner.state.lock();
        if state.outcome.is_none() {
            let _ = self
                .inner
                .completed
                .wait_while_for(&mut state, |state| state.outcome.is_none(), timeout);
        }
        state.outcome.clone()
    }

    fn complete(&self, outcome: Result<T, BootstrapError>) -> bool {
        let (listeners, wakers) = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            let listeners = mem::take(&mut state.listeners);
            state.dispatching = !listeners.is_empty();
            (listeners, mem::take(&mut state.wakers))
        };
        self.inner.completed.notify_all();
        for waker in wakers {
            waker.wake();
        }
        if !listeners.is_empty() {
            self.dispatch(listeners);
        }
        true
    }

    /// 调用方必须已经把 `dispatching` 置位。
    fn dispatch(&self, listeners: Vec<Listener<T>>) {
        if self.inner.executor.in_event_loop() {
            self.run_listeners(listeners);
            return;
        }
        let promise = self.clone();
        let task = Box::new(move || promise.run_listeners(listeners));
        if let Err(rejected) = self.inner.executor.execute(task) {
            warn!(
                executor = %self.inner.executor.describe(),
                "failed to submit listener notification task, notifying inline"
            );
            (rejected.into_task())();
        }
    }

    /// 执行一批监听器，并接着执行期间新追加的监听器，直到队列为空。
    fn run_listeners(&self, mut batch: Vec<Listener<T>>) {
        loop {
            for listener in batch {
                listener(self);
            }
            let mut state = self.inner.state.lock();
            if state.listeners.is_empty() {
                state.dispatching = false;
                return;
            }
            batch = mem::take(&mut state.listeners);
        }
    }
}

impl<T> Future for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, BootstrapError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner.state.lock().outcome {
            None => "pending",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Promise")
            .field("state", &state)
            .field("executor", &self.inner.executor.describe())
            .finish()
    }
}
