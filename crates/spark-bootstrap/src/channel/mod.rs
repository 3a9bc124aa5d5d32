//! 通道契约：引导层对“可寻址 I/O 端点”的全部认知。
//!
//! # 设计目标（Why）
//! - 编排层只需要少量生命周期操作：注册时挂接事件循环、绑定、关闭与强制关闭；
//!   初始化钩子额外需要写入选项、属性与顶层 Handler；
//! - 其余能力（读写、Pipeline 调度、编解码）属于具体传输实现，不在本契约内。
//!
//! # 生命周期（What）
//! `Created`（未注册）→ `Registered`（已分配事件循环）→ `Active`（已绑定/已连接）→ `Closed`。
//! - 注册前可以从任意线程调用 [`Channel::close_forcibly`]；
//! - 注册后对 Pipeline 与绑定状态的任何变更都必须在 [`Channel::event_loop`] 返回的事件循环上执行。

mod embedded;
mod failed;
mod future;

use std::{
    any::Any,
    borrow::Cow,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use embedded::{ChannelEvent, EmbeddedChannel};
pub use failed::FailedChannel;
pub use future::{ChannelFuture, ChannelFutureListener, ChannelPromise, CloseOnFailure};

use crate::{
    address::BindAddress,
    attribute::{AttributeKey, AttributeValue},
    error::BootstrapError,
    event_loop::EventLoop,
    executor::short_type_name,
    option::OptionValue,
};

/// 通道的共享句柄。
pub type ChannelRef = Arc<dyn Channel>;

/// 进程内唯一的通道标识，用于日志字段与错误上下文。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// 分配下一个标识。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// 挂在通道上的顶层处理阶段。
///
/// Pipeline 机制本身不属于引导层，这里只保留引导流程会触发的生命周期回调；
/// 所有回调都在通道所属的事件循环上调用，默认实现为空。
pub trait ChannelHandler: Send + Sync + 'static {
    /// 诊断名称。
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }

    /// Handler 被追加到通道之后。
    fn handler_added(&self, _channel: &dyn Channel) {}

    /// 通道完成注册、事件循环已分配。
    fn channel_registered(&self, _channel: &dyn Channel) {}

    /// 通道已绑定或已连接。
    fn channel_active(&self, _channel: &dyn Channel) {}

    /// 通道从活跃状态关闭。
    fn channel_inactive(&self, _channel: &dyn Channel) {}

    /// 通道从事件循环注销。
    fn channel_unregistered(&self, _channel: &dyn Channel) {}
}

/// 引导层依赖的通道契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“谁拥有通道状态”写进契约：注册之前通道不属于任何事件循环，注册之后只属于一个；
/// - 编排层借助 [`Channel::is_registered`] 决定失败时走优雅关闭还是强制关闭。
///
/// ## 契约（What）
/// - `attach`：由事件循环在自己的线程上调用；实现必须记录事件循环、翻转注册标记，
///   并在返回前向 Handler 触发 `channel_registered`；失败时返回 `RegistrationFailed`；
/// - `bind`：在所属事件循环上调用，结果写入 `promise`；失败应使用 `BindFailed`；
/// - `set_option`：返回 `Ok(false)` 表示通道不认识该选项；
/// - `close`：优雅关闭，触发 `channel_inactive`/`channel_unregistered`；重复调用无副作用；
/// - `close_forcibly`：立即释放资源，不触发任何回调，可在注册前从任意线程调用。
///
/// ## 风险提示（Trade-offs）
/// - 实现不得在持有内部锁时回调 Handler，否则 Handler 回访通道会死锁。
pub trait Channel: Send + Sync + 'static {
    fn id(&self) -> ChannelId;

    /// 已分配的事件循环；注册前为 `None`。
    fn event_loop(&self) -> Option<Arc<dyn EventLoop>>;

    fn is_registered(&self) -> bool;

    fn is_open(&self) -> bool;

    /// 是否已绑定或已连接。
    fn is_active(&self) -> bool;

    fn local_address(&self) -> Option<BindAddress>;

    fn set_option(&self, name: &str, value: &OptionValue) -> Result<bool, BootstrapError>;

    fn set_attribute(&self, name: &'static str, value: AttributeValue);

    fn attribute(&self, name: &str) -> Option<AttributeValue>;

    /// 把 Handler 追加到通道 Pipeline 的末尾。
    fn add_last(&self, handler: Arc<dyn ChannelHandler>);

    /// 由事件循环在其线程上调用，完成注册。
    fn attach(&self, event_loop: Arc<dyn EventLoop>) -> Result<(), BootstrapError>;

    fn bind(&self, address: BindAddress, promise: ChannelPromise);

    fn close(&self);

    fn close_forcibly(&self);

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

impl dyn Channel {
    /// 按类型读取属性的便捷方法。
    pub fn attr<T>(&self, key: AttributeKey<T>) -> Option<T>
    where
        T: Any + Clone,
    {
        self.attribute(key.name())
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }
}

impl fmt::Debug for dyn Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("kind", &self.describe())
            .field("id", &self.id())
            .field("registered", &self.is_registered())
            .field("active", &self.is_active())
            .finish()
    }
}
