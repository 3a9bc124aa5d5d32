//! 通道工厂：每次调用产出一个全新的、尚未注册的通道。
//!
//! # 契约（What）
//! - `new_channel` 每次返回不同的通道实例；失败以 `ChannelCreationFailed` 表达；
//! - `describe` 用于诊断输出，形如 `EmbeddedChannel.type`。
//!
//! # 风险提示（Trade-offs）
//! - [`TypedChannelFactory`] 捕获构造函数中的 panic 并转换为错误；panic 消息仍会经过全局 panic hook 输出。

use std::{any::Any, borrow::Cow, fmt, marker::PhantomData, panic, sync::Arc};

use crate::{
    channel::{Channel, ChannelRef},
    error::{BootstrapError, Message},
    executor::short_type_name,
};

/// 通道工厂契约。
pub trait ChannelFactory: Send + Sync + 'static {
    fn new_channel(&self) -> Result<ChannelRef, BootstrapError>;

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

/// 通过 `C::default()` 构造通道的工厂。
pub struct TypedChannelFactory<C> {
    _marker: PhantomData<fn() -> C>,
}

impl<C> TypedChannelFactory<C> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<C> Default for TypedChannelFactory<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for TypedChannelFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedChannelFactory({})", short_type_name::<C>())
    }
}

impl<C> ChannelFactory for TypedChannelFactory<C>
where
    C: Channel + Default,
{
    fn new_channel(&self) -> Result<ChannelRef, BootstrapError> {
        match panic::catch_unwind(C::default) {
            Ok(channel) => Ok(Arc::new(channel)),
            Err(payload) => Err(BootstrapError::channel_creation(
                self.describe(),
                Message::new(panic_message(payload.as_ref())),
            )),
        }
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Owned(format!("{}.type", short_type_name::<C>()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        return format!("channel constructor panicked: {text}");
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return format!("channel constructor panicked: {text}");
    }
    String::from("channel constructor panicked")
}

/// 由闭包驱动的工厂，适合需要捕获构造参数的场景。
pub struct FnChannelFactory<F> {
    name: Cow<'static, str>,
    make: F,
}

impl<F> FnChannelFactory<F>
where
    F: Fn() -> Result<ChannelRef, BootstrapError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, make: F) -> Self {
        Self {
            name: name.into(),
            make,
        }
    }
}

impl<F> ChannelFactory for FnChannelFactory<F>
where
    F: Fn() -> Result<ChannelRef, BootstrapError> + Send + Sync + 'static,
{
    fn new_channel(&self) -> Result<ChannelRef, BootstrapError> {
        (self.make)()
    }

    fn describe(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnChannelFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnChannelFactory").field(&self.name).finish()
    }
}
