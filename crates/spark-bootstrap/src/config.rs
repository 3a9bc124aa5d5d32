//! 引导配置：可变的配置聚合体与其校验后的不可变快照。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 引导器本身只是“配置 + 编排”，配置部分独立成 [`BootstrapConfig`]，可被多个线程同时修改、
//!   可被复制成模板，也可由声明式配置（见 `profile` 模块）填充；
//! - 终止操作（`register`/`bind`）只读取 [`ValidatedConfig`] 快照，避免编排途中与并发修改交错。
//!
//! ## 逻辑（How）
//! - 只允许设置一次的字段（事件循环组、通道工厂）使用 `OnceLock`，并发设置时恰有一方成功；
//! - 选项与属性使用 `parking_lot::Mutex<BTreeMap>`，遍历时先在锁内复制再在锁外使用；
//! - 可覆盖字段（本地地址、Handler、兜底执行器）使用 `RwLock`，后写者胜出。
//!
//! ## 契约（What）
//! - 所有 setter 接受 `&self`，返回 `Result<&Self, BootstrapError>` 便于链式调用；
//! - 选项值为 `None` 表示删除该选项，属性同理；
//! - [`Clone`] 产生深拷贝：两份配置的选项表与属性表互不影响，事件循环组、工厂与 Handler 共享引用。
//!
//! ## 风险提示（Trade-offs）
//! - “缺失参数”在 Rust 中多数已由类型系统排除，`InvalidArgument` 只保留给空名称等运行期才能发现的情况。

use std::{
    any::Any,
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    sync::{Arc, OnceLock},
};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{
    address::BindAddress,
    attribute::{AttributeKey, AttributeValue},
    channel::{Channel, ChannelHandler},
    error::BootstrapError,
    event_loop::EventLoopGroup,
    executor::{EventExecutor, ImmediateEventExecutor},
    factory::{ChannelFactory, TypedChannelFactory},
    option::{ChannelOption, OptionValue},
};

/// 可并发修改的引导配置。
#[derive(Default)]
pub struct BootstrapConfig {
    group: OnceLock<Arc<dyn EventLoopGroup>>,
    channel_factory: OnceLock<Arc<dyn ChannelFactory>>,
    local_address: RwLock<Option<BindAddress>>,
    options: Mutex<BTreeMap<Cow<'static, str>, OptionValue>>,
    attributes: Mutex<BTreeMap<&'static str, AttributeValue>>,
    handler: RwLock<Option<Arc<dyn ChannelHandler>>>,
    fallback_executor: RwLock<Option<Arc<dyn EventExecutor>>>,
}

impl BootstrapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置事件循环组；只能设置一次。
    pub fn set_group(&self, group: Arc<dyn EventLoopGroup>) -> Result<&Self, BootstrapError> {
        let described = group.describe();
        self.group
            .set(group)
            .map_err(|_| BootstrapError::AlreadyConfigured("group"))?;
        debug!(group = %described, "event loop group configured");
        Ok(self)
    }

    /// 设置通道工厂；只能设置一次，与 [`set_channel_type`](Self::set_channel_type) 共用槽位。
    pub fn set_channel_factory(
        &self,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<&Self, BootstrapError> {
        let described = factory.describe();
        self.channel_factory
            .set(factory)
            .map_err(|_| BootstrapError::AlreadyConfigured("channelFactory"))?;
        debug!(factory = %described, "channel factory configured");
        Ok(self)
    }

    /// 以 `C::default()` 作为通道工厂。
    pub fn set_channel_type<C>(&self) -> Result<&Self, BootstrapError>
    where
        C: Channel + Default,
    {
        self.set_channel_factory(Arc::new(TypedChannelFactory::<C>::new()))
    }

    /// 设置绑定地址；可覆盖。
    pub fn set_local_address(&self, address: BindAddress) -> Result<&Self, BootstrapError> {
        *self.local_address.write() = Some(address);
        Ok(self)
    }

    /// 绑定到所有接口的 `port`。
    pub fn set_local_address_port(&self, port: u16) -> Result<&Self, BootstrapError> {
        self.set_local_address(BindAddress::any(port))
    }

    /// 主机名与端口；主机名不做解析。
    pub fn set_local_address_host_port(
        &self,
        host: &str,
        port: u16,
    ) -> Result<&Self, BootstrapError> {
        self.set_local_address(BindAddress::from_host_port(host, port)?)
    }

    /// 写入或删除带类型的选项。
    pub fn set_option<T>(
        &self,
        option: ChannelOption<T>,
        value: Option<T>,
    ) -> Result<&Self, BootstrapError>
    where
        T: Into<OptionValue>,
    {
        self.set_option_value(option.name(), value.map(Into::into))
    }

    /// 以名称写入或删除选项；供声明式配置等动态场景使用。
    pub fn set_option_value(
        &self,
        name: impl Into<Cow<'static, str>>,
        value: Option<OptionValue>,
    ) -> Result<&Self, BootstrapError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BootstrapError::InvalidArgument("option"));
        }
        let mut options = self.options.lock();
        match value {
            Some(value) => {
                options.insert(name, value);
            }
            None => {
                options.remove(&*name);
            }
        }
        Ok(self)
    }

    /// 写入或删除带类型的属性。
    pub fn set_attr<T>(
        &self,
        key: AttributeKey<T>,
        value: Option<T>,
    ) -> Result<&Self, BootstrapError>
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        if key.name().trim().is_empty() {
            return Err(BootstrapError::InvalidArgument("attribute key"));
        }
        let mut attributes = self.attributes.lock();
        match value {
            Some(value) => {
                attributes.insert(key.name(), AttributeValue::new(value));
            }
            None => {
                attributes.remove(key.name());
            }
        }
        Ok(self)
    }

    /// 设置顶层 Handler；可覆盖。
    pub fn set_handler(&self, handler: Arc<dyn ChannelHandler>) -> Result<&Self, BootstrapError> {
        *self.handler.write() = Some(handler);
        Ok(self)
    }

    /// 设置通道尚未分配事件循环时使用的通知执行器；默认为 [`ImmediateEventExecutor`]。
    pub fn set_fallback_executor(
        &self,
        executor: Arc<dyn EventExecutor>,
    ) -> Result<&Self, BootstrapError> {
        *self.fallback_executor.write() = Some(executor);
        Ok(self)
    }

    pub fn group(&self) -> Option<Arc<dyn EventLoopGroup>> {
        self.group.get().cloned()
    }

    pub fn channel_factory(&self) -> Option<Arc<dyn ChannelFactory>> {
        self.channel_factory.get().cloned()
    }

    pub fn local_address(&self) -> Option<BindAddress> {
        self.local_address.read().clone()
    }

    pub fn handler(&self) -> Option<Arc<dyn ChannelHandler>> {
        self.handler.read().clone()
    }

    /// 选项表快照。
    pub fn options(&self) -> BTreeMap<Cow<'static, str>, OptionValue> {
        self.options.lock().clone()
    }

    pub fn option<T>(&self, option: ChannelOption<T>) -> Option<OptionValue> {
        self.options.lock().get(option.name()).cloned()
    }

    /// 属性表快照。
    pub fn attrs(&self) -> BTreeMap<&'static str, AttributeValue> {
        self.attributes.lock().clone()
    }

    /// 按类型读取属性。
    pub fn attr<T>(&self, key: AttributeKey<T>) -> Option<T>
    where
        T: Any + Clone,
    {
        self.attributes
            .lock()
            .get(key.name())
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub fn fallback_executor(&self) -> Arc<dyn EventExecutor> {
        match self.fallback_executor.read().as_ref() {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(ImmediateEventExecutor),
        }
    }

    /// 校验必需字段并取得不可变快照。
    ///
    /// 缺少事件循环组报告 `NotConfigured("group")`，缺少通道工厂报告 `NotConfigured("channelFactory")`，
    /// 两者都缺失时优先报告前者。
    pub fn validate(&self) -> Result<ValidatedConfig, BootstrapError> {
        let group = self.group().ok_or(BootstrapError::NotConfigured("group"))?;
        let channel_factory = self
            .channel_factory()
            .ok_or(BootstrapError::NotConfigured("channelFactory"))?;
        Ok(ValidatedConfig {
            group,
            channel_factory,
            local_address: self.local_address(),
            options: self.options(),
            attributes: self.attrs(),
            handler: self.handler(),
            fallback_executor: self.fallback_executor(),
        })
    }

    /// 以给定类型名渲染非默认字段。
    pub(crate) fn render(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(group) = self.group.get() {
            parts.push(format!("group: {}", group.describe()));
        }
        if let Some(factory) = self.channel_factory.get() {
            parts.push(format!("channelFactory: {}", factory.describe()));
        }
        if let Some(address) = self.local_address.read().as_ref() {
            parts.push(format!("localAddress: {address}"));
        }
        let options = self.options();
        if !options.is_empty() {
            let entries: Vec<_> = options
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            parts.push(format!("options: {{{}}}", entries.join(", ")));
        }
        let attrs = self.attrs();
        if !attrs.is_empty() {
            let entries: Vec<_> = attrs
                .iter()
                .map(|(name, value)| format!("{name}={value:?}"))
                .collect();
            parts.push(format!("attrs: {{{}}}", entries.join(", ")));
        }
        if let Some(handler) = self.handler.read().as_ref() {
            parts.push(format!("handler: {}", handler.name()));
        }
        if let Some(executor) = self.fallback_executor.read().as_ref() {
            parts.push(format!("fallbackExecutor: {}", executor.describe()));
        }
        write!(f, "{name}({})", parts.join(", "))
    }
}

impl Clone for BootstrapConfig {
    fn clone(&self) -> Self {
        Self {
            group: self.group.clone(),
            channel_factory: self.channel_factory.clone(),
            local_address: RwLock::new(self.local_address()),
            options: Mutex::new(self.options()),
            attributes: Mutex::new(self.attrs()),
            handler: RwLock::new(self.handler()),
            fallback_executor: RwLock::new(self.fallback_executor.read().clone()),
        }
    }
}

impl fmt::Display for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render("BootstrapConfig", f)
    }
}

impl fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 校验通过的配置快照，供一次注册或绑定使用。
#[derive(Clone)]
pub struct ValidatedConfig {
    group: Arc<dyn EventLoopGroup>,
    channel_factory: Arc<dyn ChannelFactory>,
    local_address: Option<BindAddress>,
    options: BTreeMap<Cow<'static, str>, OptionValue>,
    attributes: BTreeMap<&'static str, AttributeValue>,
    handler: Option<Arc<dyn ChannelHandler>>,
    fallback_executor: Arc<dyn EventExecutor>,
}

impl ValidatedConfig {
    pub fn group(&self) -> &Arc<dyn EventLoopGroup> {
        &self.group
    }

    pub fn channel_factory(&self) -> &Arc<dyn ChannelFactory> {
        &self.channel_factory
    }

    pub fn local_address(&self) -> Option<&BindAddress> {
        self.local_address.as_ref()
    }

    pub fn options(&self) -> &BTreeMap<Cow<'static, str>, OptionValue> {
        &self.options
    }

    pub fn attributes(&self) -> &BTreeMap<&'static str, AttributeValue> {
        &self.attributes
    }

    pub fn handler(&self) -> Option<&Arc<dyn ChannelHandler>> {
        self.handler.as_ref()
    }

    pub fn fallback_executor(&self) -> &Arc<dyn EventExecutor> {
        &self.fallback_executor
    }
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("group", &self.group.describe())
            .field("channel_factory", &self.channel_factory.describe())
            .field("local_address", &self.local_address)
            .field("options", &self.options)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
