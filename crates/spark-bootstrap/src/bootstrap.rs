//! 引导编排：创建通道 → 初始化 → 注册 → 绑定。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 客户端与服务端引导都遵循同一条流水线，差异只在“如何初始化新通道”；因此编排逻辑集中在
//!   [`Bootstrap`]，差异通过 [`ChannelInitializer`] 注入；
//! - 注册与绑定都可能异步完成，编排层必须保证“绑定一定发生在注册成功之后，并且在通道所属事件循环上执行”。
//!
//! ## 逻辑（How）
//! 1. 校验配置得到 [`ValidatedConfig`] 快照；
//! 2. 调用工厂创建通道，失败时以占位通道 [`FailedChannel`] 返回失败结果；
//! 3. 调用初始化钩子，失败时强制关闭通道；
//! 4. 通过事件循环组注册；同步即可观测到的失败按通道注册状态选择优雅或强制关闭；
//! 5. 构造 [`BindTask`]：注册已完成则立即调度，否则作为注册结果的监听器延后调度；
//!    调度的含义是“把绑定提交到通道的事件循环”，确保注册回调先于绑定执行。
//!
//! ## 契约（What）
//! - 配置错误在调用时同步返回 `Err`，此时没有任何通道被创建；
//! - 其余失败都经由返回的 [`ChannelFuture`] 传播，且其 `channel()` 始终可用；
//! - 每次成功的 `bind` 恰好调用一次 [`Channel::bind`]。
//!
//! ## 风险提示（Trade-offs）
//! - 事件循环在注册完成与绑定提交之间关闭时，绑定以 `BindFailed` 失败并强制关闭通道。

use std::{fmt, sync::Arc};

use tracing::{debug, warn};

use crate::{
    address::BindAddress,
    attribute::AttributeKey,
    channel::{
        Channel, ChannelFuture, ChannelFutureListener, ChannelHandler, ChannelPromise, ChannelRef,
        CloseOnFailure, FailedChannel,
    },
    config::{BootstrapConfig, ValidatedConfig},
    error::BootstrapError,
    event_loop::EventLoopGroup,
    executor::EventExecutor,
    factory::ChannelFactory,
    option::{ChannelOption, OptionValue},
};

/// 新通道的初始化钩子。
///
/// `init` 在注册之前、于调用 `register`/`bind` 的线程上执行；此时通道尚未属于任何事件循环，
/// 可以直接修改其选项、属性与 Pipeline。
pub trait ChannelInitializer: Send + Sync + 'static {
    fn init(&self, channel: &ChannelRef, config: &ValidatedConfig) -> Result<(), BootstrapError>;

    /// 在基础校验之后追加的校验。
    fn validate(&self, _config: &BootstrapConfig) -> Result<(), BootstrapError> {
        Ok(())
    }
}

/// 默认初始化：写入选项与属性，追加顶层 Handler。
///
/// 通道不认识或拒绝的选项只记录告警，不中断初始化。
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultChannelInitializer;

impl ChannelInitializer for DefaultChannelInitializer {
    fn init(&self, channel: &ChannelRef, config: &ValidatedConfig) -> Result<(), BootstrapError> {
        apply_options(channel.as_ref(), config);
        for (name, value) in config.attributes() {
            channel.set_attribute(*name, value.clone());
        }
        if let Some(handler) = config.handler() {
            channel.add_last(Arc::clone(handler));
        }
        Ok(())
    }
}

/// 把快照中的选项逐个写入通道。
pub fn apply_options(channel: &dyn Channel, config: &ValidatedConfig) {
    for (name, value) in config.options() {
        match channel.set_option(name, value) {
            Ok(true) => {}
            Ok(false) => {
                warn!(channel = %channel.id(), option = %name, "unknown channel option");
            }
            Err(error) => {
                warn!(
                    channel = %channel.id(),
                    option = %name,
                    %value,
                    %error,
                    "failed to set channel option"
                );
            }
        }
    }
}

/// 通道引导器。
///
/// ```
/// use std::sync::Arc;
/// use spark_bootstrap::{Bootstrap, EmbeddedChannel, ImmediateEventLoop, option::SO_BACKLOG};
///
/// let bootstrap = Bootstrap::new();
/// bootstrap
///     .group(Arc::new(ImmediateEventLoop))?
///     .channel_type::<EmbeddedChannel>()?
///     .option(SO_BACKLOG, Some(128))?;
/// let future = bootstrap.bind_host_port("127.0.0.1", 8080)?;
/// assert!(future.is_success());
/// # Ok::<(), spark_bootstrap::BootstrapError>(())
/// ```
pub struct Bootstrap<I = DefaultChannelInitializer> {
    config: BootstrapConfig,
    initializer: Arc<I>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::with_initializer(DefaultChannelInitializer)
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Bootstrap<I>
where
    I: ChannelInitializer,
{
    pub fn with_initializer(initializer: I) -> Self {
        Self::from_parts(BootstrapConfig::new(), initializer)
    }

    /// 以现有配置（例如声明式配置的结果或模板的副本）构造引导器。
    pub fn from_parts(config: BootstrapConfig, initializer: I) -> Self {
        Self {
            config,
            initializer: Arc::new(initializer),
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn initializer(&self) -> &I {
        &self.initializer
    }

    pub fn group(&self, group: Arc<dyn EventLoopGroup>) -> Result<&Self, BootstrapError> {
        self.config.set_group(group)?;
        Ok(self)
    }

    pub fn channel_factory(
        &self,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<&Self, BootstrapError> {
        self.config.set_channel_factory(factory)?;
        Ok(self)
    }

    pub fn channel_type<C>(&self) -> Result<&Self, BootstrapError>
    where
        C: Channel + Default,
    {
        self.config.set_channel_type::<C>()?;
        Ok(self)
    }

    pub fn local_address(&self, address: BindAddress) -> Result<&Self, BootstrapError> {
        self.config.set_local_address(address)?;
        Ok(self)
    }

    pub fn local_address_port(&self, port: u16) -> Result<&Self, BootstrapError> {
        self.config.set_local_address_port(port)?;
        Ok(self)
    }

    pub fn local_address_host_port(&self, host: &str, port: u16) -> Result<&Self, BootstrapError> {
        self.config.set_local_address_host_port(host, port)?;
        Ok(self)
    }

    pub fn option<T>(
        &self,
        option: ChannelOption<T>,
        value: Option<T>,
    ) -> Result<&Self, BootstrapError>
    where
        T: Into<OptionValue>,
    {
        self.config.set_option(option, value)?;
        Ok(self)
    }

    pub fn attr<T>(&self, key: AttributeKey<T>, value: Option<T>) -> Result<&Self, BootstrapError>
    where
        T: std::any::Any + Send + Sync + fmt::Debug,
    {
        self.config.set_attr(key, value)?;
        Ok(self)
    }

    pub fn handler(&self, handler: Arc<dyn ChannelHandler>) -> Result<&Self, BootstrapError> {
        self.config.set_handler(handler)?;
        Ok(self)
    }

    pub fn fallback_executor(
        &self,
        executor: Arc<dyn EventExecutor>,
    ) -> Result<&Self, BootstrapError> {
        self.config.set_fallback_executor(executor)?;
        Ok(self)
    }

    /// 基础校验与初始化钩子的追加校验。
    pub fn validate(&self) -> Result<ValidatedConfig, BootstrapError> {
        let validated = self.config.validate()?;
        self.initializer.validate(&self.config)?;
        Ok(validated)
    }

    /// 创建、初始化并注册一个新通道，不绑定。
    pub fn register(&self) -> Result<ChannelFuture, BootstrapError> {
        let config = self.validate()?;
        Ok(self.init_and_register(&config))
    }

    /// 绑定到已配置的本地地址。
    pub fn bind(&self) -> Result<ChannelFuture, BootstrapError> {
        let config = self.validate()?;
        let address = config
            .local_address()
            .cloned()
            .ok_or(BootstrapError::NotConfigured("localAddress"))?;
        Ok(self.do_bind(&config, address))
    }

    /// 绑定到给定地址，忽略已配置的本地地址。
    pub fn bind_to(&self, address: BindAddress) -> Result<ChannelFuture, BootstrapError> {
        let config = self.validate()?;
        Ok(self.do_bind(&config, address))
    }

    /// 绑定到所有接口的 `port`。
    pub fn bind_port(&self, port: u16) -> Result<ChannelFuture, BootstrapError> {
        self.bind_to(BindAddress::any(port))
    }

    /// 绑定到主机名与端口；主机名原样交给通道，不做解析。
    pub fn bind_host_port(&self, host: &str, port: u16) -> Result<ChannelFuture, BootstrapError> {
        self.bind_to(BindAddress::from_host_port(host, port)?)
    }

    fn init_and_register(&self, config: &ValidatedConfig) -> ChannelFuture {
        let factory = config.channel_factory();
        let channel = match factory.new_channel() {
            Ok(channel) => channel,
            Err(error) => {
                let error = match error {
                    BootstrapError::ChannelCreationFailed { .. } => error,
                    other => BootstrapError::channel_creation(factory.describe(), other),
                };
                warn!(factory = %factory.describe(), %error, "failed to create channel");
                let placeholder: ChannelRef = Arc::new(FailedChannel::new());
                placeholder.close_forcibly();
                return ChannelFuture::failed(
                    placeholder,
                    Arc::clone(config.fallback_executor()),
                    error,
                );
            }
        };
        debug!(channel = %channel.id(), kind = %channel.describe(), "channel created");

        if let Err(error) = self.initializer.init(&channel, config) {
            warn!(channel = %channel.id(), %error, "failed to initialize channel");
            channel.close_forcibly();
            return ChannelFuture::failed(channel, Arc::clone(config.fallback_executor()), error);
        }

        let registration = config.group().register(Arc::clone(&channel));
        if let Some(error) = registration.cause() {
            warn!(channel = %channel.id(), %error, "channel registration failed");
            close_after_failure(channel.as_ref());
        }
        registration
    }

    fn do_bind(&self, config: &ValidatedConfig, address: BindAddress) -> ChannelFuture {
        let registration = self.init_and_register(config);
        if registration.cause().is_some() {
            return registration;
        }
        let promise = ChannelPromise::new(
            Arc::clone(registration.channel()),
            Arc::clone(config.fallback_executor()),
        );
        let task = BindTask {
            registration: registration.clone(),
            address,
            promise: promise.clone(),
            fallback: Arc::clone(config.fallback_executor()),
        };
        if registration.is_done() {
            task.schedule();
        } else {
            debug!(channel = %registration.channel().id(), "registration pending, deferring bind");
            registration.add_listener(task);
        }
        promise.future()
    }
}

impl<I> Clone for Bootstrap<I> {
    /// 深拷贝配置，共享初始化钩子。
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            initializer: Arc::clone(&self.initializer),
        }
    }
}

impl<I> fmt::Display for Bootstrap<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.render("Bootstrap", f)
    }
}

impl<I> fmt::Debug for Bootstrap<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 注册完成后的绑定步骤。
///
/// 持有注册结果、目标地址与调用方拿到的绑定结果；无论注册是同步还是异步完成，
/// 真正的绑定都被提交到通道的事件循环上执行。
///
/// 通道绑定写入的是内部结果单元，调用方的结果只由 [`ForwardBindOutcome`] 转写，
/// 因此调用方观察到 `BindFailed` 时通道已经关闭。
struct BindTask {
    registration: ChannelFuture,
    address: BindAddress,
    promise: ChannelPromise,
    fallback: Arc<dyn EventExecutor>,
}

impl BindTask {
    fn schedule(self) {
        let channel = Arc::clone(self.promise.channel());
        let Some(event_loop) = channel.event_loop() else {
            self.run();
            return;
        };
        let promise = self.promise.clone();
        let address = self.address.clone();
        if event_loop.execute(Box::new(move || self.run())).is_err() {
            warn!(
                channel = %channel.id(),
                %address,
                "force-closing a channel whose bind task was rejected by the event loop"
            );
            channel.close_forcibly();
            promise.try_failure(BootstrapError::bind(
                channel.id(),
                address,
                "event loop rejected the bind task",
            ));
        }
    }

    fn run(self) {
        let channel = Arc::clone(self.promise.channel());
        if self.registration.is_success() {
            debug!(channel = %channel.id(), address = %self.address, "binding channel");
            let bind = ChannelPromise::new(Arc::clone(&channel), self.fallback);
            bind.add_listener(ForwardBindOutcome {
                caller: self.promise,
            });
            channel.bind(self.address, bind);
            return;
        }
        let cause = self.registration.cause().unwrap_or_else(|| {
            BootstrapError::registration(channel.id(), "registration completed without a result")
        });
        close_after_failure(channel.as_ref());
        self.promise.try_failure(cause);
    }
}

impl ChannelFutureListener for BindTask {
    fn operation_complete(self: Box<Self>, _future: &ChannelFuture) {
        self.schedule();
    }
}

/// 先关闭绑定失败的通道，再把绑定结果转写到调用方的结果单元。
struct ForwardBindOutcome {
    caller: ChannelPromise,
}

impl ChannelFutureListener for ForwardBindOutcome {
    fn operation_complete(self: Box<Self>, future: &ChannelFuture) {
        match future.cause() {
            Some(cause) => {
                debug!(channel = %future.channel().id(), error = %cause, "bind failed");
                Box::new(CloseOnFailure).operation_complete(future);
                self.caller.try_failure(cause);
            }
            None => {
                self.caller.try_success();
            }
        }
    }
}

fn close_after_failure(channel: &dyn Channel) {
    if channel.is_registered() {
        channel.close();
    } else {
        channel.close_forcibly();
    }
}
