#![doc = r#"
# spark-bootstrap

## 设计动机（Why）
- **定位**：新通道从诞生到可用要经过四步：由工厂创建、由初始化钩子写入选项/属性/Handler、
  注册到事件循环、在事件循环上绑定本地地址；后两步都可能异步完成，本 crate 负责把它们
  串成一条顺序正确、失败可观测的流水线。
- **架构角色**：位于传输实现之上、应用引导之下；只依赖通道、事件循环与执行器三组契约，
  不触碰任何具体套接字实现。

## 核心契约（What）
- 配置错误在 `register()`/`bind()` 调用时同步返回，不创建任何通道；
- 其余失败只经由返回的 [`ChannelFuture`] 传播，失败前通道已按注册状态关闭；
- 绑定总是在注册成功之后、于通道所属事件循环上执行。

## 实现策略（How）
- [`config`]：可并发修改的 [`BootstrapConfig`] 与校验后的 [`ValidatedConfig`] 快照；
- [`bootstrap`]：编排器 [`Bootstrap`] 与初始化钩子 [`ChannelInitializer`]；
- [`future`]/[`channel`]：一次写入的结果单元与通道维度的 [`ChannelFuture`]/[`ChannelPromise`]；
- [`executor`]/[`event_loop`]：线程亲和的执行契约及参考实现，
  `SingleThreadEventLoop` 在专用线程上驱动 Tokio current-thread 运行时（feature `runtime-tokio`）；
- [`option`]/[`attribute`]/[`address`]：强类型的选项键、属性键与绑定地址；
- `profile`（feature `profile`）：从 TOML 装载本地地址与选项。

## 风险与考量（Trade-offs）
- 监听器在通道的事件循环上被通知；在事件循环线程上阻塞等待同一循环完成的结果会自锁，
  应改用监听器或 `.await`。
"#]
#![deny(unsafe_code)]

pub mod address;
pub mod attribute;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod factory;
pub mod future;
pub mod option;
#[cfg(feature = "profile")]
pub mod profile;

pub use address::BindAddress;
pub use attribute::{AttributeKey, AttributeValue};
pub use bootstrap::{Bootstrap, ChannelInitializer, DefaultChannelInitializer};
pub use channel::{
    Channel, ChannelEvent, ChannelFuture, ChannelFutureListener, ChannelHandler, ChannelId,
    ChannelPromise, ChannelRef, CloseOnFailure, EmbeddedChannel, FailedChannel,
};
pub use config::{BootstrapConfig, ValidatedConfig};
pub use error::{BootstrapError, Cause, Message};
#[cfg(feature = "runtime-tokio")]
pub use event_loop::{MultiThreadEventLoopGroup, SingleThreadEventLoop};
pub use event_loop::{EventLoop, EventLoopGroup, ImmediateEventLoop};
pub use executor::{EventExecutor, ImmediateEventExecutor, RejectedTask, Task};
pub use factory::{ChannelFactory, FnChannelFactory, TypedChannelFactory};
pub use future::Promise;
pub use option::{ChannelOption, OptionValue};
#[cfg(feature = "profile")]
pub use profile::{BootstrapProfile, ProfileValue};
