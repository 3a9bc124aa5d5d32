//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为引导层对外暴露的错误语义提供集中定义：配置期错误同步返回，注册/绑定期错误只经由
//!   [`ChannelFuture`](crate::channel::ChannelFuture) 的失败槽位传播；
//! - 每个变体携带稳定错误码，便于日志聚合与告警规则按码匹配，而不是按自然语言描述匹配。
//!
//! ## 设计要求（What）
//! - 所有变体实现 `thiserror::Error`，并且整体可 `Clone`：同一失败会被多个监听器与等待者观测；
//! - 底层原因统一收敛为 [`Cause`]（`Arc<dyn Error + Send + Sync>`），可跨线程共享。

use std::{borrow::Cow, error::Error as StdError, sync::Arc};

use thiserror::Error;

use crate::{address::BindAddress, channel::ChannelId};

/// 可共享的底层错误原因。
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// 引导层错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“调用方配置错误”与“异步流程失败”两类问题，前者应当在开发期修复，
///   后者需要运行期重试或降级；
/// - **契约 (What)**：
///   - `InvalidArgument`/`AlreadyConfigured`/`NotConfigured`/`InvalidProfile` 仅出现在同步返回值中；
///   - `ChannelCreationFailed`/`RegistrationFailed`/`BindFailed` 仅出现在返回 Future 的失败槽位中，
///     且在浮出之前通道已经按规则关闭；
/// - **设计权衡 (Trade-offs)**：`AlreadyConfigured` 等变体只携带 `&'static str` 字段名，保持零分配；
///   异步失败携带 `Cow` 描述与可选 [`Cause`]，牺牲少量堆分配换取排障信息。
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum BootstrapError {
    /// 必需参数缺失或非法，例如空的选项名。
    #[error("invalid argument: `{0}` must be provided")]
    InvalidArgument(&'static str),

    /// 只允许设置一次的字段被重复设置。
    #[error("`{0}` set already")]
    AlreadyConfigured(&'static str),

    /// 终止操作调用前缺少必需字段，或绑定时没有可用地址。
    #[error("`{0}` not set")]
    NotConfigured(&'static str),

    /// 通道工厂无法产出通道。
    #[error("unable to create channel from {factory}")]
    ChannelCreationFailed {
        factory: Cow<'static, str>,
        #[source]
        source: Cause,
    },

    /// 执行子系统拒绝或未能完成注册。
    #[error("failed to register channel {channel}: {reason}")]
    RegistrationFailed {
        channel: ChannelId,
        reason: Cow<'static, str>,
        #[source]
        source: Option<Cause>,
    },

    /// 注册成功后绑定调用本身失败。
    #[error("failed to bind channel {channel} to {address}: {reason}")]
    BindFailed {
        channel: ChannelId,
        address: BindAddress,
        reason: Cow<'static, str>,
        #[source]
        source: Option<Cause>,
    },

    /// 声明式配置无法解析或包含不支持的取值。
    #[error("invalid bootstrap profile: {0}")]
    InvalidProfile(Cow<'static, str>),
}

impl BootstrapError {
    /// 返回稳定的机器可读错误码。
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "bootstrap.invalid_argument",
            Self::AlreadyConfigured(_) => "bootstrap.already_configured",
            Self::NotConfigured(_) => "bootstrap.not_configured",
            Self::ChannelCreationFailed { .. } => "bootstrap.channel_creation_failed",
            Self::RegistrationFailed { .. } => "bootstrap.registration_failed",
            Self::BindFailed { .. } => "bootstrap.bind_failed",
            Self::InvalidProfile(_) => "bootstrap.invalid_profile",
        }
    }

    /// 是否属于调用方可在开发期修复的配置错误。
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::AlreadyConfigured(_)
                | Self::NotConfigured(_)
                | Self::InvalidProfile(_)
        )
    }

    /// 构造不带底层原因的注册失败。
    pub fn registration(channel: ChannelId, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::RegistrationFailed {
            channel,
            reason: reason.into(),
            source: None,
        }
    }

    /// 构造不带底层原因的绑定失败。
    pub fn bind(
        channel: ChannelId,
        address: BindAddress,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::BindFailed {
            channel,
            address,
            reason: reason.into(),
            source: None,
        }
    }

    /// 将任意错误包装为通道创建失败。
    pub fn channel_creation<E>(factory: impl Into<Cow<'static, str>>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::ChannelCreationFailed {
            factory: factory.into(),
            source: Arc::new(source),
        }
    }
}

/// 用于承载纯文本原因的轻量错误，常见于 panic 负载或测试替身。
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct Message(pub Cow<'static, str>);

impl Message {
    pub fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Self(text.into())
    }
}
