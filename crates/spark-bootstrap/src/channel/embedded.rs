//! 纯内存通道：不触碰操作系统套接字，只记录引导流程对它做过的每一步。
//!
//! # 设计目标（Why）
//! - 让引导层在没有真实传输实现的情况下也能端到端运行，便于示例与集成测试；
//! - 事件日志（[`ChannelEvent`]）按发生顺序保存，测试可以直接断言“先注册、后绑定”等顺序约束。
//!
//! # 可注入行为（How）
//! - [`EmbeddedChannel::with_supported_options`]：限定通道认识的选项名，其余返回 `Ok(false)`；
//! - [`EmbeddedChannel::with_rejected_option`]：让指定选项写入失败；
//! - [`EmbeddedChannel::with_bind_failure`]：让绑定以给定原因失败。

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    address::BindAddress,
    attribute::AttributeValue,
    channel::{Channel, ChannelHandler, ChannelId, ChannelPromise},
    error::BootstrapError,
    event_loop::EventLoop,
    option::{
        AUTO_READ, CONNECT_TIMEOUT, OptionValue, SO_BACKLOG, SO_KEEPALIVE, SO_LINGER, SO_RCVBUF,
        SO_REUSEADDR, SO_SNDBUF, TCP_NODELAY,
    },
};

/// 默认认识的选项名。
const WELL_KNOWN_OPTIONS: [&str; 9] = [
    SO_BACKLOG.name(),
    SO_REUSEADDR.name(),
    SO_KEEPALIVE.name(),
    SO_RCVBUF.name(),
    SO_SNDBUF.name(),
    SO_LINGER.name(),
    TCP_NODELAY.name(),
    CONNECT_TIMEOUT.name(),
    AUTO_READ.name(),
];

/// 通道上发生过的事件，按时间顺序记录。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    OptionApplied(String),
    AttributeSet(&'static str),
    HandlerAdded(Cow<'static, str>),
    Registered,
    Bound(BindAddress),
    Active,
    Inactive,
    Unregistered,
    Closed { forcibly: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Registered,
    Active,
    Closed,
}

struct EmbeddedState {
    lifecycle: Lifecycle,
    registered: bool,
    event_loop: Option<Arc<dyn EventLoop>>,
    local_address: Option<BindAddress>,
    options: BTreeMap<String, OptionValue>,
    attributes: BTreeMap<&'static str, AttributeValue>,
    handlers: Vec<Arc<dyn ChannelHandler>>,
    events: Vec<ChannelEvent>,
}

/// 记录型内存通道。
pub struct EmbeddedChannel {
    id: ChannelId,
    supported_options: BTreeSet<Cow<'static, str>>,
    rejected_options: BTreeSet<Cow<'static, str>>,
    bind_failure: Option<Cow<'static, str>>,
    state: Mutex<EmbeddedState>,
}

impl EmbeddedChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId::next(),
            supported_options: WELL_KNOWN_OPTIONS.into_iter().map(Cow::Borrowed).collect(),
            rejected_options: BTreeSet::new(),
            bind_failure: None,
            state: Mutex::new(EmbeddedState {
                lifecycle: Lifecycle::Created,
                registered: false,
                event_loop: None,
                local_address: None,
                options: BTreeMap::new(),
                attributes: BTreeMap::new(),
                handlers: Vec::new(),
                events: Vec::new(),
            }),
        }
    }

    /// 替换通道认识的选项集合。
    pub fn with_supported_options<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.supported_options = names.into_iter().map(Into::into).collect();
        self
    }

    /// 写入该选项时返回错误。
    pub fn with_rejected_option(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.rejected_options.insert(name.into());
        self
    }

    /// 绑定时以给定原因失败。
    pub fn with_bind_failure(mut self, reason: impl Into<Cow<'static, str>>) -> Self {
        self.bind_failure = Some(reason.into());
        self
    }

    /// 事件日志快照。
    pub fn events(&self) -> Vec<ChannelEvent> {
        self.state.lock().events.clone()
    }

    /// 已成功写入的选项快照。
    pub fn options(&self) -> BTreeMap<String, OptionValue> {
        self.state.lock().options.clone()
    }

    pub fn option(&self, name: &str) -> Option<OptionValue> {
        self.state.lock().options.get(name).cloned()
    }

    /// 已追加 Handler 的名称，按追加顺序。
    pub fn handler_names(&self) -> Vec<Cow<'static, str>> {
        self.state
            .lock()
            .handlers
            .iter()
            .map(|handler| handler.name())
            .collect()
    }

    /// 绑定动作发生的次数。
    pub fn bind_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, ChannelEvent::Bound(_)))
            .count()
    }

    fn handlers(&self) -> Vec<Arc<dyn ChannelHandler>> {
        self.state.lock().handlers.clone()
    }
}

impl Default for EmbeddedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for EmbeddedChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn event_loop(&self) -> Option<Arc<dyn EventLoop>> {
        self.state.lock().event_loop.clone()
    }

    fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    fn is_open(&self) -> bool {
        self.state.lock().lifecycle != Lifecycle::Closed
    }

    fn is_active(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Active
    }

    fn local_address(&self) -> Option<BindAddress> {
        self.state.lock().local_address.clone()
    }

    fn set_option(&self, name: &str, value: &OptionValue) -> Result<bool, BootstrapError> {
        if self.rejected_options.contains(name) {
            return Err(BootstrapError::InvalidArgument("option value"));
        }
        if !self.supported_options.contains(name) {
            return Ok(false);
        }
        let mut state = self.state.lock();
        state.options.insert(name.to_owned(), value.clone());
        state.events.push(ChannelEvent::OptionApplied(name.to_owned()));
        Ok(true)
    }

    fn set_attribute(&self, name: &'static str, value: AttributeValue) {
        let mut state = self.state.lock();
        state.attributes.insert(name, value);
        state.events.push(ChannelEvent::AttributeSet(name));
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.state.lock().attributes.get(name).cloned()
    }

    fn add_last(&self, handler: Arc<dyn ChannelHandler>) {
        {
            let mut state = self.state.lock();
            state.handlers.push(Arc::clone(&handler));
            state.events.push(ChannelEvent::HandlerAdded(handler.name()));
        }
        handler.handler_added(self);
    }

    fn attach(&self, event_loop: Arc<dyn EventLoop>) -> Result<(), BootstrapError> {
        {
            let mut state = self.state.lock();
            match state.lifecycle {
                Lifecycle::Created => {}
                Lifecycle::Closed => {
                    return Err(BootstrapError::registration(self.id, "channel is closed"));
                }
                Lifecycle::Registered | Lifecycle::Active => {
                    return Err(BootstrapError::registration(
                        self.id,
                        "registered to an event loop already",
                    ));
                }
            }
            state.lifecycle = Lifecycle::Registered;
            state.registered = true;
            state.event_loop = Some(event_loop);
            state.events.push(ChannelEvent::Registered);
        }
        debug!(channel = %self.id, "embedded channel registered");
        for handler in self.handlers() {
            handler.channel_registered(self);
        }
        Ok(())
    }

    fn bind(&self, address: BindAddress, promise: ChannelPromise) {
        let outcome = {
            let mut state = self.state.lock();
            let on_loop = state
                .event_loop
                .as_ref()
                .is_some_and(|event_loop| event_loop.in_event_loop());
            let lifecycle = state.lifecycle;
            let result: Result<(), &str> = match lifecycle {
                Lifecycle::Closed => Err("channel is closed"),
                Lifecycle::Created => Err("channel is not registered"),
                Lifecycle::Active => Err("channel is bound already"),
                Lifecycle::Registered if !on_loop => {
                    Err("bind invoked outside the channel's event loop")
                }
                Lifecycle::Registered => match &self.bind_failure {
                    Some(reason) => Err(reason.as_ref()),
                    None => {
                        state.lifecycle = Lifecycle::Active;
                        state.local_address = Some(address.clone());
                        state.events.push(ChannelEvent::Bound(address.clone()));
                        state.events.push(ChannelEvent::Active);
                        Ok(())
                    }
                },
            };
            result.map_err(|reason| {
                BootstrapError::bind(self.id, address.clone(), reason.to_owned())
            })
        };
        match outcome {
            Ok(()) => {
                debug!(channel = %self.id, %address, "embedded channel bound");
                promise.try_success();
                for handler in self.handlers() {
                    handler.channel_active(self);
                }
            }
            Err(error) => {
                promise.try_failure(error);
            }
        }
    }

    fn close(&self) {
        let (was_active, was_registered) = {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            let was_active = state.lifecycle == Lifecycle::Active;
            let was_registered = state.registered;
            state.lifecycle = Lifecycle::Closed;
            state.registered = false;
            state.events.push(ChannelEvent::Closed { forcibly: false });
            if was_active {
                state.events.push(ChannelEvent::Inactive);
            }
            if was_registered {
                state.events.push(ChannelEvent::Unregistered);
            }
            (was_active, was_registered)
        };
        debug!(channel = %self.id, "embedded channel closed");
        let handlers = self.handlers();
        if was_active {
            for handler in &handlers {
                handler.channel_inactive(self);
            }
        }
        if was_registered {
            for handler in &handlers {
                handler.channel_unregistered(self);
            }
        }
    }

    fn close_forcibly(&self) {
        let mut state = self.state.lock();
        if state.lifecycle == Lifecycle::Closed {
            return;
        }
        state.lifecycle = Lifecycle::Closed;
        state.registered = false;
        state.events.push(ChannelEvent::Closed { forcibly: true });
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("EmbeddedChannel")
    }
}

impl std::fmt::Debug for EmbeddedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EmbeddedChannel")
            .field("id", &self.id)
            .field("lifecycle", &state.lifecycle)
            .field("local_address", &state.local_address)
            .finish_non_exhaustive()
    }
}
