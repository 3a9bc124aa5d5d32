use std::{borrow::Cow, sync::Arc};

use crate::{
    address::BindAddress,
    attribute::AttributeValue,
    channel::{Channel, ChannelHandler, ChannelId, ChannelPromise},
    error::BootstrapError,
    event_loop::EventLoop,
    option::OptionValue,
};

/// 通道工厂失败时返回给调用方的占位通道。
///
/// 它从不注册、从不激活，所有变更操作都是空操作或以失败告终；存在的意义只是让
/// “失败的 Future 仍然携带通道”这条契约在工厂失败时也成立。
#[derive(Debug)]
pub struct FailedChannel {
    id: ChannelId,
}

impl FailedChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId::next(),
        }
    }
}

impl Default for FailedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for FailedChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn event_loop(&self) -> Option<Arc<dyn EventLoop>> {
        None
    }

    fn is_registered(&self) -> bool {
        false
    }

    fn is_open(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool {
        false
    }

    fn local_address(&self) -> Option<BindAddress> {
        None
    }

    fn set_option(&self, _name: &str, _value: &OptionValue) -> Result<bool, BootstrapError> {
        Ok(false)
    }

    fn set_attribute(&self, _name: &'static str, _value: AttributeValue) {}

    fn attribute(&self, _name: &str) -> Option<AttributeValue> {
        None
    }

    fn add_last(&self, _handler: Arc<dyn ChannelHandler>) {}

    fn attach(&self, _event_loop: Arc<dyn EventLoop>) -> Result<(), BootstrapError> {
        Err(BootstrapError::registration(
            self.id,
            "placeholder channel cannot be registered",
        ))
    }

    fn bind(&self, address: BindAddress, promise: ChannelPromise) {
        promise.try_failure(BootstrapError::bind(
            self.id,
            address,
            "placeholder channel cannot be bound",
        ));
    }

    fn close(&self) {}

    fn close_forcibly(&self) {}

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("FailedChannel")
    }
}
