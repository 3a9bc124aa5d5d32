//! 声明式配置：从 TOML 文档装载本地地址与通道选项。
//!
//! # 设计目标（Why）
//! - 部署环境常常需要在不改代码的情况下调整监听地址与套接字参数；
//! - 结构性字段（事件循环组、通道工厂）关系到进程内对象，仍然只能由代码配置。
//!
//! # 文档格式（What）
//! ```toml
//! local_address = "0.0.0.0:8080"
//!
//! [options]
//! SO_BACKLOG = 128
//! TCP_NODELAY = true
//! SO_LINGER = "250ms"
//! ```
//! - `local_address` 接受 `host:port`、`[v6]:port` 或裸端口；
//! - 选项值可以是整数、布尔、字符串；形如 `"<n>ms"` / `"<n>s"` 的字符串解释为时长。
//!
//! # 风险提示（Trade-offs）
//! - [`BootstrapProfile::apply_to`] 先完整解析再写入，解析失败时目标配置保持不变。

use std::{borrow::Cow, collections::BTreeMap, time::Duration};

use serde::Deserialize;
use tracing::debug;

use crate::{
    address::BindAddress, config::BootstrapConfig, error::BootstrapError, option::OptionValue,
};

/// 反序列化后的声明式配置。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BootstrapProfile {
    #[serde(default)]
    pub local_address: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, ProfileValue>,
}

/// 配置文档中的选项取值。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ProfileValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl ProfileValue {
    fn into_option_value(self) -> OptionValue {
        match self {
            Self::Boolean(value) => OptionValue::Boolean(value),
            Self::Integer(value) => OptionValue::Integer(value),
            Self::Text(text) => match parse_duration(&text) {
                Some(duration) => OptionValue::Duration(duration),
                None => OptionValue::Text(Cow::Owned(text)),
            },
        }
    }
}

fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if let Some(millis) = text.strip_suffix("ms") {
        return millis.trim().parse().ok().map(Duration::from_millis);
    }
    text.strip_suffix('s')
        .and_then(|secs| secs.trim().parse().ok())
        .map(Duration::from_secs)
}

impl BootstrapProfile {
    /// 解析 TOML 文档。
    pub fn from_toml_str(document: &str) -> Result<Self, BootstrapError> {
        toml::from_str(document)
            .map_err(|error| BootstrapError::InvalidProfile(error.to_string().into()))
    }

    /// 把配置写入 `config`：本地地址覆盖写入，选项逐个 upsert。
    pub fn apply_to(&self, config: &BootstrapConfig) -> Result<(), BootstrapError> {
        let address = match self.local_address.as_deref() {
            Some(text) => Some(text.parse::<BindAddress>().map_err(|error| {
                BootstrapError::InvalidProfile(format!("local_address `{text}`: {error}").into())
            })?),
            None => None,
        };
        let mut options = Vec::with_capacity(self.options.len());
        for (name, value) in &self.options {
            if name.trim().is_empty() {
                return Err(BootstrapError::InvalidProfile("empty option name".into()));
            }
            options.push((name.clone(), value.clone().into_option_value()));
        }

        if let Some(address) = address {
            config.set_local_address(address)?;
        }
        for (name, value) in options {
            config.set_option_value(name, Some(value))?;
        }
        debug!(
            local_address = ?self.local_address,
            options = self.options.len(),
            "bootstrap profile applied"
        );
        Ok(())
    }
}
