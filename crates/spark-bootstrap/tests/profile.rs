//! 声明式配置集成测试：TOML 文档到引导配置的装载。
//!
//! # 教案级导览
//!
//! - **Why**：部署参数来自外部文件，解析失败必须整体拒绝而不是半途写入；
//! - **What**：覆盖正常装载、端到端绑定以及三类非法文档。

mod support;

use std::{sync::Arc, time::Duration};

use spark_bootstrap::{
    BindAddress, Bootstrap, BootstrapConfig, BootstrapError, BootstrapProfile, Channel,
    EmbeddedChannel, ImmediateEventLoop, OptionValue, ProfileValue, option::SO_BACKLOG,
};
use support::FixedFactory;

const DOCUMENT: &str = r#"
local_address = "127.0.0.1:9000"

[options]
SO_BACKLOG = 128
TCP_NODELAY = true
SO_LINGER = "250ms"
"#;

#[test]
fn profile_populates_address_and_options() {
    let profile = BootstrapProfile::from_toml_str(DOCUMENT).unwrap();
    assert_eq!(profile.options.get("SO_BACKLOG"), Some(&ProfileValue::Integer(128)));

    let config = BootstrapConfig::new();
    profile.apply_to(&config).unwrap();
    assert_eq!(
        config.local_address(),
        Some(BindAddress::from_host_port("127.0.0.1", 9000).unwrap())
    );
    let options = config.options();
    assert_eq!(options.get("SO_BACKLOG"), Some(&OptionValue::Integer(128)));
    assert_eq!(
        config.option(SO_BACKLOG),
        Some(OptionValue::from(128u32)),
        "配置文件写入的整数应与强类型键写入的值相等"
    );
    assert_eq!(options.get("TCP_NODELAY"), Some(&OptionValue::Boolean(true)));
    assert_eq!(
        options.get("SO_LINGER"),
        Some(&OptionValue::Duration(Duration::from_millis(250)))
    );
}

/// ## 装载后绑定
///
/// - **契约 (What)**：配置文件提供的地址被用作 `bind()` 的目标，选项写入新通道。
#[test]
fn profile_address_drives_bind() {
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(ImmediateEventLoop))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();
    BootstrapProfile::from_toml_str(DOCUMENT)
        .unwrap()
        .apply_to(bootstrap.config())
        .unwrap();

    let future = bootstrap.bind().unwrap();
    assert!(future.is_success(), "{:?}", future.cause());
    assert_eq!(channel.local_address().map(|address| address.port()), Some(9000));
    assert_eq!(channel.option("SO_BACKLOG"), Some(OptionValue::Integer(128)));
}

#[test]
fn unknown_fields_and_unsupported_values_are_rejected() {
    let unknown = BootstrapProfile::from_toml_str("group = \"nio\"\n");
    assert!(matches!(unknown, Err(BootstrapError::InvalidProfile(_))));

    let float = BootstrapProfile::from_toml_str("[options]\nSO_BACKLOG = 1.5\n");
    assert!(matches!(float, Err(BootstrapError::InvalidProfile(_))));
}

/// ## 失败不留痕
///
/// - **契约 (What)**：地址非法时返回 `InvalidProfile`，选项也不会被写入。
#[test]
fn invalid_address_leaves_configuration_untouched() {
    let profile = BootstrapProfile::from_toml_str(
        "local_address = \"localhost:http\"\n[options]\nSO_BACKLOG = 64\n",
    )
    .unwrap();
    let config = BootstrapConfig::new();
    config.set_local_address_port(80).unwrap();

    let error = profile.apply_to(&config).unwrap_err();
    assert!(matches!(
        &error,
        BootstrapError::InvalidProfile(message) if message.contains("localhost:http")
    ));
    assert_eq!(error.code(), "bootstrap.invalid_profile");
    assert_eq!(config.local_address(), Some(BindAddress::any(80)));
    assert!(config.options().is_empty());
}
