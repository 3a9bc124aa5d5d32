//! 编排流水线集成测试：创建 → 初始化 → 注册 → 绑定。
//!
//! # 教案级导览
//!
//! - **Why**：编排层的价值在于顺序与失败语义，这两点只能在端到端场景下被验证；
//! - **How**：借助 `support` 模块的替身注入同步失败、注册挂起与事件循环拒绝等情形，
//!   再通过 [`EmbeddedChannel`] 的事件日志断言通道经历的每一步；
//! - **What**：覆盖“无地址不注册”“工厂失败不注册”“注册失败不绑定”“先注册后绑定”
//!   以及端到端绑定恰好一次等性质。

mod support;

use std::sync::Arc;

use futures::executor::block_on;
use spark_bootstrap::{
    AttributeKey, BindAddress, Bootstrap, BootstrapConfig, BootstrapError, Channel, ChannelEvent,
    ChannelFuture, ChannelInitializer, ChannelRef, EmbeddedChannel, EventExecutor,
    ImmediateEventLoop, ValidatedConfig, option::SO_BACKLOG,
};
use support::{
    FailingFactory, FixedFactory, ManualEventLoop, OrderLog, RecordingGroup, RecordingHandler,
    RegistrationMode,
};

const TENANT: AttributeKey<String> = AttributeKey::new("tenant");

fn position(events: &[ChannelEvent], wanted: &ChannelEvent) -> usize {
    events
        .iter()
        .position(|event| event == wanted)
        .unwrap_or_else(|| panic!("事件 {wanted:?} 缺失，实际日志：{events:?}"))
}

/// ## 无地址绑定
///
/// - **意图 (Why)**：地址缺失属于配置错误，必须同步返回且不产生任何副作用；
/// - **契约 (What)**：`bind()` 返回 `NotConfigured("localAddress")`，工厂与事件循环组均未被调用。
#[test]
fn bind_without_address_fails_before_registration() {
    let group = RecordingGroup::new(RegistrationMode::Delegate);
    let channel = Arc::new(EmbeddedChannel::new());
    let factory = FixedFactory::single(&channel);
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(group.clone())
        .unwrap()
        .channel_factory(factory.clone())
        .unwrap();

    let error = bootstrap.bind().err().expect("缺少地址时 bind 必须同步失败");
    assert!(matches!(error, BootstrapError::NotConfigured("localAddress")));
    assert_eq!(factory.calls(), 0, "不应创建通道");
    assert_eq!(group.registrations(), 0, "不应发起注册");
}

/// ## 校验先于一切
///
/// - **契约 (What)**：未配置事件循环组时 `register()` 与 `bind_port()` 都同步失败。
#[test]
fn terminal_operations_require_group_and_factory() {
    let bootstrap = Bootstrap::new();
    assert!(matches!(
        bootstrap.register().err(),
        Some(BootstrapError::NotConfigured("group"))
    ));
    bootstrap.group(Arc::new(ImmediateEventLoop)).unwrap();
    assert!(matches!(
        bootstrap.bind_port(8080).err(),
        Some(BootstrapError::NotConfigured("channelFactory"))
    ));
}

/// ## 工厂失败
///
/// - **意图 (Why)**：工厂失败时没有真实通道，但返回结果的 `channel()` 依旧必须可用；
/// - **契约 (What)**：结果已失败且为 `ChannelCreationFailed`，事件循环组未收到注册请求。
#[test]
fn factory_failure_yields_failed_future_without_registration() {
    let group = RecordingGroup::new(RegistrationMode::Delegate);
    let factory = Arc::new(FailingFactory::default());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(group.clone())
        .unwrap()
        .channel_factory(factory.clone())
        .unwrap();

    let future = bootstrap.register().unwrap();
    assert!(future.is_done());
    assert!(matches!(
        future.cause(),
        Some(BootstrapError::ChannelCreationFailed { .. })
    ));
    assert_eq!(factory.calls(), 1);
    assert_eq!(group.registrations(), 0);
    assert!(!future.channel().is_open(), "占位通道必须处于关闭状态");
    assert!(block_on(future.clone()).is_err());
}

/// ## 注册同步失败
///
/// - **契约 (What)**：`bind()` 返回的结果携带注册原因；通道从未被绑定，并被强制关闭。
#[test]
fn synchronous_registration_failure_skips_bind() {
    let group = RecordingGroup::new(RegistrationMode::FailBeforeAttach);
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(group.clone())
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap()
        .local_address_port(8080)
        .unwrap();

    let future = bootstrap.bind().unwrap();
    match future.cause() {
        Some(BootstrapError::RegistrationFailed { reason, .. }) => {
            assert_eq!(reason, "injected registration failure");
        }
        other => panic!("期望注册失败，实际：{other:?}"),
    }
    assert_eq!(group.registrations(), 1);
    assert_eq!(channel.bind_count(), 0, "注册失败后不得绑定");
    assert_eq!(
        channel.events().last(),
        Some(&ChannelEvent::Closed { forcibly: true })
    );
}

/// ## 注册完成后才失败
///
/// - **意图 (Why)**：执行子系统可能在翻转注册标记之后才报告失败，此时应走优雅关闭，
///   让 Handler 观察到注销通知。
#[test]
fn late_registration_failure_closes_gracefully() {
    let group = RecordingGroup::new(RegistrationMode::FailAfterAttach);
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(group)
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.register().unwrap();
    assert!(matches!(
        future.cause(),
        Some(BootstrapError::RegistrationFailed { .. })
    ));
    let events = channel.events();
    assert!(events.contains(&ChannelEvent::Closed { forcibly: false }));
    assert!(events.contains(&ChannelEvent::Unregistered));
    assert!(!events.contains(&ChannelEvent::Closed { forcibly: true }));
}

/// ## 同步注册的顺序
///
/// - **契约 (What)**：内联事件循环上 `bind()` 返回时已完成，且 `registered` 先于绑定。
#[test]
fn synchronous_registration_orders_registered_before_bind() {
    let log = OrderLog::default();
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(ImmediateEventLoop))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap()
        .handler(RecordingHandler::new(log.clone()))
        .unwrap();

    let future = bootstrap.bind_port(9000).unwrap();
    assert!(future.is_success());

    let events = channel.events();
    assert!(
        position(&events, &ChannelEvent::Registered)
            < position(&events, &ChannelEvent::Bound(BindAddress::any(9000)))
    );
    assert_eq!(log.entries(), vec!["handler_added", "registered", "active"]);
}

/// ## 延迟注册的顺序
///
/// - **意图 (Why)**：调用方不在事件循环线程时注册被排队，绑定必须挂在注册结果之后；
/// - **逻辑 (How)**：手动事件循环先只排队；驱动一次后注册任务执行，并再提交一个绑定任务；
/// - **契约 (What)**：驱动前结果未完成且未绑定；驱动后 `registered` 先于 `Bound`，绑定恰好一次。
#[test]
fn deferred_registration_orders_registered_before_bind() {
    let log = OrderLog::default();
    let event_loop = ManualEventLoop::new();
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(event_loop.clone()))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap()
        .handler(RecordingHandler::new(log.clone()))
        .unwrap()
        .local_address_host_port("127.0.0.1", 7000)
        .unwrap();

    let future = bootstrap.bind().unwrap();
    assert!(!future.is_done(), "注册挂起时结果不应完成");
    assert_eq!(channel.bind_count(), 0);
    assert_eq!(event_loop.pending(), 1, "只应排入注册任务");

    assert_eq!(event_loop.run_pending(), 2, "注册任务与随后提交的绑定任务");
    assert!(future.is_success(), "{:?}", future.cause());
    assert_eq!(channel.bind_count(), 1);

    let events = channel.events();
    let address: BindAddress = "127.0.0.1:7000".parse().unwrap();
    let registered_at = position(&events, &ChannelEvent::Registered);
    assert!(registered_at < position(&events, &ChannelEvent::Bound(address)));
    let registered = log.position("registered").expect("registered 未记录");
    let active = log.position("active").expect("active 未记录");
    assert!(registered < active);
}

/// ## 在事件循环线程上发起绑定
///
/// - **意图 (Why)**：即便注册在调用栈上同步完成，绑定也只能以任务形式提交，
///   给 Handler 留出观察注册事件的机会。
#[test]
fn bind_is_submitted_even_when_caller_is_on_the_loop() {
    let event_loop = ManualEventLoop::new();
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Arc::new(Bootstrap::new());
    bootstrap
        .group(Arc::new(event_loop.clone()))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let observed = Arc::new(parking_lot::Mutex::new(None));
    {
        let bootstrap = Arc::clone(&bootstrap);
        let observed = Arc::clone(&observed);
        let watched = Arc::clone(&channel);
        event_loop
            .execute(Box::new(move || {
                let future = bootstrap.bind_port(7100).unwrap();
                let snapshot = (future.is_done(), watched.is_registered(), watched.bind_count());
                *observed.lock() = Some(snapshot);
            }))
            .unwrap();
    }
    event_loop.run_pending();

    assert_eq!(*observed.lock(), Some((false, true, 0)), "注册内联完成，绑定尚未执行");
    assert_eq!(channel.bind_count(), 1);
    assert!(channel.is_active());
}

/// ## 绑定失败关闭通道
///
/// - **契约 (What)**：绑定失败以 `BindFailed` 浮出，关闭监听器优雅关闭通道。
#[test]
fn bind_failure_closes_the_channel() {
    let channel = Arc::new(EmbeddedChannel::new().with_bind_failure("address in use"));
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(ImmediateEventLoop))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.bind_port(80).unwrap();
    match future.cause() {
        Some(BootstrapError::BindFailed { address, reason, .. }) => {
            assert_eq!(address, BindAddress::any(80));
            assert_eq!(reason, "address in use");
        }
        other => panic!("期望绑定失败，实际：{other:?}"),
    }
    assert!(!channel.is_open());
    assert!(channel.events().contains(&ChannelEvent::Closed { forcibly: false }));
}

/// ## 绑定失败先关闭、后通知
///
/// - **意图 (Why)**：调用方在结果上挂的监听器（以及 `.await`/`wait` 的等待者）一旦看到 `BindFailed`，
///   就可能立即重试或释放资源，此时通道必须已经关闭；
/// - **逻辑 (How)**：手动事件循环让监听器在绑定任务运行之前就挂上；
/// - **契约 (What)**：监听器观察到 `bootstrap.bind_failed` 时通道已不再打开。
#[test]
fn bind_failure_is_reported_after_the_channel_closes() {
    let event_loop = ManualEventLoop::new();
    let channel = Arc::new(EmbeddedChannel::new().with_bind_failure("address in use"));
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(event_loop.clone()))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.bind_port(80).unwrap();
    let observed = Arc::new(parking_lot::Mutex::new(None));
    {
        let observed = Arc::clone(&observed);
        future.add_listener(move |done: &ChannelFuture| {
            let code = done.cause().map(|cause| cause.code());
            *observed.lock() = Some((code, done.channel().is_open()));
        });
    }
    event_loop.run_pending();

    assert_eq!(*observed.lock(), Some((Some("bootstrap.bind_failed"), false)));
    assert!(matches!(future.wait(), Err(BootstrapError::BindFailed { .. })));
    assert!(channel.events().contains(&ChannelEvent::Closed { forcibly: false }));
}

/// ## 挂起的注册随后失败
///
/// - **意图 (Why)**：`bind()` 返回时注册仍在排队，之后注册失败只能经由延后的绑定步骤传播；
/// - **契约 (What)**：结果携带注册失败原因，通道从未被绑定。
#[test]
fn pending_registration_failure_propagates_without_binding() {
    let event_loop = ManualEventLoop::new();
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(event_loop.clone()))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.bind_port(7250).unwrap();
    assert!(!future.is_done());
    channel.close_forcibly();
    event_loop.run_pending();

    assert!(matches!(
        future.cause(),
        Some(BootstrapError::RegistrationFailed { .. })
    ));
    assert_eq!(channel.bind_count(), 0);
    assert!(!channel.is_registered());
}

/// ## 事件循环拒绝绑定任务
///
/// - **意图 (Why)**：事件循环在注册完成与绑定提交之间关闭时，调用方必须得到确定的失败；
/// - **契约 (What)**：结果为 `BindFailed`，通道被强制关闭且从未绑定。
#[test]
fn rejected_bind_task_fails_and_force_closes() {
    let event_loop = ManualEventLoop::new();
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(event_loop.clone()))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.bind_port(7200).unwrap();
    // 注册任务已在队列中，关闭只影响之后的提交。
    event_loop.shut_down();
    assert_eq!(event_loop.run_pending(), 1);

    assert!(matches!(future.cause(), Some(BootstrapError::BindFailed { .. })));
    assert_eq!(channel.bind_count(), 0);
    assert_eq!(
        channel.events().last(),
        Some(&ChannelEvent::Closed { forcibly: true })
    );
}

/// ## 注册任务被拒绝
///
/// - **契约 (What)**：事件循环已关闭时注册以 `RegistrationFailed` 失败，通道被强制关闭。
#[test]
fn rejected_registration_task_fails_registration() {
    let event_loop = ManualEventLoop::new();
    event_loop.shut_down();
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(event_loop))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.bind_port(7300).unwrap();
    assert!(matches!(
        future.cause(),
        Some(BootstrapError::RegistrationFailed { .. })
    ));
    assert_eq!(channel.bind_count(), 0);
    assert!(!channel.is_open());
}

/// ## 端到端绑定
///
/// - **逻辑 (How)**：事件循环内联执行任务，`bind_host_port("127.0.0.1", 8080)` 之后 `.await` 结果；
/// - **契约 (What)**：结果成功、返回同一通道，绑定日志恰好一条且地址一致；选项与属性已写入。
#[test]
fn end_to_end_bind_invokes_channel_bind_exactly_once() {
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(Arc::new(ImmediateEventLoop))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap()
        .option(SO_BACKLOG, Some(128))
        .unwrap()
        .attr(TENANT, Some(String::from("tenant-a")))
        .unwrap();

    let future = bootstrap.bind_host_port("127.0.0.1", 8080).unwrap();
    let bound: ChannelRef = block_on(future).expect("绑定应当成功");
    assert_eq!(bound.id(), channel.id());

    let expected: BindAddress = "127.0.0.1:8080".parse().unwrap();
    let binds: Vec<_> = channel
        .events()
        .into_iter()
        .filter(|event| matches!(event, ChannelEvent::Bound(_)))
        .collect();
    assert_eq!(binds, vec![ChannelEvent::Bound(expected.clone())]);
    assert_eq!(channel.local_address(), Some(expected));
    assert_eq!(channel.option("SO_BACKLOG").and_then(|v| v.as_u64()), Some(128));
    assert_eq!(bound.attr(TENANT).as_deref(), Some("tenant-a"));
}

/// ## 每次绑定都创建新通道
///
/// - **契约 (What)**：同一引导器连续绑定两次，工厂被调用两次，每个通道各绑定一次。
#[test]
fn every_bind_creates_and_registers_a_fresh_channel() {
    let first = Arc::new(EmbeddedChannel::new());
    let second = Arc::new(EmbeddedChannel::new());
    let factory = FixedFactory::new([first.clone(), second.clone()]);
    let group = RecordingGroup::new(RegistrationMode::Delegate);
    let bootstrap = Bootstrap::new();
    bootstrap
        .group(group.clone())
        .unwrap()
        .channel_factory(factory.clone())
        .unwrap()
        .local_address_port(6000)
        .unwrap();

    assert!(bootstrap.bind().unwrap().is_success());
    assert!(bootstrap.bind_port(6001).unwrap().is_success());
    assert_eq!(factory.calls(), 2);
    assert_eq!(group.registrations(), 2);
    assert_eq!(first.local_address(), Some(BindAddress::any(6000)));
    assert_eq!(second.local_address(), Some(BindAddress::any(6001)));
}

/// 拒绝 `tenant` 属性缺失配置、并在初始化时追加标记的自定义钩子。
struct TenantInitializer;

impl ChannelInitializer for TenantInitializer {
    fn init(&self, channel: &ChannelRef, config: &ValidatedConfig) -> Result<(), BootstrapError> {
        spark_bootstrap::DefaultChannelInitializer.init(channel, config)?;
        channel.set_attribute("initialized", spark_bootstrap::AttributeValue::new(true));
        Ok(())
    }

    fn validate(&self, config: &BootstrapConfig) -> Result<(), BootstrapError> {
        config
            .attr(TENANT)
            .map(|_| ())
            .ok_or(BootstrapError::NotConfigured("tenant"))
    }
}

/// ## 自定义初始化钩子
///
/// - **契约 (What)**：追加校验在基础校验之后执行；`init` 对新通道生效。
#[test]
fn custom_initializer_extends_validation_and_init() {
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::with_initializer(TenantInitializer);
    assert!(matches!(
        bootstrap.register().err(),
        Some(BootstrapError::NotConfigured("group"))
    ));
    bootstrap
        .group(Arc::new(ImmediateEventLoop))
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();
    assert!(matches!(
        bootstrap.register().err(),
        Some(BootstrapError::NotConfigured("tenant"))
    ));

    bootstrap.attr(TENANT, Some(String::from("blue"))).unwrap();
    let future = bootstrap.register().unwrap();
    assert!(future.is_success());
    let registered: ChannelRef = channel.clone();
    assert_eq!(registered.attr(AttributeKey::<bool>::new("initialized")), Some(true));
}

/// 初始化阶段即失败的钩子。
struct FailingInitializer;

impl ChannelInitializer for FailingInitializer {
    fn init(&self, _channel: &ChannelRef, _config: &ValidatedConfig) -> Result<(), BootstrapError> {
        Err(BootstrapError::InvalidArgument("pipeline"))
    }
}

/// ## 初始化失败
///
/// - **契约 (What)**：通道被强制关闭，结果携带钩子返回的错误，事件循环组未收到注册。
#[test]
fn initializer_failure_force_closes_without_registration() {
    let group = RecordingGroup::new(RegistrationMode::Delegate);
    let channel = Arc::new(EmbeddedChannel::new());
    let bootstrap = Bootstrap::with_initializer(FailingInitializer);
    bootstrap
        .group(group.clone())
        .unwrap()
        .channel_factory(FixedFactory::single(&channel))
        .unwrap();

    let future = bootstrap.register().unwrap();
    assert!(matches!(
        future.cause(),
        Some(BootstrapError::InvalidArgument("pipeline"))
    ));
    assert_eq!(group.registrations(), 0);
    assert_eq!(channel.events(), vec![ChannelEvent::Closed { forcibly: true }]);
}
