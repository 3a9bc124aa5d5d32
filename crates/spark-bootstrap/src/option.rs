//! 通道选项：带类型的键与统一的值表示。
//!
//! # 设计目标（Why）
//! - 调用方以强类型键（如 [`SO_BACKLOG`]）书写配置，编译期阻止“给布尔选项塞字符串”；
//! - 存储与传递给通道时统一收敛到 [`OptionValue`]，通道实现只需匹配有限的几种标量。
//!
//! # 契约（What）
//! - 选项以名称唯一标识，名称相同即视为同一选项；
//! - 通道对不认识的选项返回 `Ok(false)`，由初始化钩子记录告警后继续。

use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    time::Duration,
};

/// 选项取值的统一表示。
///
/// 仅覆盖套接字选项常见的标量类型；复合结构请在通道实现中拆分为多个选项。
///
/// 相等与哈希按数值比较整数：`Integer(128)` 与 `Unsigned(128)` 相等，
/// 因此声明式配置写入的整数与强类型键写入的同名选项可以直接比较。
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum OptionValue {
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Duration(Duration),
    Text(Cow<'static, str>),
}

/// 比较与哈希使用的规范形式。
#[derive(PartialEq, Eq, Hash)]
enum Canonical<'a> {
    Boolean(bool),
    Number(i128),
    Duration(Duration),
    Text(&'a str),
}

impl OptionValue {
    fn canonical(&self) -> Canonical<'_> {
        match self {
            Self::Boolean(value) => Canonical::Boolean(*value),
            Self::Integer(value) => Canonical::Number(i128::from(*value)),
            Self::Unsigned(value) => Canonical::Number(i128::from(*value)),
            Self::Duration(value) => Canonical::Duration(*value),
            Self::Text(value) => Canonical::Text(value),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// 以 `u64` 读取；非负整数同样可读。
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(value) => Some(*value),
            Self::Integer(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Unsigned(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for OptionValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for OptionValue {}

impl Hash for OptionValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Unsigned(value) => write!(f, "{value}"),
            Self::Duration(value) => write!(f, "{}ms", value.as_millis()),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

macro_rules! option_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for OptionValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

option_value_from! {
    bool => Boolean,
    i32 => Integer,
    i64 => Integer,
    u16 => Unsigned,
    u32 => Unsigned,
    u64 => Unsigned,
    Duration => Duration,
    String => Text,
    &'static str => Text,
}

/// 带类型的通道选项键。
///
/// `T` 只在编译期约束取值类型，运行期仅保留名称；因此键是 `Copy` 的常量。
pub struct ChannelOption<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ChannelOption<T> {
    /// 以名称声明一个选项键。
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ChannelOption<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ChannelOption<T> {}

impl<T> fmt::Debug for ChannelOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChannelOption").field(&self.name).finish()
    }
}

impl<T> fmt::Display for ChannelOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 监听队列长度。
pub const SO_BACKLOG: ChannelOption<u32> = ChannelOption::new("SO_BACKLOG");
/// 允许地址复用。
pub const SO_REUSEADDR: ChannelOption<bool> = ChannelOption::new("SO_REUSEADDR");
/// TCP 保活。
pub const SO_KEEPALIVE: ChannelOption<bool> = ChannelOption::new("SO_KEEPALIVE");
/// 接收缓冲区大小（字节）。
pub const SO_RCVBUF: ChannelOption<u32> = ChannelOption::new("SO_RCVBUF");
/// 发送缓冲区大小（字节）。
pub const SO_SNDBUF: ChannelOption<u32> = ChannelOption::new("SO_SNDBUF");
/// 关闭时的 linger 时长。
pub const SO_LINGER: ChannelOption<Duration> = ChannelOption::new("SO_LINGER");
/// 禁用 Nagle 算法。
pub const TCP_NODELAY: ChannelOption<bool> = ChannelOption::new("TCP_NODELAY");
/// 建连超时。
pub const CONNECT_TIMEOUT: ChannelOption<Duration> = ChannelOption::new("CONNECT_TIMEOUT");
/// 注册后是否自动开始读取。
pub const AUTO_READ: ChannelOption<bool> = ChannelOption::new("AUTO_READ");
