use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use crate::error::BootstrapError;

/// `BindAddress` 描述通道绑定或连接的目标地址。
///
/// # 设计初衷（Why）
/// - 构建器阶段不允许执行阻塞 I/O，因此主机名不在此处解析，而是以 [`BindAddress::Host`]
///   原样交给通道实现，在其所属事件循环上完成解析；
/// - IP 字面量直接落入 `V4`/`V6` 变体，调用方在日志里看到的就是最终绑定的地址。
///
/// # 契约定义（What）
/// - `V4`/`V6` 存储原始字节与端口，语义等同于 `std::net::SocketAddr`；
/// - `Host` 保存未解析主机名，`Arc<str>` 让克隆保持廉价；
/// - `Display` 输出 `ip:port`、`[v6]:port` 或 `host:port`，可直接作为日志字段与指标标签。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未对主机名做合法性校验，只拒绝空串；非法主机名会在通道绑定阶段以 `BindFailed` 暴露；
/// - IPv6 输出沿用标准库格式（含零压缩），与 `SocketAddr` 的 `Display` 保持一致。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BindAddress {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
    /// 尚未解析的主机名。
    Host { host: Arc<str>, port: u16 },
}

impl BindAddress {
    /// 通配地址 `0.0.0.0:port`，对应“仅指定端口”的便捷重载。
    pub const fn any(port: u16) -> Self {
        Self::V4 {
            addr: [0, 0, 0, 0],
            port,
        }
    }

    /// 根据主机与端口构造地址：IP 字面量被解析，其余主机名保持未解析。
    pub fn from_host_port(host: &str, port: u16) -> Result<Self, BootstrapError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(BootstrapError::InvalidArgument("host"));
        }
        let literal = host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(host);
        Ok(match IpAddr::from_str(literal) {
            Ok(ip) => Self::from(SocketAddr::new(ip, port)),
            Err(_) => Self::Host {
                host: Arc::from(host),
                port,
            },
        })
    }

    /// 返回端口号。
    pub const fn port(&self) -> u16 {
        match self {
            Self::V4 { port, .. } | Self::V6 { port, .. } | Self::Host { port, .. } => *port,
        }
    }

    /// 若地址已解析，则转换为标准库表示。
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::V4 { addr, port } => {
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(*addr)), *port))
            }
            Self::V6 { addr, port } => {
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(*addr)), *port))
            }
            Self::Host { .. } => None,
        }
    }

    /// 是否仍是未解析的主机名。
    pub const fn is_unresolved(&self) -> bool {
        matches!(self, Self::Host { .. })
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { host, port } => write!(f, "{host}:{port}"),
            resolved => match resolved.to_socket_addr() {
                Some(addr) => write!(f, "{addr}"),
                None => Ok(()),
            },
        }
    }
}

impl From<SocketAddr> for BindAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

/// 解析 `host:port`、`[v6]:port` 或纯端口字符串。
///
/// 纯端口等价于 [`BindAddress::any`]；主机部分交由 [`BindAddress::from_host_port`] 处理。
impl FromStr for BindAddress {
    type Err = BootstrapError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(port) = value.parse::<u16>() {
            return Ok(Self::any(port));
        }
        if let Ok(addr) = value.parse::<SocketAddr>() {
            return Ok(Self::from(addr));
        }
        let (host, port) = value
            .rsplit_once(':')
            .ok_or(BootstrapError::InvalidArgument("port"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| BootstrapError::InvalidArgument("port"))?;
        Self::from_host_port(host, port)
    }
}
