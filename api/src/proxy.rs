//! 可信代理与客户端 IP

use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnet::IpNet;

use crate::error::RouterError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// 允许设置转发头的代理网段
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNet>,
}

impl TrustedProxies {
    /// 解析 IP 或 CIDR 列表，任何一项无效都返回错误
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, RouterError> {
        let networks = entries
            .iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry
                    .parse::<IpNet>()
                    .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                    .map_err(|_| RouterError::InvalidTrustedProxy {
                        entry: entry.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { networks })
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// 解析客户端 IP
    ///
    /// 只有对端是可信代理时才读取转发头。`X-Forwarded-For` 从右往左取第一个不可信的地址，
    /// 全部可信时取最左边的地址。
    pub fn client_ip(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        let peer = peer.to_canonical();
        if !self.is_trusted(peer) {
            return peer;
        }

        if let Some(ip) = self.from_forwarded_for(headers) {
            return ip;
        }

        headers
            .get(X_REAL_IP)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
            .unwrap_or(peer)
    }

    fn from_forwarded_for(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
        let hops = value
            .split(',')
            .map(|hop| hop.trim().parse::<IpAddr>().map(|ip| ip.to_canonical()))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        hops.iter()
            .rev()
            .find(|ip| !self.is_trusted(**ip))
            .or_else(|| hops.first())
            .copied()
    }
}
