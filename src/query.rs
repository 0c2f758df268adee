//! Name normalization and the legacy DNS collaborator consulted when the
//! overlay holds no record.

use tokio::net::lookup_host;

use crate::utils::error::{Error, Result};

/// Canonical form a name is hashed under: lowercased, leading `www.`
/// stripped.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_ascii_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// The external authoritative resolver.
#[tonic::async_trait]
pub trait LegacyDns: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Vec<String>>;
}

/// Resolver backed by the operating system.
pub struct SystemDns;

#[tonic::async_trait]
impl LegacyDns for SystemDns {
    async fn resolve(&self, name: &str) -> Result<Vec<String>> {
        let addrs = lookup_host((name, 0u16)).await.map_err(|e| Error::Resolve {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let mut ips: Vec<String> = Vec::new();
        for addr in addrs {
            let ip = addr.ip().to_string();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
        if ips.is_empty() {
            return Err(Error::Resolve {
                name: name.to_string(),
                reason: "no addresses returned".to_string(),
            });
        }
        Ok(ips)
    }
}
