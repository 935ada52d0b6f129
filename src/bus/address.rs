//! Parsing of bus transport locators.
//!
//! 总线传输地址的解析。

use crate::error::{BusError, BusResult};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// A parsed `unix:path=...` transport locator.
///
/// 已解析的 `unix:path=...` 传输地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusAddress {
    raw: String,
    socket_path: PathBuf,
}

impl BusAddress {
    /// Parses a locator of the form `unix:path=/absolute/socket[,key=value...]`.
    ///
    /// Keys other than `path` (for example `guid`) are accepted and ignored.
    ///
    /// 解析 `unix:path=/absolute/socket[,key=value...]` 形式的地址。
    /// 除 `path` 以外的键（例如 `guid`）会被接受并忽略。
    pub fn parse(raw: &str) -> BusResult<Self> {
        let invalid = |reason| BusError::InvalidAddress {
            address: raw.to_string(),
            reason,
        };

        let (transport, params) = raw
            .split_once(':')
            .ok_or_else(|| invalid("missing transport"))?;
        if transport != "unix" {
            return Err(invalid("only the unix transport is supported"));
        }

        let mut socket_path = None;
        for pair in params.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid("malformed key=value pair"))?;
            if key == "path" {
                if !value.starts_with('/') {
                    return Err(invalid("socket path must be absolute"));
                }
                socket_path = Some(PathBuf::from(value));
            }
        }

        let socket_path = socket_path.ok_or_else(|| invalid("missing path key"))?;
        Ok(Self {
            raw: raw.to_string(),
            socket_path,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The filesystem location of the listening socket.
    /// 监听套接字在文件系统中的位置。
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system_bus_address() {
        let addr = BusAddress::parse("unix:path=/run/dbus/system_bus_socket").unwrap();
        assert_eq!(addr.socket_path(), Path::new("/run/dbus/system_bus_socket"));
        assert_eq!(addr.to_string(), "unix:path=/run/dbus/system_bus_socket");
    }

    #[test]
    fn test_parse_ignores_extra_keys() {
        let addr = BusAddress::parse("unix:path=/tmp/bus,guid=0123abcd").unwrap();
        assert_eq!(addr.socket_path(), Path::new("/tmp/bus"));
    }

    #[test]
    fn test_parse_rejects_bad_locators() {
        for raw in [
            "",
            "/run/dbus/system_bus_socket",
            "tcp:host=localhost,port=1234",
            "unix:abstract=/tmp/bus",
            "unix:path=relative/socket",
            "unix:path",
        ] {
            assert!(
                matches!(BusAddress::parse(raw), Err(BusError::InvalidAddress { .. })),
                "{raw} should be rejected"
            );
        }
    }
}
