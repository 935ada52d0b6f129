//! Construction of fresh, configured and started connection handles.
//!
//! 构建全新的、已配置并已启动的连接句柄。

use super::check;
use crate::{
    bus::{Bus, BusAddress, BusConnection},
    config::ConnectionConfig,
    error::{Error, Result, SetupStep},
};
use tracing::{error, info};

/// Builds one handle per call. None of the steps performs blocking I/O;
/// connecting happens once the handle is attached to the event loop.
///
/// 每次调用构建一个句柄。所有步骤都不执行阻塞I/O；连接在句柄附加到事件循环后进行。
pub struct BusConnectionFactory<'a, B: Bus> {
    bus: &'a B,
    config: &'a ConnectionConfig,
}

impl<'a, B: Bus> BusConnectionFactory<'a, B> {
    pub fn new(bus: &'a B, config: &'a ConnectionConfig) -> Self {
        Self { bus, config }
    }

    /// Creates a client handle for the configured address and starts it.
    ///
    /// 为配置的地址创建客户端句柄并启动它。
    pub fn create(&self) -> Result<B::Connection> {
        let mut connection = self.bus.new_connection().map_err(|cause| {
            error!(step = %SetupStep::NewConnection, error = %cause, "Setup step failed");
            Error::SetupFailed {
                step: SetupStep::NewConnection,
                cause,
            }
        })?;
        let handle = connection.id();

        let address = check(
            handle,
            SetupStep::SetAddress,
            BusAddress::parse(&self.config.address)
                .and_then(|address| connection.set_address(&address).map(|()| address)),
        )?;
        check(handle, SetupStep::SetBusClient, connection.set_bus_client(true))?;
        check(
            handle,
            SetupStep::NegotiateCredentials,
            connection.negotiate_creds(self.config.credentials),
        )?;
        check(
            handle,
            SetupStep::SetWatchBind,
            connection.set_watch_bind(self.config.watch_bind),
        )?;
        check(
            handle,
            SetupStep::SetConnectedSignal,
            connection.set_connected_signal(self.config.connected_signal),
        )?;
        check(handle, SetupStep::Start, connection.start())?;

        info!(%handle, %address, "Connection handle started");
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusOp, MemoryBus};
    use parking_lot::Mutex;
    use std::{io, sync::Arc};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_create_runs_configuration_in_order() {
        let bus = MemoryBus::new();
        let config = ConnectionConfig::default();
        let connection = BusConnectionFactory::new(&bus, &config).create().unwrap();

        assert_eq!(
            bus.ops_for(connection.id()),
            vec![
                BusOp::NewConnection,
                BusOp::SetAddress,
                BusOp::SetBusClient,
                BusOp::NegotiateCreds,
                BusOp::SetWatchBind,
                BusOp::SetConnectedSignal,
                BusOp::Start,
            ]
        );
    }

    #[test]
    fn test_invalid_address_fails_set_address() {
        let bus = MemoryBus::new();
        let config = ConnectionConfig {
            address: "tcp:host=localhost".into(),
            ..ConnectionConfig::default()
        };

        let err = BusConnectionFactory::new(&bus, &config).create().unwrap_err();
        assert!(matches!(
            err,
            Error::SetupFailed {
                step: SetupStep::SetAddress,
                ..
            }
        ));
        // The half-built handle is released on the error path.
        assert!(bus.open_handles().is_empty());
    }

    #[test]
    fn test_each_step_failure_is_reported() {
        let cases = [
            (BusOp::NewConnection, SetupStep::NewConnection),
            (BusOp::SetAddress, SetupStep::SetAddress),
            (BusOp::SetBusClient, SetupStep::SetBusClient),
            (BusOp::NegotiateCreds, SetupStep::NegotiateCredentials),
            (BusOp::SetWatchBind, SetupStep::SetWatchBind),
            (BusOp::SetConnectedSignal, SetupStep::SetConnectedSignal),
            (BusOp::Start, SetupStep::Start),
        ];
        for (op, expected) in cases {
            let bus = MemoryBus::new();
            bus.fail_next(op);
            let config = ConnectionConfig::default();
            match BusConnectionFactory::new(&bus, &config).create() {
                Err(Error::SetupFailed { step, .. }) => assert_eq!(step, expected),
                other => panic!("{op}: expected SetupFailed, got {:?}", other.map(|c| c.id())),
            }
        }
    }

    #[test]
    fn test_each_step_is_logged_once() {
        let bus = MemoryBus::new();
        let config = ConnectionConfig::default();
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            BusConnectionFactory::new(&bus, &config).create().unwrap();
        });

        let logs = logs.contents();
        for step in [
            SetupStep::SetAddress,
            SetupStep::SetBusClient,
            SetupStep::NegotiateCredentials,
            SetupStep::SetWatchBind,
            SetupStep::SetConnectedSignal,
            SetupStep::Start,
        ] {
            let needle = format!("step={step}");
            assert_eq!(logs.matches(&needle).count(), 1, "{step} in:\n{logs}");
        }
    }
}
