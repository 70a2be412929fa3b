mod common;

use async_trait::async_trait;
use fleet_runner::error::Result;
use fleet_runner::network::{LegacyPing, PlayerCounter, PortMapper};
use mockall::mock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

mock! {
    pub Mapper {}

    #[async_trait]
    impl PortMapper for Mapper {
        async fn is_open(&self, port: u16) -> Result<bool>;
        async fn open(&self, port: u16, description: &str) -> Result<()>;
        async fn close(&self, port: u16) -> Result<()>;
    }
}

fn kick_packet(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut packet = vec![0xFF];
    packet.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        packet.extend_from_slice(&unit.to_be_bytes());
    }
    packet
}

async fn serve_once(reply: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 2];
        socket.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0xFE, 0x01]);
        socket.write_all(&reply).await.unwrap();
    });
    port
}

#[tokio::test]
async fn test_legacy_ping() -> Result<()> {
    let port = serve_once(kick_packet("§1\u{0}127\u{0}1.18.2\u{0}A Fleet Server\u{0}3\u{0}20")).await;

    let count = LegacyPing::new().query(port).await?;
    assert_eq!(count.online, 3);
    assert_eq!(count.max, 20);
    assert_eq!(count.version, "1.18.2");
    assert_eq!(count.motd, "A Fleet Server");

    Ok(())
}

#[tokio::test]
async fn test_legacy_ping_rejects_garbage() {
    let port = serve_once(vec![0x00, 0x01, 0x02]).await;
    assert!(LegacyPing::new().query(port).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_port_forward_follows_run() -> Result<()> {
    use common::*;
    use fleet_runner::plan::{Plan, PlanTier};
    use fleet_runner::runtime::RuntimeVersion;
    use fleet_runner::server::{SERVER_ARTIFACT, StopMethod};
    use fleet_runner::{InstanceRegistry, LifecycleStatus};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    let temp = tempfile::tempdir()?;
    let config = test_config(temp.path());
    install_runtime(&config, RuntimeVersion::Latest, SERVER_SCRIPT);

    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let mut mapper = MockMapper::new();
    mapper.expect_is_open().withf(|port| *port == 1).returning(|_| Ok(false));
    {
        let opened = Arc::clone(&opened);
        mapper
            .expect_open()
            .withf(|port, description| *port == 1 && description == "alice")
            .times(1)
            .returning(move |_, _| {
                opened.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
    {
        let closed = Arc::clone(&closed);
        mapper
            .expect_close()
            .withf(|port| *port == 1)
            .times(1)
            .returning(move |_| {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }

    let registry = InstanceRegistry::open(context_with(config, Arc::new(mapper)))?;
    let instance = registry.add(&Plan::new(PlanTier::Basic, "alice"))?;
    std::fs::write(instance.dir().join(SERVER_ARTIFACT), b"jar")?;

    assert!(instance.start().await);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(wait_for_status(&instance, LifecycleStatus::Online, Duration::from_secs(10)).await);
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    assert!(instance.stop(StopMethod::Normal).await);
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_port_forward_closed_when_launch_fails() -> Result<()> {
    use common::*;
    use fleet_runner::plan::{Plan, PlanTier};
    use fleet_runner::runtime::RuntimeVersion;
    use fleet_runner::server::SERVER_ARTIFACT;
    use fleet_runner::{InstanceRegistry, LifecycleStatus};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let temp = tempfile::tempdir()?;
    let config = test_config(temp.path());
    install_runtime(&config, RuntimeVersion::Latest, SERVER_SCRIPT);

    let closed = Arc::new(AtomicUsize::new(0));
    let mut mapper = MockMapper::new();
    mapper.expect_is_open().returning(|_| Ok(false));
    mapper.expect_open().times(1).returning(|_, _| Ok(()));
    {
        let closed = Arc::clone(&closed);
        mapper.expect_close().times(1).returning(move |_| {
            closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let registry = InstanceRegistry::open(context_with(config, Arc::new(mapper)))?;
    let instance = registry.add(&Plan::new(PlanTier::Basic, "alice"))?;
    std::fs::write(instance.dir().join(SERVER_ARTIFACT), b"jar")?;
    // The EULA cannot be accepted
    std::fs::remove_file(instance.dir().join("eula.txt"))?;
    std::fs::create_dir(instance.dir().join("eula.txt"))?;

    assert!(!instance.start().await);
    assert_eq!(instance.status(), LifecycleStatus::Offline);
    assert!(!instance.is_running());
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    Ok(())
}
