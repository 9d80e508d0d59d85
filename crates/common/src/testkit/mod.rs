/// Lightweight test harness for multi-peer integration tests
///
/// Peers listen on ephemeral localhost ports and share one in-process DHT,
/// so whole publish/subscribe/seed flows run inside a single test without
/// any external infrastructure.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_seed_and_fetch() -> anyhow::Result<()> {
///     let mut net = TestNetwork::new();
///     net.add_peer("alice").await?;
///     net.add_peer("bob").await?;
///
///     let entry = net.peer("alice").unwrap().add_bytes(b"hello", "hi.txt").await?;
///     let data = net.peer("bob").unwrap().peer().download_file(&entry).await?;
///     assert_eq!(data, b"hello");
///
///     net.shutdown().await?;
///     Ok(())
/// }
/// ```
mod network;
mod peer;

pub use network::TestNetwork;
pub use peer::TestPeer;
