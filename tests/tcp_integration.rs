//! Integration tests over loopback TCP
//! Run with: cargo test --features tcp

#[cfg(feature = "tcp")]
mod tcp_tests {
    use rri_frame::transport::{ShutdownCoordinator, TcpServerConfig, serve};
    use rri_frame::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    /// Helper to get both ends of a loopback connection
    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    /// Helper to start the echo server on an ephemeral port
    async fn start_server(
        framing: FramingConfig,
        metrics: Arc<Metrics>,
    ) -> (SocketAddr, Arc<ShutdownCoordinator>, JoinHandle<anyhow::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let config = TcpServerConfig::new(addr.to_string())
            .with_framing(framing)
            .with_metrics(metrics);
        let handle = tokio::spawn(serve(listener, config, shutdown.clone()));
        (addr, shutdown, handle)
    }

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let (client, server) = tcp_pair().await;
        let server_addr = server.local_addr().unwrap();
        let config = FramingConfig::new();
        let client = TcpFramedConnection::from_tcp(client, &config).unwrap();
        let mut server = TcpFramedConnection::from_tcp(server, &config).unwrap();

        assert_eq!(client.remote_address(), server_addr);
        assert!(client.to_string().contains(&server_addr.to_string()));

        for msg in ["", "action: LOGIN\nuser: DENIC-1000-TEST", "ßüö"] {
            client.write_frame(msg).await.unwrap();
            let result = server.read_frame(Some(1024)).await.unwrap();
            assert_eq!(result, FrameResult::Message(msg.to_string()));
        }
    }

    #[tokio::test]
    async fn test_peer_close_before_header() {
        let (client, server) = tcp_pair().await;
        let mut server = TcpFramedConnection::from_tcp(server, &FramingConfig::new()).unwrap();

        drop(client);

        let err = server.read_frame(None).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_peer_close_inside_header() {
        let (mut client, server) = tcp_pair().await;
        let mut server = TcpFramedConnection::from_tcp(server, &FramingConfig::new()).unwrap();

        client.write_all(&[0, 0, 0]).await.unwrap();
        drop(client);

        let err = server.read_frame(None).await.unwrap_err();
        assert!(matches!(err, FrameError::TruncatedHeader { received: 3 }));
    }

    #[tokio::test]
    async fn test_peer_close_inside_payload() {
        let (mut client, server) = tcp_pair().await;
        let mut server = TcpFramedConnection::from_tcp(server, &FramingConfig::new()).unwrap();

        client.write_all(b"\0\0\0\x08half").await.unwrap();
        drop(client);

        let err = server.read_frame(None).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteFrame { expected: 8, received: 4 }
        ));
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (client, server) = tcp_pair().await;
        let config = FramingConfig::new();
        let mut client = TcpFramedConnection::from_tcp(client, &config).unwrap();
        let mut server = TcpFramedConnection::from_tcp(server, &config).unwrap();
        let closer = server.writer();

        let reader = tokio::spawn(async move { server.read_frame(None).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_secs(1), closer.close())
            .await
            .expect("close must not wait for the blocked read");

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .expect("blocked read must fail after close")
            .unwrap();
        assert!(matches!(result, Err(FrameError::Closed)));

        // both halves released: the peer sees a clean end of stream
        let err = client.read_frame(None).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_releases_socket_without_pending_read() {
        let (mut peer, local) = tcp_pair().await;
        let conn = TcpFramedConnection::from_tcp(local, &FramingConfig::new()).unwrap();

        conn.close().await;

        // the first write may still be accepted; the reset fails later ones
        let mut writes = Vec::new();
        for _ in 0..5 {
            writes.push(peer.write_all(b"\0\0\0\x01x").await);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(
            writes.iter().any(|w| w.is_err()),
            "peer writes after close: {:?}",
            writes
        );
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_close_twice_and_write_after_close() {
        let (_client, server) = tcp_pair().await;
        let server = TcpFramedConnection::from_tcp(server, &FramingConfig::new()).unwrap();

        server.close().await;
        server.close().await;
        assert!(server.is_closed());

        let err = server.write_frame("late answer").await.unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }

    #[tokio::test]
    async fn test_echo_server() {
        let metrics = Arc::new(Metrics::new());
        let (addr, shutdown, handle) = start_server(FramingConfig::new(), metrics.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut conn = TcpFramedConnection::from_tcp(stream, &FramingConfig::new()).unwrap();

        conn.write_frame("action: CHECK\ndomain: example.de").await.unwrap();
        let answer = conn.read_frame(None).await.unwrap();
        assert_eq!(answer.text(), "action: CHECK\ndomain: example.de");

        conn.close().await;
        shutdown.shutdown();
        handle.await.unwrap().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.frames_read, 1);
        assert_eq!(snapshot.frames_written, 1);
    }

    #[tokio::test]
    async fn test_server_closes_after_too_long_frame() {
        let metrics = Arc::new(Metrics::new());
        let framing = FramingConfig::new().with_max_payload_size(16);
        let (addr, shutdown, handle) = start_server(framing, metrics.clone()).await;

        // announce a large frame but never send its payload
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&FrameCodec::encode_length(100)).await.unwrap();
        let mut reader = FrameReader::new(stream, &FramingConfig::new());

        let answer = reader.read_frame(None).await.unwrap();
        assert_eq!(answer.text(), "error: MessageTooLong(100)");
        let err = reader.read_frame(None).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));

        shutdown.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(metrics.snapshot().frames_too_long, 1);
    }

    #[tokio::test]
    async fn test_server_keeps_connection_after_bad_encoding() {
        let metrics = Arc::new(Metrics::new());
        let (addr, shutdown, handle) = start_server(FramingConfig::new(), metrics.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, &FramingConfig::new());

        write_half.write_all(b"\0\0\0\x02\xc3\x28").await.unwrap();
        let answer = reader.read_frame(None).await.unwrap();
        assert_eq!(answer.text(), "error: MessageEncodingIllegal");

        FrameCodec::write_frame(&mut write_half, "still here").await.unwrap();
        let answer = reader.read_frame(None).await.unwrap();
        assert_eq!(answer.text(), "still here");

        drop(write_half);
        shutdown.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(metrics.snapshot().frames_undecodable, 1);
    }

    #[tokio::test]
    async fn test_server_drops_silent_connection_after_login_timeout() {
        let metrics = Arc::new(Metrics::new());
        let framing = FramingConfig::new().with_first_frame_timeout(Duration::from_millis(200));
        let (addr, shutdown, handle) = start_server(framing, metrics.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut conn = TcpFramedConnection::from_tcp(stream, &FramingConfig::new()).unwrap();

        let err = timeout(Duration::from_secs(2), conn.read_frame(None))
            .await
            .expect("server should give up after the grace period")
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(metrics.snapshot().closed_without_login, 1);

        shutdown.shutdown();
        handle.await.unwrap().unwrap();
    }
}
