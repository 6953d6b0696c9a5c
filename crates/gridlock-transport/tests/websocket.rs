//! Integration tests for the WebSocket transport.
//!
//! A real listener on an OS-assigned port and a real tungstenite client,
//! so frames actually cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use gridlock_transport::{Connection, Transport, WebSocketTransport};
    use tokio_tungstenite::tungstenite::Message;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a transport on a random port and connects one client to it.
    async fn connected_pair() -> (gridlock_transport::WebSocketConnection, Client) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have addr");

        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let conn = server.await.expect("task should complete");
        (conn, client)
    }

    #[tokio::test]
    async fn test_websocket_send_receive_both_directions() {
        let (conn, mut client) = connected_pair().await;
        assert!(conn.id().into_inner() > 0);

        conn.send(br#"{"type":"hello"}"#).await.expect("send should succeed");
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "utf-8 frames go out as text");
        assert_eq!(msg.into_data().as_ref(), br#"{"type":"hello"}"#);

        client
            .send(Message::Binary(b"from client".to_vec().into()))
            .await
            .unwrap();
        let received = conn.recv().await.expect("recv ok").expect("has data");
        assert_eq!(received, b"from client");

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_text_frames_are_received_as_bytes() {
        let (conn, mut client) = connected_pair().await;
        client.send(Message::Text("ping".into())).await.unwrap();
        let received = conn.recv().await.unwrap().unwrap();
        assert_eq!(received, b"ping");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (conn, mut client) = connected_pair().await;
        client.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending_does_not_block() {
        let (conn, mut client) = connected_pair().await;
        let conn = Arc::new(conn);

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        // Give the reader time to park on the stream lock.
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), conn.send(b"broadcast"))
            .await
            .expect("send must not wait for the pending recv")
            .unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"broadcast");

        client.send(Message::Close(None)).await.unwrap();
        let closed = reader.await.unwrap().unwrap();
        assert!(closed.is_none());
    }
}
