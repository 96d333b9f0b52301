//! End-to-end tests running a real server against the pooled client.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use svcwire_client::{ClientConfig, ClientError, ClientPool, LoginConfig};
use svcwire_protocol::is_error_body;
use svcwire_server::{
    login_operation, OperationError, RegistryRouter, Server, ServerConfig, TokenValidator,
    LOGIN_OP,
};
use tokio::net::TcpListener;

/// Binds a listener on an ephemeral port, serves `router` on it and
/// returns the endpoint string clients should dial.
async fn start_server(router: RegistryRouter, login: bool) -> (Arc<Server>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::new(Server::new(ServerConfig::default(), Arc::new(router)));
    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(listener).await.unwrap();
    });

    let endpoint = if login {
        format!("svcwire://{}?login=true", addr)
    } else {
        format!("svcwire://{}", addr)
    };
    (server, endpoint)
}

fn echo_router() -> RegistryRouter {
    let router = RegistryRouter::new();
    router.register_fn("svc.ping", |_| async move { Ok(Bytes::from_static(b"pong")) });
    router.register_fn("svc.echo", |body| async move { Ok(body) });
    router
}

#[tokio::test]
async fn test_ping_and_echo_roundtrip() {
    let (_server, endpoint) = start_server(echo_router(), false).await;
    let pool = ClientPool::new(ClientConfig::default());

    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.ping"), Bytes::new())
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"pong");

    let reply = pool
        .request(
            &endpoint,
            Bytes::from_static(b"svc.echo"),
            Bytes::from_static(b"payload"),
        )
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"payload");
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn test_unroutable_operation_gets_error_reply() {
    let (_server, endpoint) = start_server(echo_router(), false).await;
    let pool = ClientPool::new(ClientConfig::default());

    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.nope"), Bytes::new())
        .await
        .unwrap();
    assert!(is_error_body(&reply.body));
    assert!(reply.body.starts_with(b"CSE.TCP"));

    // The connection survives a routing failure.
    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.ping"), Bytes::new())
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"pong");
}

#[tokio::test]
async fn test_operation_failure_gets_error_reply() {
    let router = echo_router();
    router.register_fn("svc.fail", |_| async move {
        Err(OperationError::new("backend unavailable"))
    });
    let (_server, endpoint) = start_server(router, false).await;
    let pool = ClientPool::new(ClientConfig::default());

    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.fail"), Bytes::new())
        .await
        .unwrap();
    assert!(is_error_body(&reply.body));
    assert!(reply
        .body
        .ends_with(b"backend unavailable"));
}

#[tokio::test]
async fn test_pipelined_requests_complete_out_of_order() {
    let router = echo_router();
    router.register_fn("svc.slow", |body| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(body)
    });
    let (_server, endpoint) = start_server(router, false).await;
    let pool = ClientPool::new(ClientConfig::default());

    let slow = pool
        .submit(
            &endpoint,
            Bytes::from_static(b"svc.slow"),
            Bytes::from_static(b"first"),
        )
        .unwrap();
    let fast = pool
        .request(
            &endpoint,
            Bytes::from_static(b"svc.echo"),
            Bytes::from_static(b"second"),
        )
        .await
        .unwrap();
    assert_eq!(fast.body.as_ref(), b"second");

    // The slow request still completes with its own payload.
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.body.as_ref(), b"first");
}

#[tokio::test]
async fn test_login_handshake_accepts_valid_token() {
    let router = echo_router();
    let validator = TokenValidator::new(vec![TokenValidator::hash_token("s3cret")]);
    router.register(LOGIN_OP, login_operation(validator));
    let (_server, endpoint) = start_server(router, true).await;

    let config = ClientConfig::new().with_login(LoginConfig::new(
        Bytes::from_static(LOGIN_OP.as_bytes()),
        Bytes::from_static(b"s3cret"),
    ));
    let pool = ClientPool::new(config);

    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.ping"), Bytes::new())
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"pong");
}

#[tokio::test]
async fn test_login_handshake_rejects_bad_token() {
    let router = echo_router();
    let validator = TokenValidator::new(vec![TokenValidator::hash_token("s3cret")]);
    router.register(LOGIN_OP, login_operation(validator));
    let (_server, endpoint) = start_server(router, true).await;

    let config = ClientConfig::new().with_login(LoginConfig::new(
        Bytes::from_static(LOGIN_OP.as_bytes()),
        Bytes::from_static(b"wrong"),
    ));
    let pool = ClientPool::new(config);

    let err = pool
        .request(&endpoint, Bytes::from_static(b"svc.ping"), Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::LoginFailed(_, _)));
}

#[tokio::test]
async fn test_malformed_frame_closes_server_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (_server, endpoint) = start_server(echo_router(), false).await;
    let addr = endpoint.trim_start_matches("svcwire://").to_string();

    // Raw socket writing bytes that cannot be framed: the server must
    // close the connection rather than resynchronize.
    let mut raw = tokio::net::TcpStream::connect(&addr).await.unwrap();
    raw.write_all(b"GARBAGEGARBAGEGARBAGEGARBAGE").await.unwrap();

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), raw.read(&mut buf))
        .await
        .expect("server left malformed connection open")
        .unwrap();
    assert_eq!(n, 0, "expected the server to close the connection");

    // A well-formed connection to the same server is unaffected.
    let pool = ClientPool::new(ClientConfig::default());
    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.ping"), Bytes::new())
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"pong");
}

#[tokio::test]
async fn test_server_shutdown_stops_serving() {
    let (server, endpoint) = start_server(echo_router(), false).await;
    let pool = ClientPool::new(ClientConfig::default());

    let reply = pool
        .request(&endpoint, Bytes::from_static(b"svc.ping"), Bytes::new())
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"pong");
    assert_eq!(
        server
            .stats()
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    server.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!server.is_running());
}
