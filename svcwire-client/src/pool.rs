//! Connection pool and timeout sweeper.
//!
//! The pool holds one `ClientConnection` per endpoint string, created
//! lazily on first use and never evicted: idle connections are reused,
//! not recycled. A single background sweeper task walks every pooled
//! connection's pending table on a fixed period and fails expired
//! requests, independent of connection health.

use crate::config::ClientConfig;
use crate::connection::ClientConnection;
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use svcwire_protocol::Frame;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Pool of multiplexed connections, keyed by endpoint string.
pub struct ClientPool {
    config: ClientConfig,
    conns: Arc<DashMap<String, Arc<ClientConnection>>>,
    sweeper: JoinHandle<()>,
}

impl ClientPool {
    /// Creates a pool and spawns its sweeper task. Must be called from
    /// within a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        let conns: Arc<DashMap<String, Arc<ClientConnection>>> = Arc::new(DashMap::new());
        let sweeper = tokio::spawn(sweep_loop(conns.clone(), config.sweep_period()));
        Self {
            config,
            conns,
            sweeper,
        }
    }

    /// Returns the connection for `endpoint`, creating it on first use.
    ///
    /// Concurrent first-time callers for the same endpoint string get the
    /// same connection: the map's entry API makes creation atomic, and
    /// distinct endpoints never contend on a common lock.
    pub fn get_or_create(&self, endpoint: &str) -> Result<Arc<ClientConnection>, ClientError> {
        if let Some(conn) = self.conns.get(endpoint) {
            return Ok(conn.clone());
        }

        let parsed = Endpoint::parse(endpoint)?;
        let conn = self
            .conns
            .entry(endpoint.to_string())
            .or_insert_with(|| ClientConnection::new(parsed, self.config.clone()))
            .clone();
        Ok(conn)
    }

    /// Submits a request to `endpoint`, connecting lazily if needed.
    /// The completion channel reports the reply or the terminal failure.
    pub fn submit(
        &self,
        endpoint: &str,
        header: Bytes,
        body: Bytes,
    ) -> Result<oneshot::Receiver<Result<Frame, ClientError>>, ClientError> {
        Ok(self.get_or_create(endpoint)?.submit(header, body))
    }

    /// Sends a request to `endpoint` and awaits the reply.
    pub async fn request(
        &self,
        endpoint: &str,
        header: Bytes,
        body: Bytes,
    ) -> Result<Frame, ClientError> {
        self.get_or_create(endpoint)?.request(header, body).await
    }

    /// Number of pooled connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

impl Drop for ClientPool {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

async fn sweep_loop(conns: Arc<DashMap<String, Arc<ClientConnection>>>, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a fresh pool does not
    // sweep before anything can be pending.
    interval.tick().await;

    loop {
        interval.tick().await;
        let now = Instant::now();
        for entry in conns.iter() {
            let failed = entry.value().sweep(now);
            if failed > 0 {
                tracing::debug!(
                    endpoint = %entry.value().endpoint(),
                    count = failed,
                    "timed out pending requests"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_singleton_connection_per_endpoint() {
        let pool = Arc::new(ClientPool::new(ClientConfig::default()));
        let endpoint = "svcwire://127.0.0.1:19999";

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.get_or_create(endpoint).unwrap()
            }));
        }

        let mut conns = Vec::new();
        for handle in handles {
            conns.push(handle.await.unwrap());
        }
        assert_eq!(pool.len(), 1);
        for conn in &conns[1..] {
            assert!(Arc::ptr_eq(&conns[0], conn));
        }
    }

    #[tokio::test]
    async fn test_distinct_endpoints_get_distinct_connections() {
        let pool = ClientPool::new(ClientConfig::default());
        let a = pool.get_or_create("svcwire://127.0.0.1:19001").unwrap();
        let b = pool.get_or_create("svcwire://127.0.0.1:19002").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_rejected() {
        let pool = ClientPool::new(ClientConfig::default());
        let result = pool.get_or_create("tcp://127.0.0.1:1");
        assert!(matches!(result, Err(ClientError::InvalidEndpoint(_, _))));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_times_out_unanswered_request() {
        // Server accepts and reads but never replies.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            while stream.read(&mut buf).await.unwrap_or(0) > 0 {}
        });

        let config = ClientConfig::new()
            .with_request_timeout(Duration::from_millis(100))
            .with_sweep_interval(Duration::from_millis(25));
        let pool = ClientPool::new(config);
        let endpoint = format!("svcwire://{}", addr);

        let started = Instant::now();
        let err = pool
            .request(&endpoint, Bytes::from_static(b"op"), Bytes::from_static(b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(100));
        let conn = pool.get_or_create(&endpoint).unwrap();
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_does_not_affect_healthy_requests() {
        use tokio::io::AsyncWriteExt;
        use svcwire_protocol::Decoder;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Replies to bodies that say "answer", stays silent otherwise.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decoder = Decoder::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.extend(&buf[..n]);
                while let Some(frame) = decoder.decode_frame().unwrap() {
                    if frame.body.as_ref() == b"answer" {
                        let reply = Frame::new(frame.msg_id, Bytes::new(), frame.body.clone());
                        stream.write_all(&reply.encode().unwrap()).await.unwrap();
                    }
                }
            }
        });

        let config = ClientConfig::new()
            .with_request_timeout(Duration::from_millis(150))
            .with_sweep_interval(Duration::from_millis(25));
        let pool = ClientPool::new(config);
        let endpoint = format!("svcwire://{}", addr);

        let silent = pool
            .submit(&endpoint, Bytes::from_static(b"op"), Bytes::from_static(b"ignore"))
            .unwrap();
        let answered = pool
            .request(&endpoint, Bytes::from_static(b"op"), Bytes::from_static(b"answer"))
            .await
            .unwrap();
        assert_eq!(answered.body.as_ref(), b"answer");

        // The ignored request times out on its own while the connection
        // keeps serving others.
        let err = silent.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Timeout));

        let again = pool
            .request(&endpoint, Bytes::from_static(b"op"), Bytes::from_static(b"answer"))
            .await
            .unwrap();
        assert_eq!(again.body.as_ref(), b"answer");
    }
}
