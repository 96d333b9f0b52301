//! Client configuration.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use svcwire_protocol::Frame;

/// Default request timeout (and sweep interval) of 30 seconds.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default socket connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Predicate deciding whether a login reply means success.
pub type LoginVerify = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

/// Credentials and reply interpretation for the login handshake.
///
/// The login frame is application-defined: `header` routes it to the
/// remote login operation and `body` carries the credentials. The reply
/// is consumed by the connection state machine, never surfaced to callers.
#[derive(Clone)]
pub struct LoginConfig {
    /// Routing header of the login frame.
    pub header: Bytes,
    /// Credential payload of the login frame.
    pub body: Bytes,
    /// Success predicate over the login reply.
    pub verify: LoginVerify,
}

impl LoginConfig {
    /// Creates a login config whose reply is considered successful unless
    /// the body carries the transport error marker.
    pub fn new(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
            verify: Arc::new(|frame| !svcwire_protocol::is_error_body(&frame.body)),
        }
    }

    /// Replaces the success predicate.
    pub fn with_verify<F>(mut self, verify: F) -> Self
    where
        F: Fn(&Frame) -> bool + Send + Sync + 'static,
    {
        self.verify = Arc::new(verify);
        self
    }
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("header", &self.header)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Connection and pool configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline applied to every request.
    pub request_timeout: Duration,
    /// Socket connect timeout.
    pub connect_timeout: Duration,
    /// Sweep interval for expired requests; defaults to `request_timeout`.
    pub sweep_interval: Option<Duration>,
    /// Login credentials; `None` skips the handshake even when the
    /// endpoint advertises support.
    pub login: Option<LoginConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sweep_interval: None,
            login: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn with_login(mut self, login: LoginConfig) -> Self {
        self.login = Some(login);
        self
    }

    /// Effective sweep period.
    pub fn sweep_period(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.request_timeout)
    }
}
