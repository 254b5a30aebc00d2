use thiserror::Error;

/// Everything that can go wrong inside a single proxied connection or while
/// wiring a proxy up. Errors never cross a connection boundary: the worker
/// logs, closes its sockets and moves on.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Framing failures, VarInt overflow, unexpected packet ids. Logged at
    /// debug; the connection is closed.
    #[error("protocol error: {0}")]
    Protocol(#[from] infrared_protocol::Error),

    /// Session authentication or the encryption handshake failed. Logged at
    /// info; the connection is closed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Socket read/write or DNS failure. The connection is closed; the
    /// worker keeps serving.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The backend did not answer the dial. Not an error towards the
    /// client: the worker falls back to the offline responder.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(std::io::Error),

    /// A process controller operation failed. Logged and reported via the
    /// callback log; never tears down the proxy.
    #[error("process controller error: {0}")]
    Process(#[from] ProcessError),

    /// Construction-time failure. Aborts startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("verify token did not match")]
    VerifyTokenMismatch,

    #[error("shared secret has the wrong length")]
    BadSharedSecret,

    #[error("RSA decryption failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("session server request failed: {0}")]
    SessionServer(#[from] reqwest::Error),

    #[error("session server could not verify the user (status {0})")]
    Unverified(reqwest::StatusCode),

    #[error("game profile has no textures property")]
    MissingTextures,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("no start command configured")]
    NoStartCommand,

    #[error("process has not been started")]
    NotStarted,

    #[error("container {0} not found")]
    ContainerNotFound(String),

    #[error("endpoint rejected the credentials")]
    Unauthorized,

    #[error("unexpected status {0} from container endpoint")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error("container endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
