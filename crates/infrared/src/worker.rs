//! The per-connection state machine: dial the backend, fall back to the
//! offline responder (waking the backend if needed), or bridge the login
//! and run the play-state pipe with middleware.

use std::sync::Arc;
use std::time::Duration;

use infrared_protocol::packets::handshaking::HandshakeC2s;
use infrared_protocol::packets::login::{LoginStartC2s, LoginSuccessS2c, SetCompressionS2c};
use infrared_protocol::{CompressionThreshold, Packet, PacketFrame, VarInt};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::callback::{CallbackLog, Event, EventType};
use crate::config::ServerConfig;
use crate::conn::{ConnId, ConnReader, HandshakeConn, McConn, ServerConnFactory};
use crate::error::ProxyError;
use crate::lane::ConnectionGauge;
use crate::middleware::{Author, Message, Middleware, ProtocolState, SharedWriter};
use crate::offline::OfflineServer;
use crate::player::{Player, Players};
use crate::process::Process;
use crate::session::Encryptor;

/// The shared state of one virtual host: its configuration, player set,
/// process controller and idle timer. Every worker of the host's pool holds
/// the same instance.
pub struct VirtualHost {
    pub config: ServerConfig,
    pub offline: OfflineServer,
    pub encryptor: Encryptor,
    pub players: Arc<Players>,
    pub process: Arc<dyn Process>,
    pub idle: IdleTimer,
    pub callback: CallbackLog,
}

impl VirtualHost {
    pub fn new(
        config: ServerConfig,
        process: Arc<dyn Process>,
        encryptor: Encryptor,
    ) -> Result<Arc<Self>, ProxyError> {
        let offline = OfflineServer::new(&config.offline_status, &config.disconnect_message)?;
        let callback = CallbackLog::new(&config.callback_log);

        let idle = IdleTimer::new(
            config.timeout,
            process.clone(),
            callback.clone(),
            config.domain_name.clone(),
            config.proxy_to.clone(),
        );

        Ok(Arc::new(Self {
            config,
            offline,
            encryptor,
            players: Arc::new(Players::new()),
            process,
            idle,
            callback,
        }))
    }

    fn event(&self, event: EventType) -> Event {
        Event {
            event,
            domain_name: self.config.domain_name.clone(),
            proxy_to: self.config.proxy_to.clone(),
            username: None,
            message: None,
        }
    }
}

/// Consumes connections from one virtual host's channel. The pool size is
/// fixed at startup; workers never spawn siblings.
pub struct Worker {
    host: Arc<VirtualHost>,
    rx: flume::Receiver<HandshakeConn>,
    dialer: Arc<dyn ServerConnFactory>,
    middleware: Arc<Vec<Arc<dyn Middleware>>>,
    gauge: ConnectionGauge,
}

impl Worker {
    pub fn new(
        host: Arc<VirtualHost>,
        rx: flume::Receiver<HandshakeConn>,
        dialer: Arc<dyn ServerConnFactory>,
        middleware: Arc<Vec<Arc<dyn Middleware>>>,
        gauge: ConnectionGauge,
    ) -> Self {
        Self {
            host,
            rx,
            dialer,
            middleware,
            gauge,
        }
    }

    pub async fn run(self) {
        while let Ok(conn) = self.rx.recv_async().await {
            self.handle(conn).await;
        }
    }

    pub async fn handle(&self, conn: HandshakeConn) {
        let _guard = self.gauge.track();
        let remote_addr = conn.conn.remote_addr();

        if let Err(e) = self.handle_inner(conn).await {
            match &e {
                ProxyError::Protocol(_) => debug!(%remote_addr, "{e}"),
                ProxyError::Auth(_) => info!(%remote_addr, "{e}"),
                ProxyError::Transport(_) | ProxyError::BackendUnavailable(_) => {
                    debug!(%remote_addr, "{e}");
                }
                ProxyError::Process(_) | ProxyError::Config(_) => {
                    error!(%remote_addr, "{e}");
                    let mut event = self.host.event(EventType::Error);
                    event.message = Some(e.to_string());
                    self.host.callback.post(event);
                }
            }
        }
    }

    async fn handle_inner(&self, mut conn: HandshakeConn) -> Result<(), ProxyError> {
        let Some(handshake) = conn.handshake.take() else {
            debug!("connection arrived without a handshake, dropping");
            return Ok(());
        };

        match self.dialer.dial(&self.host.config.proxy_to).await {
            Ok(server_conn) => {
                if handshake.is_status_request() {
                    self.relay_status(conn.conn, server_conn, &handshake).await
                } else {
                    self.bridge_login(conn.conn, server_conn, handshake, conn.id)
                        .await
                }
            }
            Err(e) => {
                let unavailable = ProxyError::BackendUnavailable(e);
                debug!(
                    proxy_to = %self.host.config.proxy_to,
                    "{unavailable}, serving offline"
                );
                self.serve_offline(conn.conn, &handshake).await
            }
        }
    }

    /// The handshake as the backend should see it: Forge suffixes intact,
    /// and with the client address appended when RealIP is on.
    fn forwarded_handshake(&self, mut handshake: HandshakeC2s, conn: &McConn) -> HandshakeC2s {
        if self.host.config.real_ip {
            handshake.server_address =
                format!("{}///{}", handshake.server_address, conn.remote_addr());
        }
        handshake
    }

    /// STATUS_RELAY: re-emit the handshake, then shovel raw bytes both ways
    /// until either side hangs up.
    async fn relay_status(
        &self,
        client: McConn,
        mut server: McConn,
        handshake: &HandshakeC2s,
    ) -> Result<(), ProxyError> {
        let forwarded = self.forwarded_handshake(handshake.clone(), &client);
        server.send_packet(&forwarded).await?;

        let (mut client_stream, buffered) = client.into_parts();
        let (mut server_stream, _) = server.into_parts();

        if !buffered.is_empty() {
            server_stream.write_all(&buffered).await?;
        }

        let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut server_stream).await;
        Ok(())
    }

    /// OFFLINE_SERVE: answer the ping ourselves, or wake the backend and
    /// kick the login with the configured message.
    async fn serve_offline(
        &self,
        mut conn: McConn,
        handshake: &HandshakeC2s,
    ) -> Result<(), ProxyError> {
        if handshake.is_status_request() {
            return self.host.offline.handle_status(&mut conn).await;
        }

        match self.host.process.is_running().await {
            Ok(true) => {
                // Already starting up; the client only needs its answer.
            }
            Ok(false) => {
                info!(domain = %self.host.config.domain_name, "starting backend process");
                self.host.callback.post(self.host.event(EventType::ContainerStart));

                if let Err(e) = self.host.process.start().await {
                    error!("could not start the backend: {e}");
                    let mut event = self.host.event(EventType::Error);
                    event.message = Some(e.to_string());
                    self.host.callback.post(event);
                } else {
                    self.host.idle.arm();
                }
            }
            Err(e) => {
                error!("could not determine if the backend is running: {e}");
                let mut event = self.host.event(EventType::Error);
                event.message = Some(e.to_string());
                self.host.callback.post(event);
            }
        }

        self.host.offline.handle_login(&mut conn).await
    }

    /// LOGIN_RENEG and PLAY_PIPE.
    async fn bridge_login(
        &self,
        mut client: McConn,
        mut server: McConn,
        handshake: HandshakeC2s,
        id: ConnId,
    ) -> Result<(), ProxyError> {
        let forwarded = self.forwarded_handshake(handshake, &client);
        server.send_packet(&forwarded).await?;

        let login_start: LoginStartC2s = client.recv_packet().await?;
        let username = login_start.username.clone();
        server.send_packet(&login_start).await?;

        // The backend is waking or awake; a live login must keep it that way.
        self.host.idle.cancel();
        self.host.players.put(id, Player::new(username.clone()));

        let mut event = self.host.event(EventType::PlayerJoin);
        event.username = Some(username.clone());
        self.host.callback.post(event);
        info!(domain = %self.host.config.domain_name, %username, "player joined");

        let result = self.login_and_pipe(client, server, id, username.clone()).await;

        self.host.players.remove(id);

        let mut event = self.host.event(EventType::PlayerLeave);
        event.username = Some(username.clone());
        self.host.callback.post(event);
        info!(domain = %self.host.config.domain_name, %username, "player left");

        if self.host.players.is_empty() {
            self.host.idle.arm();
        }

        result
    }

    async fn login_and_pipe(
        &self,
        mut client: McConn,
        mut server: McConn,
        id: ConnId,
        username: String,
    ) -> Result<(), ProxyError> {
        let mut player = Player::new(username);

        self.host
            .encryptor
            .set_encryption(&mut client, &mut player)
            .await?;
        debug!("client-side encryption established");

        let own_threshold = CompressionThreshold(self.host.config.compression_threshold);
        let frame = bridge_compression(&mut client, &mut server, own_threshold).await?;

        let success: LoginSuccessS2c = frame.decode()?;
        player.offline_uuid = Some(success.uuid);

        // Present the Mojang identity to the client; the play-state
        // middleware keeps the two in sync from here on.
        let online_uuid = player.uuid.unwrap_or(success.uuid);
        client
            .send_packet(&LoginSuccessS2c {
                uuid: online_uuid,
                username: success.username,
            })
            .await?;

        self.host.players.put(id, player);

        self.run_pipe(client, server).await;
        Ok(())
    }

    /// Two sibling tasks, one per direction. When either read half fails the
    /// other task is torn down and both sockets close with it.
    async fn run_pipe(&self, client: McConn, server: McConn) {
        let (client_read, client_write) = client.into_split();
        let (server_read, server_write) = server.into_split();

        let client_write: SharedWriter = Arc::new(AsyncMutex::new(client_write));
        let server_write: SharedWriter = Arc::new(AsyncMutex::new(server_write));

        let mut c2s = tokio::spawn(pipe_direction(
            client_read,
            client_write.clone(),
            server_write.clone(),
            Author::Client,
            self.middleware.clone(),
        ));
        let mut s2c = tokio::spawn(pipe_direction(
            server_read,
            server_write,
            client_write,
            Author::Server,
            self.middleware.clone(),
        ));

        tokio::select! {
            _ = &mut c2s => s2c.abort(),
            _ = &mut s2c => c2s.abort(),
        }
    }
}

/// Step 5 of the renegotiation: adopt the backend's threshold on the server
/// side, announce our own to the client, and return the first frame that is
/// not a `SetCompression` (the backend's `LoginSuccess`). The two
/// thresholds are independent; if the backend never compresses, neither
/// side does.
pub(crate) async fn bridge_compression(
    client: &mut McConn,
    server: &mut McConn,
    own_threshold: CompressionThreshold,
) -> Result<PacketFrame, ProxyError> {
    let frame = server.recv_frame().await?;

    if frame.id != SetCompressionS2c::ID {
        return Ok(frame);
    }

    let set_compression: SetCompressionS2c = frame.decode()?;
    server.set_compression(CompressionThreshold(set_compression.threshold.0));

    if own_threshold.is_enabled() {
        client
            .send_packet(&SetCompressionS2c {
                threshold: VarInt(own_threshold.0),
            })
            .await?;
        client.set_compression(own_threshold);
    }

    server.recv_frame().await
}

async fn pipe_direction(
    mut reader: ConnReader,
    src: SharedWriter,
    dst: SharedWriter,
    author: Author,
    middleware: Arc<Vec<Arc<dyn Middleware>>>,
) {
    loop {
        let frame = match reader.recv_frame().await {
            Ok(frame) => frame,
            Err(_) => return,
        };

        let mut msg = Message {
            state: ProtocolState::Play,
            author,
            packet: frame,
            cancel: false,
            src: src.clone(),
            dst: dst.clone(),
        };

        for mw in middleware.iter() {
            if let Err(e) = mw.intercept(&mut msg).await {
                // The packet passes through unmodified rather than taking
                // the connection down.
                warn!("middleware failed: {e}");
            }
        }

        if msg.cancel {
            continue;
        }

        if dst.lock().await.send_frame(&msg.packet).await.is_err() {
            return;
        }
    }
}

/// At most one pending shutdown per virtual host. Arming cancels the
/// previous timer; the timer stops the backend process when it fires.
pub struct IdleTimer {
    slot: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
    process: Arc<dyn Process>,
    callback: CallbackLog,
    domain_name: String,
    proxy_to: String,
}

impl IdleTimer {
    pub fn new(
        timeout: Duration,
        process: Arc<dyn Process>,
        callback: CallbackLog,
        domain_name: String,
        proxy_to: String,
    ) -> Self {
        Self {
            slot: Mutex::new(None),
            timeout,
            process,
            callback,
            domain_name,
            proxy_to,
        }
    }

    pub fn arm(&self) {
        let mut slot = self.slot.lock();

        if let Some(handle) = slot.take() {
            handle.abort();
        }

        info!(
            domain = %self.domain_name,
            "stopping backend in {:?} unless a player joins", self.timeout
        );
        self.callback.post(Event {
            event: EventType::ContainerTimeout,
            domain_name: self.domain_name.clone(),
            proxy_to: self.proxy_to.clone(),
            username: None,
            message: None,
        });

        let timeout = self.timeout;
        let process = self.process.clone();
        let callback = self.callback.clone();
        let domain_name = self.domain_name.clone();
        let proxy_to = self.proxy_to.clone();

        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            info!(domain = %domain_name, "stopping backend process");
            callback.post(Event {
                event: EventType::ContainerStop,
                domain_name: domain_name.clone(),
                proxy_to: proxy_to.clone(),
                username: None,
                message: None,
            });

            if let Err(e) = process.stop().await {
                error!(domain = %domain_name, "failed to stop the backend: {e}");
                callback.post(Event {
                    event: EventType::Error,
                    domain_name,
                    proxy_to,
                    username: None,
                    message: Some(e.to_string()),
                });
            }
        }));
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.slot.lock().take() {
            handle.abort();
            debug!(domain = %self.domain_name, "idle shutdown canceled");
        }
    }
}
