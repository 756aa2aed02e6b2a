//! # Media Stream WebSocket Handler
//!
//! Terminates the telephony side of the relay. Twilio connects to
//! `/ws/media` when a call's media stream starts and speaks newline-free
//! JSON text frames both ways.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the telephony provider opens the socket for one call leg
//! 2. **`connected` / `start` events**: the start frame carries the stream SID
//!    that all outbound frames must echo
//! 3. **`media` events**: base64 mu-law audio, both directions
//! 4. **`clear` event (outbound)**: instructs the far end to flush buffered
//!    playback after a barge-in
//! 5. **Closure**: socket teardown ends the call leg; the bridge is stopped
//!    and the call is dropped from the registry
//!
//! ## Actor Model:
//! Each connection is an independent actix actor. The actor's mailbox doubles
//! as the outbound transport: the transmitter task running off-actor hands
//! frames over via `SendWireMessage`, keeping all socket writes serialized in
//! one place.

use crate::bridge::events::OutboundMessage;
use crate::bridge::{AudioBridge, CallSession, MediaTransport};
use crate::engine::ConversationEngine;
use crate::error::BridgeError;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Carries one outbound wire frame from the transmitter task to the actor
/// that owns the socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendWireMessage(pub OutboundMessage);

/// `MediaTransport` backed by the actor's mailbox.
///
/// `try_send` never blocks the transmitter; a full or closed mailbox surfaces
/// as a transient transport error, which the relay logs and survives.
pub struct SocketTransport {
    addr: Addr<MediaStreamSocket>,
}

impl MediaTransport for SocketTransport {
    fn send_message(&self, message: OutboundMessage) -> Result<(), BridgeError> {
        self.addr
            .try_send(SendWireMessage(message))
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

/// WebSocket actor for one telephony call leg.
pub struct MediaStreamSocket {
    /// Local identifier for this connection (the stream SID arrives later)
    connection_id: String,

    state: web::Data<AppState>,

    /// The engine wired onto every new call leg
    engine: Arc<dyn ConversationEngine>,

    /// The relay for this call leg, created when the connection starts
    bridge: Option<Arc<AudioBridge>>,

    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    last_heartbeat: Instant,
}

impl MediaStreamSocket {
    pub fn new(state: web::Data<AppState>, engine: Arc<dyn ConversationEngine>) -> Self {
        let bridge_config = state.get_config().bridge;
        Self {
            connection_id: Uuid::new_v4().to_string(),
            state,
            engine,
            bridge: None,
            heartbeat_interval: Duration::from_secs(bridge_config.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(bridge_config.heartbeat_timeout_secs),
            last_heartbeat: Instant::now(),
        }
    }
}

impl Actor for MediaStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(connection_id = %self.connection_id, "media stream connection started");

        // Protocol-level ping only: the telephony provider neither sends nor
        // expects JSON heartbeat frames.
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.heartbeat_timeout {
                warn!(
                    connection_id = %act.connection_id,
                    "media stream heartbeat timeout, closing connection"
                );
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });

        let session = Arc::new(CallSession::new(self.connection_id.clone()));
        if let Err(e) = self.state.registry.register(session.clone()) {
            warn!(
                connection_id = %self.connection_id,
                error = %e,
                "rejecting media stream connection"
            );
            ctx.close(Some(ws::CloseCode::Again.into()));
            ctx.stop();
            return;
        }

        let transport = Arc::new(SocketTransport {
            addr: ctx.address(),
        });
        let bridge = Arc::new(AudioBridge::new(
            transport,
            session,
            self.state.get_config().bridge,
        ));

        let input_callback = self.engine.attach(bridge.clone());
        bridge.start(input_callback);
        self.bridge = Some(bridge);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(connection_id = %self.connection_id, "media stream connection stopped");

        // Socket closure is the normal end of a call leg. The bounded join
        // inside stop() must not run on the actor thread, so it is finished
        // in a spawned task.
        if let Some(bridge) = self.bridge.take() {
            self.engine.detach(&bridge);
            let registry = self.state.registry.clone();
            let connection_id = self.connection_id.clone();
            tokio::spawn(async move {
                bridge.handle_transport_closed().await;
                registry.remove(&connection_id);
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if let Some(bridge) = &self.bridge {
                    bridge.handle_message(&text);
                }
            }
            Ok(ws::Message::Binary(data)) => {
                // The media-stream protocol is JSON text frames only.
                warn!(
                    connection_id = %self.connection_id,
                    bytes = data.len(),
                    "unexpected binary frame ignored"
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(
                    connection_id = %self.connection_id,
                    reason = ?reason,
                    "media stream closed by far end"
                );
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("unexpected continuation frame ignored");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(
                    connection_id = %self.connection_id,
                    error = %err,
                    "media stream protocol error"
                );
                ctx.stop();
            }
        }
    }
}

impl Handler<SendWireMessage> for MediaStreamSocket {
    type Result = ();

    fn handle(&mut self, msg: SendWireMessage, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(error = %e, "failed to serialize outbound frame"),
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh `MediaStreamSocket` actor.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    engine: web::Data<dyn ConversationEngine>,
) -> ActixResult<HttpResponse> {
    debug!(
        peer = ?req.connection_info().peer_addr(),
        "media stream upgrade requested"
    );

    let socket = MediaStreamSocket::new(app_state, engine.into_inner());
    ws::start(socket, &req, stream)
}
