//! Actix WebSocket session actor. The actor owns the socket; outbound
//! traffic from the rest of the process reaches it through the per-connection
//! channel registered with the connection registry.

use crate::state::AppState;
use crate::websocket::{handlers, ConnectionId};
use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc::unbounded_channel;

/// Outbound frame relayed from the registry channel onto the socket.
#[derive(Message)]
#[rtype(result = "()")]
struct Outbound(String);

pub struct WsSession {
    state: AppState,
    connection_id: ConnectionId,
    last_heartbeat: Instant,
}

impl WsSession {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            connection_id: ConnectionId::new(),
            last_heartbeat: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.state.config.client_timeout;
        ctx.run_interval(self.state.config.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                tracing::info!(connection_id = %act.connection_id, "client heartbeat timed out");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(connection_id = %self.connection_id, "websocket connected");
        self.start_heartbeat(ctx);

        let (tx, mut rx) = unbounded_channel::<String>();
        let state = self.state.clone();
        let connection_id = self.connection_id;
        let addr = ctx.address();
        actix::spawn(async move {
            state.registry.register(connection_id, tx).await;
            while let Some(payload) = rx.recv().await {
                if addr.try_send(Outbound(payload)).is_err() {
                    break;
                }
            }
        });
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        tracing::info!(connection_id = %self.connection_id, "websocket disconnected");
        let state = self.state.clone();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            handlers::handle_disconnect(&state, connection_id).await;
        });
        Running::Stop
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                let state = self.state.clone();
                let connection_id = self.connection_id;
                actix::spawn(async move {
                    handlers::handle_event(&state, connection_id, &text).await;
                });
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!(connection_id = %self.connection_id, "ignoring binary frame");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(error = %e, connection_id = %self.connection_id, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

pub async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(WsSession::new(state.get_ref().clone()), &req, stream)
}
