//! Routes inbound frames to the connection and its channels

use amqp091_types::methods::{
    ChannelClose, ChannelCloseOk, ChannelFlowOk, ConnectionClose, ConnectionCloseOk, Method,
};
use async_trait::async_trait;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    frames::{Frame, FrameBody},
    transport::{self, FrameHandler},
};

use super::{delegate::ConnectionEvent, ConnectionState, Shared};

impl Shared {
    async fn on_connection_method(&self, method: Method) {
        match method {
            Method::ConnectionClose(close) => self.on_server_close(close).await,
            Method::ConnectionBlocked(blocked) => {
                warn!(reason = %blocked.reason, "blocked by broker");
                self.delegate
                    .on_event(ConnectionEvent::Blocked(blocked.reason.to_string()));
            }
            Method::ConnectionUnblocked(_) => {
                debug!("unblocked by broker");
                self.delegate.on_event(ConnectionEvent::Unblocked);
            }
            other => self.control.deliver(other),
        }
    }

    async fn on_server_close(&self, close: ConnectionClose) {
        let ConnectionClose {
            reply_code,
            reply_text,
            ..
        } = close;
        warn!(reply_code, reply_text = %reply_text, "connection closed by broker");
        if let Err(err) = self.send_method(0, ConnectionCloseOk {}).await {
            debug!(?err, "failed to send connection.close-ok");
        }
        let reply_text = reply_text.to_string();
        self.teardown(
            Some((reply_code, reply_text.clone())),
            ConnectionEvent::ServerClosed {
                reply_code,
                reply_text,
            },
        )
        .await;
    }

    async fn on_channel_method(&self, channel: u16, method: Method) {
        let target = match self.allocator.get(channel) {
            Some(target) => target,
            None => {
                let reason = format!("{} on unknown channel {}", method.kind(), channel);
                self.protocol_violation(reason).await;
                return;
            }
        };

        match method {
            Method::ChannelClose(close) => {
                let ChannelClose {
                    reply_code,
                    reply_text,
                    ..
                } = close;
                let reply_text = reply_text.to_string();
                warn!(channel, reply_code, %reply_text, "channel closed by broker");
                if let Err(err) = self.send_method(channel, ChannelCloseOk {}).await {
                    debug!(channel, ?err, "failed to send channel.close-ok");
                }
                target.force_close(Some((reply_code, reply_text.clone())));
                // A draining channel still owes us the close-ok for its own close
                if !target.is_draining() {
                    self.allocator.release(channel);
                }
                self.delegate.on_event(ConnectionEvent::ChannelClosed {
                    channel,
                    reply_code,
                    reply_text,
                });
            }
            Method::ChannelCloseOk(_) if target.is_draining() => {
                debug!(channel, "late channel.close-ok");
                target.force_close(None);
                self.allocator.release(channel);
            }
            other if target.is_draining() => {
                trace!(channel, kind = %other.kind(), "discarded on closing channel");
            }
            Method::ChannelFlow(flow) => {
                debug!(channel, active = flow.active, "channel.flow");
                target.set_flow(flow.active);
                let flow_ok = ChannelFlowOk {
                    active: flow.active,
                };
                if let Err(err) = self.send_method(channel, flow_ok).await {
                    debug!(channel, ?err, "failed to send channel.flow-ok");
                }
            }
            Method::BasicReturn(returned) => {
                debug!(
                    channel,
                    reply_code = returned.reply_code,
                    exchange = %returned.exchange,
                    routing_key = %returned.routing_key,
                    "message returned"
                );
            }
            other => target.deliver(other),
        }
    }
}

#[async_trait]
impl FrameHandler for Shared {
    #[instrument(name = "RECV", skip_all)]
    async fn handle_frame(&self, frame: Frame) {
        trace!(channel = frame.channel, frame = ?frame.body);
        let Frame { channel, body } = frame;
        match body {
            FrameBody::Method(method) if channel == 0 => self.on_connection_method(method).await,
            FrameBody::Method(method) => self.on_channel_method(channel, method).await,
            // Consuming is not supported, content of returned messages is discarded
            FrameBody::Header(_) | FrameBody::Body(_) => {}
            FrameBody::Heartbeat => {}
        }
    }

    async fn handle_transport_error(&self, error: transport::Error) {
        match self.state() {
            ConnectionState::Closed | ConnectionState::Failed => {
                debug!(?error, "transport error after close");
            }
            ConnectionState::Closing => {
                // Fail the pending close steps fast
                debug!(?error, "transport lost while closing");
                self.heartbeat.stop();
                self.force_close_channels(None);
            }
            ConnectionState::Start | ConnectionState::Handshaking | ConnectionState::Open => {
                error!(?error, "transport failed");
                let event = if error.is_protocol_violation() {
                    ConnectionEvent::ProtocolViolation(error.to_string())
                } else {
                    ConnectionEvent::TransportLost(error.to_string())
                };
                self.teardown(None, event).await;
            }
        }
    }
}
