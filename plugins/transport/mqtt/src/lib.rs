use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};

use bridge_api::{BridgeError, BrokerClient, BrokerEvent, DeliveryQos};

/// Largest packet MQTT can express: 256 MiB of remaining length plus header.
pub const MAX_PACKET_SIZE: usize = 256 * 1024 * 1024 + 5;

/// Connection settings for [`MqttClient`].
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keepalive: Duration,
    pub qos: DeliveryQos,
    /// Capacity of the request channel between client handle and event loop.
    pub request_capacity: usize,
    /// Largest packet accepted in either direction, in bytes.
    pub max_packet_size: usize,
}

struct Connection {
    client: AsyncClient,
    eventloop: EventLoop,
    /// Publishes that arrived while waiting for a SUBACK.
    pending: VecDeque<BrokerEvent>,
}

/// `BrokerClient` over `rumqttc`.
///
/// Every `connect` builds a new client/event-loop pair with a clean
/// session, so subscriptions never survive a reconnect. A network error
/// drops the pair and is reported as `BrokerEvent::Disconnected`.
pub struct MqttClient {
    addr: String,
    options: MqttOptions,
    qos: QoS,
    request_capacity: usize,
    conn: Option<Connection>,
}

impl MqttClient {
    pub fn new(cfg: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(cfg.keepalive);
        options.set_clean_session(true);
        options.set_max_packet_size(cfg.max_packet_size, cfg.max_packet_size);
        Self {
            addr: format!("{}:{}", cfg.host, cfg.port),
            options,
            qos: to_qos(cfg.qos),
            request_capacity: cfg.request_capacity.max(1),
            conn: None,
        }
    }
}

fn to_qos(qos: DeliveryQos) -> QoS {
    match qos {
        DeliveryQos::AtMostOnce => QoS::AtMostOnce,
        DeliveryQos::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryQos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

impl BrokerClient for MqttClient {
    fn endpoint(&self) -> String {
        self.addr.clone()
    }

    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>> {
        Box::pin(async move {
            self.conn = None;
            let (client, mut eventloop) =
                AsyncClient::new(self.options.clone(), self.request_capacity);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        tracing::info!(broker = %self.addr, code = ?ack.code, "mqtt connected");
                        self.conn = Some(Connection {
                            client,
                            eventloop,
                            pending: VecDeque::new(),
                        });
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(ConnectionError::ConnectionRefused(code)) => {
                        let msg = format!("{} refused connection: {code:?}", self.addr);
                        return Err(BridgeError::refused(msg));
                    }
                    Err(e) => {
                        let msg = format!("connect to {}: {e}", self.addr);
                        return Err(BridgeError::connect(msg));
                    }
                }
            }
        })
    }

    fn subscribe(
        &mut self,
        filter: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>> {
        let filter = filter.to_string();
        let qos = self.qos;
        Box::pin(async move {
            let Some(conn) = self.conn.as_mut() else {
                return Err(BridgeError::not_connected("subscribe: not connected"));
            };
            conn.client
                .subscribe(filter.as_str(), qos)
                .await
                .map_err(|e| BridgeError::connect(format!("subscribe '{filter}': {e}")))?;

            // The subscription only counts once the broker acknowledged it.
            loop {
                match conn.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if ack.return_codes.contains(&SubscribeReasonCode::Failure) {
                            return Err(BridgeError::refused(format!(
                                "broker rejected subscription to '{filter}'"
                            )));
                        }
                        tracing::debug!(pkid = ack.pkid, codes = ?ack.return_codes, "suback");
                        return Ok(());
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        conn.pending.push_back(BrokerEvent::Message {
                            topic: p.topic,
                            payload: p.payload.to_vec(),
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.conn = None;
                        return Err(BridgeError::connect(format!("subscribe '{filter}': {e}")));
                    }
                }
            }
        })
    }

    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = BrokerEvent> + Send + '_>> {
        Box::pin(async move {
            let Some(conn) = self.conn.as_mut() else {
                return BrokerEvent::Disconnected { reason: "not connected".into() };
            };
            if let Some(event) = conn.pending.pop_front() {
                return event;
            }
            loop {
                match conn.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        return BrokerEvent::Message {
                            topic: p.topic,
                            payload: p.payload.to_vec(),
                        };
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.conn = None;
                        return BrokerEvent::Disconnected { reason: e.to_string() };
                    }
                }
            }
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>> {
        Box::pin(async move {
            let Some(mut conn) = self.conn.take() else {
                return Ok(());
            };
            conn.client
                .disconnect()
                .await
                .map_err(|e| BridgeError::connect(format!("disconnect: {e}")))?;
            // Drive the event loop until DISCONNECT is on the wire.
            loop {
                match conn.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            tracing::info!(broker = %self.addr, "mqtt disconnected");
            Ok(())
        })
    }
}
