//! ==============================================================================
//! protocol.rs - engine.io v4 / socket.io v5 text packet codec
//! ==============================================================================
//!
//! purpose:
//!     the push channel is a socket.io server. over a plain websocket that
//!     means two nested framings, so an event on the default namespace
//!     arrives as `42["new_message",{"message":{...}}]`.
//!
//! ```text
//!     engine.io   <type><payload>          e.g. "2" (ping), "4..." (message)
//!     socket.io   <type>[/nsp,][id][json]  carried inside engine.io messages
//! ```
//!
//! scope:
//!     text packets only. binary events (socket.io types 5 and 6) are
//!     reported as protocol errors; the sensor server never sends them.
//!
//! ==============================================================================

use crate::error::{DashboardError, DashboardResult};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "/";

/// payload of the engine.io open packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// ms between server pings
    pub ping_interval: u64,
    /// ms the server waits for our pong
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// how long to wait for any traffic before declaring the link dead
    pub fn liveness_ms(&self) -> u64 {
        self.ping_interval + self.ping_timeout
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: Option<u64>,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

pub fn decode_engine(text: &str) -> DashboardResult<EnginePacket> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| DashboardError::Protocol("empty engine.io packet".into()))?;
    let body = chars.as_str();

    Ok(match kind {
        '0' => EnginePacket::Open(serde_json::from_str(body)?),
        '1' => EnginePacket::Close,
        '2' => EnginePacket::Ping(body.to_string()),
        '3' => EnginePacket::Pong(body.to_string()),
        '4' => EnginePacket::Message(body.to_string()),
        '5' => EnginePacket::Upgrade,
        '6' => EnginePacket::Noop,
        other => {
            return Err(DashboardError::Protocol(format!(
                "unknown engine.io packet type {other:?}"
            )))
        }
    })
}

pub fn decode_socket(text: &str) -> DashboardResult<SocketPacket> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| DashboardError::Protocol("empty socket.io packet".into()))?;
    let mut rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(DashboardError::Protocol(
            "binary socket.io packets are not supported".into(),
        ));
    }

    let mut namespace = DEFAULT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        namespace = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id: Option<u64> = if digits > 0 {
        let id = rest[..digits]
            .parse()
            .map_err(|_| DashboardError::Protocol(format!("bad ack id in {text:?}")))?;
        rest = &rest[digits..];
        Some(id)
    } else {
        None
    };

    let data: Option<Value> = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str(rest)?)
    };

    Ok(match kind {
        '0' => SocketPacket::Connect { namespace, data },
        '1' => SocketPacket::Disconnect { namespace },
        '2' => {
            let mut args = match data {
                Some(Value::Array(args)) => args.into_iter(),
                _ => {
                    return Err(DashboardError::Protocol(
                        "event payload is not an array".into(),
                    ))
                }
            };
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => {
                    return Err(DashboardError::Protocol(
                        "event has no name".into(),
                    ))
                }
            };
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args: args.collect(),
            }
        }
        '3' => SocketPacket::Ack {
            namespace,
            ack_id,
            args: match data {
                Some(Value::Array(args)) => args,
                _ => Vec::new(),
            },
        },
        '4' => SocketPacket::ConnectError { namespace, data },
        other => {
            return Err(DashboardError::Protocol(format!(
                "unknown socket.io packet type {other:?}"
            )))
        }
    })
}

/// engine.io message carrying a socket.io namespace connect
pub fn encode_connect(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

/// engine.io pong echoing the ping's payload
pub fn encode_pong(payload: &str) -> String {
    format!("3{payload}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = decode_engine(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let open = match packet {
            EnginePacket::Open(open) => open,
            other => panic!("expected open, got {other:?}"),
        };
        assert_eq!(open.sid, "abc");
        assert_eq!(open.liveness_ms(), 45_000);
    }

    #[test]
    fn test_decode_ping_and_message() {
        assert_eq!(decode_engine("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(
            decode_engine("2probe").unwrap(),
            EnginePacket::Ping("probe".into())
        );
        assert_eq!(
            decode_engine("40").unwrap(),
            EnginePacket::Message("0".into())
        );
        assert!(decode_engine("").is_err());
        assert!(decode_engine("9").is_err());
    }

    #[test]
    fn test_decode_event() {
        let packet = decode_socket(r#"2["new_message",{"message":{"device_id":"d1","pins":[]}}]"#)
            .unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/".into(),
                ack_id: None,
                name: "new_message".into(),
                args: vec![json!({"message":{"device_id":"d1","pins":[]}})],
            }
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = decode_socket(r#"2/sensors,12["reading",1,2]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/sensors".into(),
                ack_id: Some(12),
                name: "reading".into(),
                args: vec![json!(1), json!(2)],
            }
        );
    }

    #[test]
    fn test_decode_connect_ack() {
        assert_eq!(
            decode_socket(r#"0{"sid":"xyz"}"#).unwrap(),
            SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({"sid":"xyz"})),
            }
        );
        assert_eq!(
            decode_socket("0/admin,").unwrap(),
            SocketPacket::Connect {
                namespace: "/admin".into(),
                data: None,
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_events() {
        assert!(decode_socket(r#"2{"not":"an array"}"#).is_err());
        assert!(decode_socket("2[42]").is_err());
        assert!(decode_socket(r#"51-["bin",{"_placeholder":true,"num":0}]"#).is_err());
        assert!(decode_socket("2[not json").is_err());
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode_connect("/"), "40");
        assert_eq!(encode_connect("/sensors"), "40/sensors,");
        assert_eq!(encode_pong(""), "3");
        assert_eq!(encode_pong("probe"), "3probe");
    }
}
