//! Event Record - One parsed packet observation
//!
//! Delivered by the external capture layer, consumed exactly once by the
//! window aggregator. Flag bits match the capture program's encoding.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_PACKET_SIZE, MIN_PACKET_SIZE};

// ============================================================================
// PROTOCOLS & FLAGS
// ============================================================================

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub const FLAG_FIN: u8 = 0x01;
pub const FLAG_SYN: u8 = 0x02;
pub const FLAG_RST: u8 = 0x04;
pub const FLAG_ACK: u8 = 0x10;

/// Protocol buckets tracked per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    pub fn from_number(proto: u8) -> Self {
        match proto {
            PROTO_TCP => Protocol::Tcp,
            PROTO_UDP => Protocol::Udp,
            PROTO_ICMP => Protocol::Icmp,
            _ => Protocol::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Other => "other",
        }
    }
}

// ============================================================================
// EVENT RECORD
// ============================================================================

/// One observed packet, already parsed by the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub packet_size: u32,
    /// Monotonic capture timestamp (nanoseconds)
    pub timestamp: u64,
    #[serde(default)]
    pub tcp_flags: u8,
}

impl EventRecord {
    pub fn protocol_kind(&self) -> Protocol {
        Protocol::from_number(self.protocol)
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol == PROTO_TCP
    }

    /// Connection attempt: SYN set, ACK clear
    pub fn is_syn(&self) -> bool {
        self.is_tcp() && self.tcp_flags & FLAG_SYN != 0 && self.tcp_flags & FLAG_ACK == 0
    }

    /// Basic structural validation with the default size bounds
    pub fn validate(&self) -> Result<(), EventError> {
        self.validate_with(MIN_PACKET_SIZE, MAX_PACKET_SIZE)
    }

    /// Structural validation against explicit size bounds
    pub fn validate_with(&self, min_size: u32, max_size: u32) -> Result<(), EventError> {
        if self.packet_size < min_size || self.packet_size > max_size {
            return Err(EventError::SizeOutOfRange {
                size: self.packet_size,
                min: min_size,
                max: max_size,
            });
        }
        if self.timestamp == 0 {
            return Err(EventError::MissingTimestamp);
        }
        Ok(())
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Malformed event record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    SizeOutOfRange { size: u32, min: u32, max: u32 },
    MissingTimestamp,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::SizeOutOfRange { size, min, max } => {
                write!(f, "Packet size {} outside [{}, {}]", size, min, max)
            }
            EventError::MissingTimestamp => write!(f, "Event has no timestamp"),
        }
    }
}

impl std::error::Error for EventError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(flags: u8) -> EventRecord {
        EventRecord {
            src_ip: 0x0a000001,
            dst_ip: 0x0a000002,
            src_port: 40000,
            dst_port: 443,
            protocol: PROTO_TCP,
            packet_size: 60,
            timestamp: 1,
            tcp_flags: flags,
        }
    }

    #[test]
    fn test_syn_excludes_syn_ack() {
        assert!(tcp(FLAG_SYN).is_syn());
        assert!(!tcp(FLAG_SYN | FLAG_ACK).is_syn());
        assert!(!tcp(FLAG_RST).is_syn());
    }

    #[test]
    fn test_validation_rejects_bad_size() {
        let mut ev = tcp(0);
        ev.packet_size = 0;
        assert!(matches!(ev.validate(), Err(EventError::SizeOutOfRange { .. })));

        ev.packet_size = 70_000;
        assert!(ev.validate().is_err());

        ev.packet_size = 1500;
        assert!(ev.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_timestamp() {
        let mut ev = tcp(0);
        ev.timestamp = 0;
        assert_eq!(ev.validate(), Err(EventError::MissingTimestamp));
    }

    #[test]
    fn test_deserialize_from_capture_json() {
        let json = r#"{"src_ip":167772161,"dst_ip":167772162,"src_port":1234,
            "dst_port":80,"protocol":17,"packet_size":512,"timestamp":99}"#;
        let ev: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(ev.protocol_kind(), Protocol::Udp);
        assert_eq!(ev.tcp_flags, 0);
        assert_eq!(ev.src_ip, u32::from(std::net::Ipv4Addr::new(10, 0, 0, 1)));
    }
}
