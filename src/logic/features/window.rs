//! Window - Mutable per-interval accumulator
//!
//! Owned by exactly one aggregator at a time. Readers never see this type
//! directly; they get the immutable `FeatureSnapshot` built from a closed
//! window.
//!
//! Memory is bounded regardless of traffic shape:
//! - destination ports live in a fixed 65 536-bit bitmap (8 KiB),
//! - source / destination address sets stop growing at their caps,
//! - latency samples are a ring of `max_latency_samples`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{EventRecord, Protocol};
use crate::constants::{DEFAULT_MAX_LATENCY_SAMPLES, DEFAULT_MAX_TRACKED_ADDRESSES, DEFAULT_TOP_N};

// ============================================================================
// LIMITS
// ============================================================================

/// Per-window memory caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowLimits {
    pub max_tracked_sources: usize,
    pub max_tracked_destinations: usize,
    pub max_latency_samples: usize,
    pub top_n: usize,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            max_tracked_sources: DEFAULT_MAX_TRACKED_ADDRESSES,
            max_tracked_destinations: DEFAULT_MAX_TRACKED_ADDRESSES,
            max_latency_samples: DEFAULT_MAX_LATENCY_SAMPLES,
            top_n: DEFAULT_TOP_N,
        }
    }
}

// ============================================================================
// PORT BITMAP
// ============================================================================

/// Distinct-port set over the whole u16 range
#[derive(Debug, Clone)]
pub struct PortBitmap {
    bits: Box<[u64; 1024]>,
    count: usize,
}

impl PortBitmap {
    pub fn new() -> Self {
        Self { bits: Box::new([0u64; 1024]), count: 0 }
    }

    /// Returns true if the port was not present before
    pub fn insert(&mut self, port: u16) -> bool {
        let word = (port >> 6) as usize;
        let mask = 1u64 << (port & 63);
        if self.bits[word] & mask != 0 {
            return false;
        }
        self.bits[word] |= mask;
        self.count += 1;
        true
    }

    pub fn contains(&self, port: u16) -> bool {
        self.bits[(port >> 6) as usize] & (1u64 << (port & 63)) != 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for PortBitmap {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PER-SOURCE STATE
// ============================================================================

/// Retransmit signature: same destination, port, size and flags as last time
type PacketSignature = (u32, u16, u32, u8);

#[derive(Debug, Clone)]
struct SourceStats {
    addr: u32,
    packets: u64,
    last_seen_ns: u64,
    last_signature: Option<PacketSignature>,
}

// ============================================================================
// WINDOW
// ============================================================================

#[derive(Debug, Clone)]
pub struct Window {
    started_at: Instant,
    started_wall: DateTime<Utc>,
    limits: WindowLimits,

    packets: u64,
    bytes: u64,
    tcp_packets: u64,
    udp_packets: u64,
    icmp_packets: u64,
    other_packets: u64,
    syn_packets: u64,
    retransmits: u64,

    /// address -> ordinal index into `sources`
    source_index: HashMap<u32, usize>,
    sources: Vec<SourceStats>,
    sources_saturated: bool,

    destinations: HashSet<u32>,
    destinations_saturated: bool,

    ports: PortBitmap,
    latencies: VecDeque<f64>,
}

impl Window {
    pub fn new(started_at: Instant, limits: WindowLimits) -> Self {
        Self {
            started_at,
            started_wall: Utc::now(),
            limits,
            packets: 0,
            bytes: 0,
            tcp_packets: 0,
            udp_packets: 0,
            icmp_packets: 0,
            other_packets: 0,
            syn_packets: 0,
            retransmits: 0,
            source_index: HashMap::new(),
            sources: Vec::new(),
            sources_saturated: false,
            destinations: HashSet::new(),
            destinations_saturated: false,
            ports: PortBitmap::new(),
            latencies: VecDeque::with_capacity(limits.max_latency_samples.min(1024)),
        }
    }

    /// Account one (already validated) event
    pub fn record(&mut self, event: &EventRecord) {
        self.packets += 1;
        self.bytes += event.packet_size as u64;

        match event.protocol_kind() {
            Protocol::Tcp => self.tcp_packets += 1,
            Protocol::Udp => self.udp_packets += 1,
            Protocol::Icmp => self.icmp_packets += 1,
            Protocol::Other => self.other_packets += 1,
        }
        if event.is_syn() {
            self.syn_packets += 1;
        }

        self.ports.insert(event.dst_port);
        self.track_destination(event.dst_ip);
        self.track_source(event);
    }

    fn track_destination(&mut self, addr: u32) {
        if self.destinations.contains(&addr) {
            return;
        }
        if self.destinations.len() < self.limits.max_tracked_destinations {
            self.destinations.insert(addr);
        } else {
            self.destinations_saturated = true;
        }
    }

    fn track_source(&mut self, event: &EventRecord) {
        let index = match self.source_index.get(&event.src_ip) {
            Some(&i) => i,
            None => {
                if self.sources.len() >= self.limits.max_tracked_sources {
                    // Evaluative only once the cap is hit
                    self.sources_saturated = true;
                    return;
                }
                let i = self.sources.len();
                self.sources.push(SourceStats {
                    addr: event.src_ip,
                    packets: 0,
                    last_seen_ns: 0,
                    last_signature: None,
                });
                self.source_index.insert(event.src_ip, i);
                i
            }
        };

        let signature = (event.dst_ip, event.dst_port, event.packet_size, event.tcp_flags);
        let stats = &mut self.sources[index];
        stats.packets += 1;

        if stats.last_seen_ns > 0 && event.timestamp > stats.last_seen_ns {
            let gap_ms = (event.timestamp - stats.last_seen_ns) as f64 / 1_000_000.0;
            if self.latencies.len() >= self.limits.max_latency_samples {
                self.latencies.pop_front();
            }
            if self.limits.max_latency_samples > 0 {
                self.latencies.push_back(gap_ms);
            }
        }
        if event.is_tcp() && stats.last_signature == Some(signature) {
            self.retransmits += 1;
        }

        stats.last_seen_ns = stats.last_seen_ns.max(event.timestamp);
        stats.last_signature = Some(signature);
    }

    // ------------------------------------------------------------------------
    // Read accessors (used when building the snapshot)
    // ------------------------------------------------------------------------

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn started_wall(&self) -> DateTime<Utc> {
        self.started_wall
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn protocol_counts(&self) -> (u64, u64, u64, u64) {
        (self.tcp_packets, self.udp_packets, self.icmp_packets, self.other_packets)
    }

    pub fn syn_packets(&self) -> u64 {
        self.syn_packets
    }

    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    pub fn unique_sources(&self) -> usize {
        self.source_index.len()
    }

    pub fn unique_destinations(&self) -> usize {
        self.destinations.len()
    }

    pub fn unique_ports(&self) -> usize {
        self.ports.len()
    }

    pub fn sources_saturated(&self) -> bool {
        self.sources_saturated
    }

    pub fn destinations_saturated(&self) -> bool {
        self.destinations_saturated
    }

    pub fn latency_samples(&self) -> Vec<f64> {
        self.latencies.iter().copied().collect()
    }

    /// Top-N sources by packet count; ties keep first-seen order
    pub fn top_sources(&self) -> Vec<(Ipv4Addr, u64)> {
        let mut ranked: Vec<(usize, &SourceStats)> = self.sources.iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.packets.cmp(&a.1.packets).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.limits.top_n)
            .map(|(_, s)| (Ipv4Addr::from(s.addr), s.packets))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.packets == 0
    }
}
