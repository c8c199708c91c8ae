//! Integration Tests for window aggregation
//!
//! Event stream in, snapshots out, with accounting checked end to end.

#[cfg(test)]
mod integration_tests {
    use std::time::{Duration, Instant};
    use crate::logic::features::{
        event::{EventRecord, FLAG_ACK, FLAG_SYN, PROTO_ICMP, PROTO_TCP, PROTO_UDP},
        AggregatorConfig, WindowAggregator, WindowLimits,
    };

    fn ev(i: u64, protocol: u8, flags: u8) -> EventRecord {
        EventRecord {
            src_ip: 0x0a000000 + (i % 50) as u32,
            dst_ip: 0xc0a80000 + (i % 7) as u32,
            src_port: 30000 + (i % 1000) as u16,
            dst_port: (i % 2000) as u16,
            protocol,
            packet_size: 60 + (i % 1400) as u32,
            timestamp: 1_000 + i * 10_000,
            tcp_flags: flags,
        }
    }

    /// Per-protocol counts over all closed windows equal ingested events
    #[test]
    fn test_protocol_conservation_across_windows() {
        let start = Instant::now();
        let agg = WindowAggregator::starting_at(AggregatorConfig::default(), start);
        let protocols = [PROTO_TCP, PROTO_UDP, PROTO_ICMP, 47];

        let mut snapshots = Vec::new();
        for round in 0..5u64 {
            for i in 0..997u64 {
                let n = round * 1000 + i;
                let _ = agg.ingest(&ev(n, protocols[(n % 4) as usize], FLAG_SYN));
            }
            // a couple of malformed events per round
            let mut bad = ev(round, PROTO_TCP, 0);
            bad.packet_size = 1;
            assert!(agg.ingest(&bad).is_err());

            let now = start + Duration::from_millis(1000 * (round + 1));
            snapshots.push(agg.rollover(now).expect("window elapsed"));
        }

        let per_protocol: u64 = snapshots.iter().map(|s| s.total_packets()).sum();
        let packets: u64 = snapshots.iter().map(|s| s.packets).sum();
        assert_eq!(per_protocol, agg.ingested());
        assert_eq!(packets, agg.ingested());
        assert_eq!(agg.ingested(), 5 * 997);
        assert_eq!(agg.discarded(), 5);
    }

    #[test]
    fn test_port_scan_window_features() {
        let start = Instant::now();
        let agg = WindowAggregator::starting_at(AggregatorConfig::default(), start);

        for port in 0..1000u16 {
            let mut e = ev(port as u64, PROTO_TCP, FLAG_SYN);
            e.src_ip = 0x0a0000ff;
            e.dst_port = port;
            e.packet_size = 60;
            agg.ingest(&e).unwrap();
        }
        // a handshake reply is not a connection attempt
        agg.ingest(&ev(5000, PROTO_TCP, FLAG_SYN | FLAG_ACK)).unwrap();

        let snap = agg.rollover(start + Duration::from_secs(1)).unwrap();
        assert_eq!(snap.unique_ports, 1000);
        assert_eq!(snap.syn_packets, 1000);
        assert_eq!(snap.tcp_packets, 1001);
        assert_eq!(snap.top_sources[0].1, 1000);
        assert!((snap.packets_per_second - 1001.0).abs() < 1e-6);
    }

    #[test]
    fn test_saturated_window_reports_cap() {
        let limits = WindowLimits {
            max_tracked_sources: 10,
            max_tracked_destinations: 4,
            ..Default::default()
        };
        let config = AggregatorConfig { limits, ..Default::default() };
        let start = Instant::now();
        let agg = WindowAggregator::starting_at(config, start);

        for i in 0..200u64 {
            agg.ingest(&ev(i, PROTO_UDP, 0)).unwrap();
        }
        let snap = agg.force_rollover(start + Duration::from_millis(500)).unwrap();
        assert_eq!(snap.unique_sources, 10);
        assert_eq!(snap.unique_destinations, 4);
        assert!(snap.sources_saturated);
        assert!(snap.destinations_saturated);
        assert_eq!(snap.packets, 200);
    }

    #[test]
    fn test_empty_window_snapshot() {
        let start = Instant::now();
        let agg = WindowAggregator::starting_at(AggregatorConfig::default(), start);
        let snap = agg.rollover(start + Duration::from_secs(1)).unwrap();
        assert_eq!(snap.packets, 0);
        assert_eq!(snap.jitter_ms, 0.0);
        assert_eq!(snap.p95_latency_ms, 0.0);
        assert!(snap.top_sources.is_empty());
    }
}
