use std::collections::{BTreeMap, HashMap};
use traffic_lab_abstract::{FlowId, FlowKey, FlowRecord, ObservedFlow, SimTime};

/// Classifies datagrams into five-tuple flows and counts them.
///
/// Transmissions are counted when a datagram is handed to the network,
/// receptions when it arrives, so anything dropped or still in flight when the
/// clock stops shows up as the difference.
#[derive(Debug, Default)]
pub struct FlowMonitor {
    classifier: HashMap<FlowKey, FlowId>,
    flows: BTreeMap<FlowId, (FlowKey, FlowRecord)>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `key`, allocating the next one on first sight.
    pub fn classify(&mut self, key: FlowKey) -> FlowId {
        let next_id = self.classifier.len() as FlowId + 1;
        let id = *self.classifier.entry(key).or_insert(next_id);
        self.flows
            .entry(id)
            .or_insert_with(|| (key, FlowRecord::default()));
        id
    }

    pub fn record_tx(&mut self, key: FlowKey, size: u32, now: SimTime) -> FlowId {
        let id = self.classify(key);
        if let Some((_, record)) = self.flows.get_mut(&id) {
            record.tx_packets += 1;
            record.tx_bytes += size as u64;
            record.first_tx.get_or_insert(now);
        }
        id
    }

    /// Counts a reception. Unknown ids are ignored.
    pub fn record_rx(&mut self, id: FlowId, size: u32, sent_at: SimTime, now: SimTime) {
        if let Some((_, record)) = self.flows.get_mut(&id) {
            record.rx_packets += 1;
            record.rx_bytes += size as u64;
            record.delay_sum += (now - sent_at).as_secs_f64();
            record.last_rx = Some(now);
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn find_flow(&self, id: FlowId) -> Option<&FlowKey> {
        self.flows.get(&id).map(|(key, _)| key)
    }

    /// Point-in-time copy of every flow, ordered by id.
    pub fn snapshot(&self) -> Vec<ObservedFlow> {
        self.flows
            .iter()
            .map(|(&id, &(key, record))| ObservedFlow { id, key, record })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use traffic_lab_abstract::Protocol;

    fn key(source_port: u16) -> FlowKey {
        FlowKey {
            source: Ipv4Addr::new(10, 1, 1, 1),
            destination: Ipv4Addr::new(10, 1, 1, 6),
            protocol: Protocol::Udp,
            source_port,
            destination_port: 9,
        }
    }

    #[test]
    fn same_tuple_maps_to_same_flow() {
        let mut monitor = FlowMonitor::new();
        let a = monitor.record_tx(key(49153), 100, SimTime::from_secs(1));
        let b = monitor.record_tx(key(49154), 100, SimTime::from_secs(1));
        let c = monitor.record_tx(key(49153), 100, SimTime::from_secs(2));
        assert_eq!((a, b, c), (1, 2, 1));
        assert_eq!(monitor.len(), 2);
        assert_eq!(monitor.find_flow(2), Some(&key(49154)));
    }

    #[test]
    fn reception_accumulates_delay() {
        let mut monitor = FlowMonitor::new();
        let id = monitor.record_tx(key(1), 512, SimTime::from_secs(1));
        monitor.record_tx(key(1), 512, SimTime::from_millis(1500));
        monitor.record_rx(id, 512, SimTime::from_secs(1), SimTime::from_millis(1002));
        monitor.record_rx(99, 512, SimTime::ZERO, SimTime::from_secs(3));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 1);
        let record = snapshot[0].record;
        assert_eq!(record.tx_packets, 2);
        assert_eq!(record.tx_bytes, 1024);
        assert_eq!(record.rx_packets, 1);
        assert_eq!(record.rx_bytes, 512);
        assert!((record.delay_sum - 0.002).abs() < 1e-12);
        assert_eq!(record.first_tx, Some(SimTime::from_secs(1)));
        assert_eq!(record.last_rx, Some(SimTime::from_millis(1002)));
    }
}
