use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};
use traffic_lab_abstract::{
    AppTelemetry, ConfigError, Datagram, FlowId, FlowKey, NodeId, ObservedFlow, SimConfig,
    SimTime, SystemContext, TrafficApplication,
};

use crate::monitor::FlowMonitor;
use crate::stats::{self, StatsError};
use crate::trace::{SimulationReport, SourceSummary};

/// First ephemeral port handed to installed applications.
const FIRST_EPHEMERAL_PORT: u16 = 49153;

/// Handle to an application installed on the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(usize);

impl AppId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub enum EventType {
    AppTimer {
        app: AppId,
        timer_id: u32,
    },
    PacketArrival {
        flow: FlowId,
        size: u32,
        sent_at: SimTime,
    },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Registration order, breaks ties at the same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Actions buffered during an application callback, in call order.
enum Action {
    Timer { at: SimTime, timer_id: u32 },
    Send(Datagram),
}

/// Context implementation passed to applications
struct ScopedContext<'a> {
    buffer: &'a mut Vec<Action>,
    now: SimTime,
}

impl SystemContext for ScopedContext<'_> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, at: SimTime, timer_id: u32) {
        self.buffer.push(Action::Timer { at, timer_id });
    }

    fn send(&mut self, datagram: Datagram) {
        self.buffer.push(Action::Send(datagram));
    }
}

struct InstalledApp {
    node: NodeId,
    address: Ipv4Addr,
    port: u16,
    app: Box<dyn TrafficApplication>,
}

/// Reference discrete-event clock and transport.
///
/// Datagrams cross a single shared channel with random loss and a uniformly
/// drawn one-way latency. Datagrams to an address no node owns are dropped
/// ("no route"). Events later than `stop_time` are never processed.
pub struct Simulator {
    time: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    events_processed: u64,

    config: SimConfig,
    rng: StdRng,

    nodes: Vec<Ipv4Addr>,
    apps: Vec<InstalledApp>,
    next_port: u16,

    monitor: FlowMonitor,
    pub dropped_loss: u64,
    pub dropped_no_route: u64,
}

impl Simulator {
    /// `nodes[i]` is the address of node `i`. Fails if `config` does not
    /// validate.
    pub fn new(config: SimConfig, nodes: Vec<Ipv4Addr>) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            time: SimTime::ZERO,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            events_processed: 0,
            config,
            rng,
            nodes,
            apps: Vec::new(),
            next_port: FIRST_EPHEMERAL_PORT,
            monitor: FlowMonitor::new(),
            dropped_loss: 0,
            dropped_no_route: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Binds `app` to `node` with the next free source port.
    pub fn install(
        &mut self,
        node: NodeId,
        app: Box<dyn TrafficApplication>,
    ) -> Result<AppId, ConfigError> {
        let address = *self.nodes.get(node as usize).ok_or_else(|| {
            ConfigError::Validation(format!(
                "cannot install on node {node}: only {} nodes exist",
                self.nodes.len()
            ))
        })?;
        let port = self.next_port;
        self.next_port = self
            .next_port
            .checked_add(1)
            .ok_or_else(|| ConfigError::Validation("ephemeral ports exhausted".into()))?;

        self.apps.push(InstalledApp {
            node,
            address,
            port,
            app,
        });
        let id = AppId(self.apps.len() - 1);
        debug!("installed app {} on node {} ({}:{})", id.0, node, address, port);
        Ok(id)
    }

    pub fn start_app(&mut self, app: AppId, at: SimTime) {
        self.call_app(app, |app, ctx| app.start(ctx, at));
    }

    pub fn stop_app(&mut self, app: AppId, at: SimTime) {
        self.call_app(app, |app, ctx| app.stop(ctx, at));
    }

    pub fn peek_next_event_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> SimTime {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn monitor(&self) -> &FlowMonitor {
        &self.monitor
    }

    /// Snapshot of every classified flow.
    pub fn flow_records(&self) -> Vec<ObservedFlow> {
        self.monitor.snapshot()
    }

    pub fn telemetry(&self, app: AppId) -> Option<AppTelemetry> {
        self.apps.get(app.0).map(|installed| installed.app.telemetry())
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    fn call_app(
        &mut self,
        app: AppId,
        f: impl FnOnce(&mut dyn TrafficApplication, &mut dyn SystemContext),
    ) {
        let mut buffer = Vec::new();
        {
            let Some(installed) = self.apps.get_mut(app.0) else {
                warn!("no application with id {}", app.0);
                return;
            };
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            f(installed.app.as_mut(), &mut ctx);
        }
        self.process_actions(app, buffer);
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies past the stop time.
    pub fn step(&mut self) -> bool {
        match self.event_queue.peek() {
            Some(e) if e.time <= self.config.stop_time => {}
            _ => return false,
        }
        let Some(event) = self.event_queue.pop() else {
            return false;
        };

        self.time = event.time;
        self.events_processed += 1;

        match event.event_type {
            EventType::AppTimer { app, timer_id } => {
                self.call_app(app, |app, ctx| app.on_timer(ctx, timer_id));
            }
            EventType::PacketArrival {
                flow,
                size,
                sent_at,
            } => {
                self.monitor.record_rx(flow, size, sent_at, self.time);
            }
        }
        true
    }

    pub fn run_until_complete(&mut self) {
        info!(
            "Simulation starting: {} nodes, {} apps, stop at {}",
            self.nodes.len(),
            self.apps.len(),
            self.config.stop_time
        );
        while self.step() {}
        if self.time < self.config.stop_time {
            self.time = self.config.stop_time;
        }
        info!(
            "Simulation complete: {} events, {} flows, {} lost in channel, {} without route",
            self.events_processed,
            self.monitor.len(),
            self.dropped_loss,
            self.dropped_no_route
        );
    }

    /// Per-flow and aggregate statistics plus per-source counters, over the
    /// whole `stop_time` window.
    pub fn export_report(&self) -> Result<SimulationReport, StatsError> {
        let stats = stats::aggregate(&self.flow_records(), self.config.stop_time.as_secs_f64())?;
        let sources = self
            .apps
            .iter()
            .map(|installed| SourceSummary {
                node: installed.node,
                address: installed.address,
                port: installed.port,
                telemetry: installed.app.telemetry(),
            })
            .collect();

        Ok(SimulationReport {
            scenario: None,
            config: self.config.clone(),
            end_time: self.time,
            events_processed: self.events_processed,
            dropped_loss: self.dropped_loss,
            dropped_no_route: self.dropped_no_route,
            sources,
            stats,
        })
    }

    fn process_actions(&mut self, source: AppId, buffer: Vec<Action>) {
        let Some((address, port)) = self
            .apps
            .get(source.0)
            .map(|installed| (installed.address, installed.port))
        else {
            return;
        };

        for action in buffer {
            match action {
                Action::Timer { at, timer_id } => {
                    let at = at.max(self.time);
                    self.push_event(at, EventType::AppTimer {
                        app: source,
                        timer_id,
                    });
                }
                Action::Send(datagram) => self.transmit(address, port, datagram),
            }
        }
    }

    fn transmit(&mut self, address: Ipv4Addr, port: u16, datagram: Datagram) {
        let key = FlowKey {
            source: address,
            destination: *datagram.destination.ip(),
            protocol: datagram.protocol,
            source_port: port,
            destination_port: datagram.destination.port(),
        };
        let flow = self.monitor.record_tx(key, datagram.size, self.time);

        if !self.nodes.contains(&key.destination) {
            self.dropped_no_route += 1;
            debug!("no route to {} for flow {}", key.destination, flow);
            return;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.dropped_loss += 1;
            debug!("flow {} datagram lost in channel", flow);
            return;
        }

        // 2. Calculate Latency
        let latency = self
            .rng
            .random_range(self.config.min_latency.as_nanos()..=self.config.max_latency.as_nanos());
        let arrival_time = self.time + SimTime::from_nanos(latency);

        self.push_event(arrival_time, EventType::PacketArrival {
            flow,
            size: datagram.size,
            sent_at: self.time,
        });
    }
}
