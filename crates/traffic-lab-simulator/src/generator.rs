//! On/off traffic source.
//!
//! The generator alternates between an on phase, where it emits fixed-size
//! datagrams at the configured rate, and a silent off phase. Period lengths are
//! drawn independently from the configured distributions, so exponential
//! periods give a memoryless alternating renewal process and constant periods
//! give periodic (CBR) traffic.
//!
//! All timing goes through [`SystemContext`]: phase expiry and every
//! transmission are one-shot timers on the caller's clock.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::debug;
use traffic_lab_abstract::{
    AppTelemetry, ConfigError, Datagram, SimTime, SystemContext, TrafficApplication,
    TrafficSourceConfig,
};

use crate::distribution::DurationSampler;

const START_TIMER: u32 = 0;
const STOP_TIMER: u32 = 1;
const PHASE_TIMER: u32 = 2;
const SEND_TIMER: u32 = 3;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Silent gap entered when both periods of a cycle sample to zero.
const IDLE_TICK: SimTime = SimTime::from_nanos(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Not started yet.
    Idle,
    On,
    Off,
    /// Terminal.
    Stopped,
}

/// Run-time state owned by one generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrafficSourceState {
    pub phase: Phase,
    pub phase_start: SimTime,
    pub phase_end: SimTime,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    /// On time of completed (or cut short) on phases.
    pub time_on: SimTime,
}

impl Default for TrafficSourceState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            phase_start: SimTime::ZERO,
            phase_end: SimTime::ZERO,
            bytes_sent: 0,
            packets_sent: 0,
            time_on: SimTime::ZERO,
        }
    }
}

pub struct OnOffGenerator {
    config: TrafficSourceConfig,
    on_sampler: DurationSampler,
    off_sampler: DurationSampler,
    rng: StdRng,
    state: TrafficSourceState,
    start_time: Option<SimTime>,
    stop_time: Option<SimTime>,
    // Packets due in the current on phase, and how many went out so far.
    phase_packets: u64,
    phase_sent: u64,
}

impl OnOffGenerator {
    /// Validates `config` and seeds the generator's private RNG.
    pub fn new(config: TrafficSourceConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let on_sampler = DurationSampler::new(&config.on_time, "on")?;
        let off_sampler = DurationSampler::new(&config.off_time, "off")?;
        Ok(Self {
            config,
            on_sampler,
            off_sampler,
            rng: StdRng::seed_from_u64(seed),
            state: TrafficSourceState::default(),
            start_time: None,
            stop_time: None,
            phase_packets: 0,
            phase_sent: 0,
        })
    }

    pub fn config(&self) -> &TrafficSourceConfig {
        &self.config
    }

    pub fn state(&self) -> &TrafficSourceState {
        &self.state
    }

    pub fn start_time(&self) -> Option<SimTime> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<SimTime> {
        self.stop_time
    }

    /// Number of whole packets that fit into an on period of length `span`:
    /// `floor(rate * span / (8 * packet_size))`.
    pub fn packets_in(&self, span: SimTime) -> u64 {
        let bits = self.config.packet_size as u128 * 8;
        let count = self.config.data_rate.bps() as u128 * span.as_nanos() as u128
            / (bits * NANOS_PER_SEC);
        count.min(u64::MAX as u128) as u64
    }

    /// Offset of the `k`-th packet from the start of its on period.
    fn send_offset(&self, k: u64) -> SimTime {
        let bits = self.config.packet_size as u128 * 8;
        let nanos = k as u128 * bits * NANOS_PER_SEC / self.config.data_rate.bps() as u128;
        SimTime::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    fn before_stop(&self, at: SimTime) -> bool {
        self.stop_time.is_none_or(|stop| at < stop)
    }

    fn budget_allows_another(&self) -> bool {
        self.config.max_bytes.is_none_or(|max| {
            self.state.bytes_sent + self.config.packet_size as u64 <= max
        })
    }

    /// Draws a period length for `next` and enters that phase. A zero-length
    /// period is skipped at once in favour of the opposite phase. If a whole
    /// on/off cycle comes out zero, the source idles for one tick so the
    /// clock always moves forward.
    fn advance(&mut self, ctx: &mut dyn SystemContext, mut next: Phase) {
        let now = ctx.now();
        for _ in 0..2 {
            let sampler = match next {
                Phase::On => &self.on_sampler,
                _ => &self.off_sampler,
            };
            let span = sampler.sample(&mut self.rng);
            if !span.is_zero() {
                self.enter(ctx, next, now, span);
                return;
            }
            next = if next == Phase::On { Phase::Off } else { Phase::On };
        }
        self.enter(ctx, Phase::Off, now, IDLE_TICK);
    }

    fn enter(&mut self, ctx: &mut dyn SystemContext, phase: Phase, now: SimTime, span: SimTime) {
        self.state.phase = phase;
        self.state.phase_start = now;
        self.state.phase_end = now + span;
        debug!(
            "node {} {:?} for {} (until {})",
            self.config.node, phase, span, self.state.phase_end
        );

        if phase == Phase::On {
            self.phase_packets = self.packets_in(span);
            self.phase_sent = 0;
            self.schedule_next_send(ctx);
        }
        if self.before_stop(self.state.phase_end) {
            ctx.schedule_at(self.state.phase_end, PHASE_TIMER);
        }
    }

    fn schedule_next_send(&mut self, ctx: &mut dyn SystemContext) {
        if self.phase_sent >= self.phase_packets {
            return;
        }
        let at = self.state.phase_start + self.send_offset(self.phase_sent);
        if self.before_stop(at) {
            ctx.schedule_at(at, SEND_TIMER);
        }
    }

    /// Credits the elapsed part of an on phase to `time_on`.
    fn close_phase(&mut self, now: SimTime) {
        if self.state.phase == Phase::On {
            let end = now.min(self.state.phase_end);
            self.state.time_on = self.state.time_on + (end - self.state.phase_start);
        }
    }

    fn finish(&mut self, now: SimTime, reason: &str) {
        self.close_phase(now);
        self.state.phase = Phase::Stopped;
        self.state.phase_end = now;
        debug!(
            "node {} stopped at {} ({}): {} packets, {} bytes",
            self.config.node, now, reason, self.state.packets_sent, self.state.bytes_sent
        );
    }

    fn on_send(&mut self, ctx: &mut dyn SystemContext) {
        let now = ctx.now();
        if self.state.phase != Phase::On || !self.before_stop(now) {
            return;
        }
        ctx.send(Datagram::new(
            self.config.destination,
            self.config.protocol,
            self.config.packet_size,
        ));
        self.state.bytes_sent += self.config.packet_size as u64;
        self.state.packets_sent += 1;
        self.phase_sent += 1;

        if !self.budget_allows_another() {
            self.finish(now, "byte budget spent");
            return;
        }
        self.schedule_next_send(ctx);
    }

    fn on_phase_expiry(&mut self, ctx: &mut dyn SystemContext) {
        let now = ctx.now();
        if now != self.state.phase_end {
            return;
        }
        match self.state.phase {
            Phase::On => {
                self.close_phase(now);
                self.advance(ctx, Phase::Off);
            }
            Phase::Off => self.advance(ctx, Phase::On),
            Phase::Idle | Phase::Stopped => {}
        }
    }
}

impl TrafficApplication for OnOffGenerator {
    fn start(&mut self, ctx: &mut dyn SystemContext, at: SimTime) {
        self.start_time = Some(at);
        ctx.schedule_at(at, START_TIMER);
    }

    fn stop(&mut self, ctx: &mut dyn SystemContext, at: SimTime) {
        self.stop_time = Some(at);
        ctx.schedule_at(at, STOP_TIMER);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        match timer_id {
            START_TIMER => {
                if self.state.phase != Phase::Idle || !self.before_stop(ctx.now()) {
                    return;
                }
                if !self.budget_allows_another() {
                    self.finish(ctx.now(), "byte budget below one packet");
                    return;
                }
                self.advance(ctx, Phase::On);
            }
            STOP_TIMER => {
                if self.state.phase != Phase::Stopped {
                    self.finish(ctx.now(), "stop time reached");
                }
            }
            PHASE_TIMER => self.on_phase_expiry(ctx),
            SEND_TIMER => self.on_send(ctx),
            other => debug!("node {} ignoring unknown timer {}", self.config.node, other),
        }
    }

    fn telemetry(&self) -> AppTelemetry {
        AppTelemetry {
            packets_sent: self.state.packets_sent,
            bytes_sent: self.state.bytes_sent,
            time_on: self.state.time_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use traffic_lab_abstract::{DataRate, DurationDistribution, Protocol};

    /// Minimal clock that fires timers in (time, registration) order.
    #[derive(Default)]
    struct ManualClock {
        now: SimTime,
        seq: u64,
        timers: BinaryHeap<Reverse<(SimTime, u64, u32)>>,
        sent: Vec<(SimTime, Datagram)>,
    }

    impl SystemContext for ManualClock {
        fn now(&self) -> SimTime {
            self.now
        }

        fn schedule_at(&mut self, at: SimTime, timer_id: u32) {
            self.timers.push(Reverse((at.max(self.now), self.seq, timer_id)));
            self.seq += 1;
        }

        fn send(&mut self, datagram: Datagram) {
            self.sent.push((self.now, datagram));
        }
    }

    impl ManualClock {
        fn run(&mut self, app: &mut OnOffGenerator) {
            while let Some(Reverse((at, _, timer_id))) = self.timers.pop() {
                assert!(at >= self.now, "timers must fire in time order");
                self.now = at;
                app.on_timer(self, timer_id);
            }
        }
    }

    fn source(on: DurationDistribution, off: DurationDistribution) -> TrafficSourceConfig {
        TrafficSourceConfig {
            node: 0,
            destination: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 6), 9),
            protocol: Protocol::Udp,
            packet_size: 4096,
            data_rate: DataRate::from_mbps(10).unwrap(),
            on_time: on,
            off_time: off,
            max_bytes: None,
        }
    }

    fn run_window(app: &mut OnOffGenerator, start: SimTime, stop: SimTime) -> ManualClock {
        let mut clock = ManualClock::default();
        app.start(&mut clock, start);
        app.stop(&mut clock, stop);
        clock.run(app);
        clock
    }

    #[test]
    fn cbr_source_never_idles() {
        let mut app = OnOffGenerator::new(
            source(
                DurationDistribution::constant(1.0),
                DurationDistribution::constant(0.0),
            ),
            1,
        )
        .unwrap();
        let mut clock = ManualClock::default();
        app.start(&mut clock, SimTime::from_secs(2));
        app.stop(&mut clock, SimTime::from_secs(10));

        while let Some(std::cmp::Reverse((at, _, timer_id))) = clock.timers.pop() {
            clock.now = at;
            app.on_timer(&mut clock, timer_id);
            if at >= SimTime::from_secs(2) && at < SimTime::from_secs(10) {
                assert_eq!(app.state().phase, Phase::On, "idle at {at}");
            }
        }

        assert_eq!(app.state().phase, Phase::Stopped);
        assert_eq!(app.state().time_on, SimTime::from_secs(8));
        // floor(10e6 * 1 / 32768) = 305 packets per one-second on period
        assert_eq!(clock.sent.len(), 8 * 305);
        assert_eq!(app.state().bytes_sent, 8 * 305 * 4096);
    }

    #[test]
    fn packets_are_evenly_spaced_within_an_on_period() {
        let mut app = OnOffGenerator::new(
            source(
                DurationDistribution::constant(1.0),
                DurationDistribution::constant(1.0),
            ),
            1,
        )
        .unwrap();
        let clock = run_window(&mut app, SimTime::ZERO, SimTime::from_secs(1));

        // 4096 bytes at 10 Mbps take 3.2768 ms
        assert_eq!(clock.sent.len(), 305);
        for (k, (at, _)) in clock.sent.iter().enumerate() {
            assert_eq!(at.as_nanos(), k as u64 * 3_276_800);
        }
    }

    #[test]
    fn sends_stay_inside_the_active_window() {
        let start = SimTime::from_secs(2);
        let stop = SimTime::from_millis(7_300);
        for (on, off) in [
            (
                DurationDistribution::constant(1.0),
                DurationDistribution::constant(0.0),
            ),
            (
                DurationDistribution::exponential(0.5),
                DurationDistribution::exponential(0.5),
            ),
            (
                DurationDistribution::constant(0.25),
                DurationDistribution::exponential(1.0),
            ),
        ] {
            let mut app = OnOffGenerator::new(source(on, off), 9).unwrap();
            let clock = run_window(&mut app, start, stop);
            assert!(!clock.sent.is_empty());
            assert!(clock.sent.iter().all(|(at, _)| *at >= start && *at < stop));
            assert_eq!(app.state().phase, Phase::Stopped);
        }
    }

    #[test]
    fn on_time_fraction_converges_to_duty_cycle() {
        for (on_mean, off_mean) in [(1.0, 1.0), (1.0, 3.0)] {
            let mut config = source(
                DurationDistribution::exponential(on_mean),
                DurationDistribution::exponential(off_mean),
            );
            // One packet per second keeps the event count small.
            config.packet_size = 1000;
            config.data_rate = DataRate::from_bps(8000).unwrap();
            let expected = config.duty_cycle();

            let mut app = OnOffGenerator::new(config, 2024).unwrap();
            let horizon = SimTime::from_secs(40_000);
            run_window(&mut app, SimTime::ZERO, horizon);

            let fraction = app.state().time_on.as_secs_f64() / horizon.as_secs_f64();
            assert!(
                (fraction - expected).abs() < 0.03,
                "on fraction {fraction} vs expected {expected}"
            );
        }
    }

    #[test]
    fn zero_length_on_period_sends_nothing() {
        let mut app = OnOffGenerator::new(
            source(
                DurationDistribution::constant(0.0),
                DurationDistribution::exponential(1.0),
            ),
            3,
        )
        .unwrap();
        let clock = run_window(&mut app, SimTime::ZERO, SimTime::from_secs(20));
        assert!(clock.sent.is_empty());
        assert_eq!(app.state().time_on, SimTime::ZERO);
    }

    #[test]
    fn sub_nanosecond_constant_is_rejected() {
        let result = OnOffGenerator::new(
            source(
                DurationDistribution::constant(1e-10),
                DurationDistribution::constant(0.0),
            ),
            1,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidDistribution { phase: "on", .. })
        ));
    }

    #[test]
    fn zero_length_cycles_still_advance_the_clock() {
        // Roughly four in ten draws of a 1 ns mean round to zero, so whole
        // zero-length cycles come up often.
        let mut app = OnOffGenerator::new(
            source(
                DurationDistribution::exponential(1e-9),
                DurationDistribution::constant(0.0),
            ),
            5,
        )
        .unwrap();
        let stop = SimTime::from_micros(10);
        let clock = run_window(&mut app, SimTime::ZERO, stop);

        assert_eq!(clock.now, stop);
        assert_eq!(app.state().phase, Phase::Stopped);
        assert!(app.state().time_on > SimTime::ZERO);
        assert!(app.state().time_on <= stop);
        // 4096 bytes never fit into a few nanoseconds at 10 Mbps
        assert!(clock.sent.is_empty());
    }

    #[test]
    fn nothing_happens_before_start_or_after_stop() {
        let mut app = OnOffGenerator::new(
            source(
                DurationDistribution::constant(1.0),
                DurationDistribution::constant(0.0),
            ),
            1,
        )
        .unwrap();
        let mut clock = ManualClock::default();
        app.start(&mut clock, SimTime::from_secs(5));
        app.stop(&mut clock, SimTime::from_secs(3));
        clock.run(&mut app);
        assert!(clock.sent.is_empty());
        assert_eq!(app.state().phase, Phase::Stopped);
    }

    #[test]
    fn byte_budget_stops_the_source_early() {
        let mut config = source(
            DurationDistribution::constant(10.0),
            DurationDistribution::constant(0.0),
        );
        config.packet_size = 2048;
        config.max_bytes = Some(100 * 2048 + 10);
        let mut app = OnOffGenerator::new(config, 1).unwrap();
        let clock = run_window(&mut app, SimTime::ZERO, SimTime::from_secs(10));
        assert_eq!(clock.sent.len(), 100);
        assert_eq!(app.state().phase, Phase::Stopped);
        assert!(app.state().phase_end < SimTime::from_secs(1));
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let mut config = source(
            DurationDistribution::constant(1.0),
            DurationDistribution::constant(0.0),
        );
        config.packet_size = 0;
        assert!(matches!(
            OnOffGenerator::new(config, 0),
            Err(ConfigError::ZeroPacketSize)
        ));
    }
}
