use serde::Serialize;

use crate::packet::Datagram;
use crate::time::SimTime;

/// Counters an application reports once the run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AppTelemetry {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    /// Total simulated time spent actively sending.
    pub time_on: SimTime,
}

/// The capability a clock/transport provides to a traffic application.
/// Applications never read ambient time; everything goes through this context.
pub trait SystemContext {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Register a one-shot timer. `timer_id` is handed back to
    /// [`TrafficApplication::on_timer`] when `at` is reached.
    /// Timers fire in time order; ties fire in registration order.
    /// A time in the past fires at the current instant.
    fn schedule_at(&mut self, at: SimTime, timer_id: u32);

    /// Hand a datagram to the network stack. Delivery failures are not
    /// reported back to the sender; they only show up in the flow records.
    fn send(&mut self, datagram: Datagram);
}

/// An application driven by a [`SystemContext`].
pub trait TrafficApplication {
    /// Arrange for the application to begin at `at`.
    fn start(&mut self, ctx: &mut dyn SystemContext, at: SimTime);

    /// Arrange for the application to stop at `at`.
    fn stop(&mut self, ctx: &mut dyn SystemContext, at: SimTime);

    /// Called when a timer registered through `schedule_at` expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32);

    fn telemetry(&self) -> AppTelemetry {
        AppTelemetry::default()
    }
}
