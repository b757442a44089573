pub mod probe_monitor;
pub mod reported_monitor;

pub use probe_monitor::ProbeNetworkMonitor;
pub use reported_monitor::ReportedNetworkMonitor;

/// Capacity of the state broadcast channel shared by the monitors.
pub(crate) const STATE_CHANNEL_CAPACITY: usize = 64;
