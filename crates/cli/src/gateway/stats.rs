//! Gateway run statistics.

use std::time::Duration;

use broker::MetricsSnapshot;

/// Statistics from a gateway run
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    /// Lines read from the input
    pub lines_read: u64,

    /// Payloads the target broker accepted
    pub accepted: u64,

    /// Payloads rejected because the queue was full
    pub overloaded: u64,

    /// Payloads a sync sink failed to deliver
    pub failed: u64,

    /// Completed `restart_all` rounds
    pub restarts: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Final per-broker counters, sorted by id
    pub brokers: Vec<(String, MetricsSnapshot)>,
}

impl GatewayStats {
    /// Accepted payloads per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.accepted as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Gateway Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Accepted: {}", self.accepted);
        println!("   ├─ Overloaded: {}", self.overloaded);
        println!("   ├─ Failed: {}", self.failed);
        println!("   ├─ Restarts: {}", self.restarts);
        println!("   └─ Throughput: {:.2}/s", self.throughput());

        if !self.brokers.is_empty() {
            println!("\n📈 Brokers");
            for (i, (id, m)) in self.brokers.iter().enumerate() {
                let prefix = if i == self.brokers.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: enqueued={} delivered={} overloaded={} failures={} cache={} shutdowns={}",
                    prefix,
                    id,
                    m.enqueued,
                    m.delivered,
                    m.overloaded,
                    m.failures,
                    m.cache_len,
                    m.shutdowns
                );
            }
        }

        println!();
    }
}
