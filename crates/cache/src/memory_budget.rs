//! Memory budget tracking and periodic pressure checks
//!
//! Large documents can accumulate many page rasters and decoded images. A
//! lightweight monitor is polled from the event loop; at most once per interval it
//! compares current usage with the budget and reports whether the user should be
//! offered a manual cleanup.

use std::time::{Duration, Instant};

/// Memory pressure level indicating cache health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    /// Memory usage is low (< 50% utilization)
    Low,
    /// Memory usage is moderate (50-75% utilization)
    Moderate,
    /// Memory usage is high (75-90% utilization)
    High,
    /// Memory usage is critical (> 90% utilization)
    Critical,
}

impl MemoryPressure {
    /// Get the memory pressure level from a utilization ratio (0.0 to 1.0)
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            MemoryPressure::Low
        } else if utilization < 0.75 {
            MemoryPressure::Moderate
        } else if utilization < 0.90 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }

    /// Returns true if memory pressure requires action (High or Critical)
    pub fn needs_eviction(&self) -> bool {
        matches!(self, MemoryPressure::High | MemoryPressure::Critical)
    }
}

/// Configuration for memory budget thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBudgetConfig {
    /// Total memory budget in bytes
    pub total_budget: usize,

    /// Utilization (0.0 to 1.0) above which cleanup is offered
    pub warning_threshold: f64,

    /// Minimum time between two checks
    pub check_interval: Duration,
}

impl Default for MemoryBudgetConfig {
    fn default() -> Self {
        Self {
            total_budget: 512 * 1024 * 1024,
            warning_threshold: 0.85,
            check_interval: Duration::from_secs(5),
        }
    }
}

impl MemoryBudgetConfig {
    /// Create a configuration with a total budget in megabytes
    pub fn new(total_budget_mb: usize) -> Self {
        Self {
            total_budget: total_budget_mb * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Set the warning threshold (0.0 to 1.0)
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the interval between checks
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Get the warning threshold in bytes
    pub fn warning_bytes(&self) -> usize {
        (self.total_budget as f64 * self.warning_threshold) as usize
    }
}

/// Result of one memory check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReport {
    pub used: usize,
    pub budget: usize,
    pub pressure: MemoryPressure,

    /// Usage crossed the warning threshold; the host should offer a cleanup
    pub offer_cleanup: bool,
}

impl MemoryReport {
    pub fn utilization(&self) -> f64 {
        if self.budget == 0 {
            0.0
        } else {
            self.used as f64 / self.budget as f64
        }
    }
}

/// Rate-limited memory pressure monitor
///
/// # Example
///
/// ```
/// use folio_cache::{MemoryBudgetConfig, MemoryMonitor};
/// use std::time::Instant;
///
/// let mut monitor = MemoryMonitor::new(MemoryBudgetConfig::new(100));
/// let report = monitor.check(Instant::now(), 95 * 1024 * 1024).unwrap();
/// assert!(report.offer_cleanup);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryMonitor {
    config: MemoryBudgetConfig,
    last_check: Option<Instant>,
}

impl MemoryMonitor {
    pub fn new(config: MemoryBudgetConfig) -> Self {
        Self {
            config,
            last_check: None,
        }
    }

    pub fn config(&self) -> &MemoryBudgetConfig {
        &self.config
    }

    /// Run a check if the interval has elapsed since the previous one
    ///
    /// Returns `None` when the check was skipped.
    pub fn check(&mut self, now: Instant, used: usize) -> Option<MemoryReport> {
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) < self.config.check_interval {
                return None;
            }
        }
        self.last_check = Some(now);
        Some(self.evaluate(used))
    }

    /// Evaluate usage immediately, ignoring the interval
    pub fn evaluate(&self, used: usize) -> MemoryReport {
        let budget = self.config.total_budget;
        let utilization = if budget == 0 {
            0.0
        } else {
            used as f64 / budget as f64
        };
        let pressure = MemoryPressure::from_utilization(utilization);
        let offer_cleanup = used > self.config.warning_bytes();

        if offer_cleanup {
            tracing::warn!(used, budget, ?pressure, "memory usage above warning threshold");
        }

        MemoryReport {
            used,
            budget,
            pressure,
            offer_cleanup,
        }
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new(MemoryBudgetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_levels() {
        assert_eq!(MemoryPressure::from_utilization(0.1), MemoryPressure::Low);
        assert_eq!(MemoryPressure::from_utilization(0.6), MemoryPressure::Moderate);
        assert_eq!(MemoryPressure::from_utilization(0.8), MemoryPressure::High);
        assert_eq!(MemoryPressure::from_utilization(0.95), MemoryPressure::Critical);
        assert!(MemoryPressure::High.needs_eviction());
        assert!(!MemoryPressure::Moderate.needs_eviction());
    }

    #[test]
    fn test_check_is_rate_limited() {
        let config = MemoryBudgetConfig::new(10).with_check_interval(Duration::from_secs(10));
        let mut monitor = MemoryMonitor::new(config);
        let start = Instant::now();

        assert!(monitor.check(start, 0).is_some());
        assert!(monitor.check(start + Duration::from_secs(3), 0).is_none());
        assert!(monitor.check(start + Duration::from_secs(11), 0).is_some());
    }

    #[test]
    fn test_offer_cleanup_above_warning() {
        let monitor = MemoryMonitor::new(MemoryBudgetConfig::new(100).with_warning_threshold(0.5));
        assert!(!monitor.evaluate(40 * 1024 * 1024).offer_cleanup);

        let report = monitor.evaluate(60 * 1024 * 1024);
        assert!(report.offer_cleanup);
        assert!((report.utilization() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_zero_budget() {
        let monitor = MemoryMonitor::new(MemoryBudgetConfig::new(0));
        let report = monitor.evaluate(0);
        assert_eq!(report.pressure, MemoryPressure::Low);
        assert_eq!(report.utilization(), 0.0);
    }
}
