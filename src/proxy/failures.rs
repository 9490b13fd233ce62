//! Consecutive transport-failure counting per proxy.

use std::collections::HashMap;
use std::sync::Mutex;

use super::address::ProxyAddress;

/// Counts consecutive failures per address so a proxy is only blamed after
/// more than `threshold` failures in a row.
#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    failures: Mutex<HashMap<ProxyAddress, u32>>,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Records one failure. Returns `true` once the count exceeds the
    /// threshold, in which case the counter is reset.
    pub fn record_failure(&self, address: &ProxyAddress) -> bool {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(address.clone()).or_insert(0);
        *count += 1;

        if *count > self.threshold {
            failures.remove(address);
            true
        } else {
            false
        }
    }

    /// Clears the count after a successful request.
    pub fn record_success(&self, address: &ProxyAddress) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address);
    }

    /// Drops the counters of addresses that are no longer in `members`.
    pub fn retain(&self, members: &[ProxyAddress]) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|address, _| members.contains(address));
    }

    /// Returns the number of addresses with a pending count.
    pub fn tracked(&self) -> usize {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns the current consecutive-failure count.
    pub fn failures(&self, address: &ProxyAddress) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(2)
    }
}
