//! Counter sample types and reset reconciliation.

use serde::{Deserialize, Serialize};

/// One raw cumulative counter reading for a device.
///
/// `seq` is the append order assigned by the store. Reconciliation always
/// pairs a sample with the most recent prior sample *by recorded order*,
/// so backfilled or out-of-order timestamps cannot pair against the wrong
/// neighbour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSample {
    pub seq: i64,
    pub mac: String,
    /// Unix timestamp (router local clock).
    pub ts: i64,
    /// Cumulative download bytes since the router's last counter reset.
    pub dl_cum: u64,
    /// Cumulative upload bytes since the router's last counter reset.
    pub ul_cum: u64,
}

/// Traffic consumed between two consecutive samples of the same device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficDelta {
    pub dl: u64,
    pub ul: u64,
    /// True when either counter went backwards between the two samples.
    pub reset: bool,
}

/// Reconcile two consecutive samples into a traffic delta.
///
/// Cumulative counters only ever grow between resets, so a decrease in
/// either direction means the router restarted its accounting. In that case
/// the later sample's absolute values *are* the traffic observed since the
/// reset; subtracting would produce garbage. Download and upload are
/// compared independently, but a reset in either direction resets both
/// (the router clears the whole counter pair at once).
pub fn reconcile(prev: &CounterSample, next: &CounterSample) -> TrafficDelta {
    let dl_reset = next.dl_cum < prev.dl_cum;
    let ul_reset = next.ul_cum < prev.ul_cum;
    if dl_reset || ul_reset {
        TrafficDelta {
            dl: next.dl_cum,
            ul: next.ul_cum,
            reset: true,
        }
    } else {
        TrafficDelta {
            dl: next.dl_cum - prev.dl_cum,
            ul: next.ul_cum - prev.ul_cum,
            reset: false,
        }
    }
}

/// Reconcile a single cumulative counter (per-application streams carry
/// only a combined byte count).
pub(crate) fn reconcile_single(prev_cum: u64, next_cum: u64) -> (u64, bool) {
    if next_cum < prev_cum {
        (next_cum, true)
    } else {
        (next_cum - prev_cum, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq: i64, ts: i64, dl: u64, ul: u64) -> CounterSample {
        CounterSample {
            seq,
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            ts,
            dl_cum: dl,
            ul_cum: ul,
        }
    }

    #[test]
    fn monotonic_counters_subtract() {
        let prev = sample(1, 0, 1000, 200);
        let next = sample(2, 300, 1500, 250);
        let delta = reconcile(&prev, &next);
        assert_eq!(delta.dl, 500);
        assert_eq!(delta.ul, 50);
        assert!(!delta.reset);
    }

    #[test]
    fn decrease_is_a_reset_not_negative_traffic() {
        let prev = sample(3, 600, 1500, 250);
        let next = sample(4, 900, 200, 40);
        let delta = reconcile(&prev, &next);
        assert_eq!(delta.dl, 200);
        assert_eq!(delta.ul, 40);
        assert!(delta.reset);
    }

    #[test]
    fn single_direction_decrease_still_resets_both() {
        let prev = sample(1, 0, 1000, 200);
        let next = sample(2, 300, 1500, 100);
        let delta = reconcile(&prev, &next);
        assert_eq!(delta.dl, 1500);
        assert_eq!(delta.ul, 100);
        assert!(delta.reset);
    }

    #[test]
    fn equal_counters_are_zero_delta() {
        let prev = sample(1, 0, 1000, 200);
        let next = sample(2, 300, 1000, 200);
        let delta = reconcile(&prev, &next);
        assert_eq!(delta, TrafficDelta { dl: 0, ul: 0, reset: false });
    }

    #[test]
    fn single_counter_reset() {
        assert_eq!(reconcile_single(100, 400), (300, false));
        assert_eq!(reconcile_single(400, 50), (50, true));
    }
}
