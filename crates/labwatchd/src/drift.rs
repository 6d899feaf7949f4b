//! Bounded random drift for metrics whose source is unavailable.

use labwatch_common::{clamp_percent, format_percent, MetricsSnapshot};
use rand::Rng;

use crate::sources::SourceUpdate;

/// Max step per refresh for each drifted metric
pub const UPS_WATTS_STEP: f64 = 10.0;
pub const PVE_CPU_STEP: f64 = 4.0;
pub const PVE_RAM_STEP: f64 = 1.5;
pub const WAN_DOWN_STEP: f64 = 50.0;
pub const WAN_UP_STEP: f64 = 10.0;
pub const DNS_BLOCKED_STEP: f64 = 0.5;
pub const VRAM_STEP: f64 = 0.4;

/// `value ± step`, clamped to `[min, max]`
pub fn drift<R: Rng + ?Sized>(rng: &mut R, value: f64, step: f64, min: f64, max: f64) -> f64 {
    let base = if value.is_finite() { value } else { min };
    let next = base + rng.gen_range(-step..=step);
    next.clamp(min, max)
}

/// Count moves by -1, 0 or +1 and never goes below zero
pub fn drift_count<R: Rng + ?Sized>(rng: &mut R, value: u32) -> u32 {
    match rng.gen_range(-1i32..=1) {
        -1 => value.saturating_sub(1),
        1 => value.saturating_add(1),
        _ => value,
    }
}

/// Apply one refresh worth of data to the snapshot.
///
/// Fields the update supplies are taken as-is (clamped); the rest drift
/// from their previous value. Timestamps and logs are the caller's job.
pub fn apply_update<R: Rng + ?Sized>(
    snapshot: &mut MetricsSnapshot,
    update: &SourceUpdate,
    vram_capacity_gb: f64,
    rng: &mut R,
) {
    snapshot.ups_watts = match update.ups_watts {
        Some(v) => v.max(0.0),
        None => drift(rng, snapshot.ups_watts, UPS_WATTS_STEP, 0.0, f64::MAX),
    };
    snapshot.pve_cpu = match update.pve_cpu {
        Some(v) => clamp_percent(v),
        None => drift(rng, snapshot.pve_cpu, PVE_CPU_STEP, 0.0, 100.0),
    };
    snapshot.pve_ram = match update.pve_ram {
        Some(v) => clamp_percent(v),
        None => drift(rng, snapshot.pve_ram, PVE_RAM_STEP, 0.0, 100.0),
    };
    snapshot.wan_down = match update.wan_down {
        Some(v) => v.max(0.0),
        None => drift(rng, snapshot.wan_down, WAN_DOWN_STEP, 0.0, f64::MAX),
    };
    snapshot.wan_up = match update.wan_up {
        Some(v) => v.max(0.0),
        None => drift(rng, snapshot.wan_up, WAN_UP_STEP, 0.0, f64::MAX),
    };
    let dns = match update.dns_blocked {
        Some(v) => v,
        None => drift(rng, snapshot.dns_blocked_pct(), DNS_BLOCKED_STEP, 0.0, 100.0),
    };
    snapshot.dns_blocked = format_percent(dns);
    snapshot.vram_usage = match update.vram_usage {
        Some(v) => v.clamp(0.0, vram_capacity_gb),
        None => drift(rng, snapshot.vram_usage, VRAM_STEP, 0.0, vram_capacity_gb),
    };
    snapshot.failed_logins = match update.failed_logins {
        Some(v) => v,
        None => drift_count(rng, snapshot.failed_logins),
    };
    snapshot.active_transcodes = match update.active_transcodes {
        Some(v) => v,
        None => drift_count(rng, snapshot.active_transcodes),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_drift_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut value = 99.0;
        for _ in 0..10_000 {
            let next = drift(&mut rng, value, 4.0, 0.0, 100.0);
            assert!((0.0..=100.0).contains(&next));
            assert!((next - value).abs() <= 4.0 + 1e-9);
            value = next;
        }
    }

    #[test]
    fn test_drift_recovers_from_nan() {
        let mut rng = StdRng::seed_from_u64(1);
        let next = drift(&mut rng, f64::NAN, 1.0, 0.0, 100.0);
        assert!((0.0..=1.0).contains(&next));
    }

    #[test]
    fn test_drift_count_steps_by_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let from_zero: Vec<u32> = (0..100).map(|_| drift_count(&mut rng, 0)).collect();
        assert!(from_zero.iter().all(|&c| c <= 1));
        assert!(from_zero.contains(&1));

        let from_five: Vec<u32> = (0..100).map(|_| drift_count(&mut rng, 5)).collect();
        assert!(from_five.iter().all(|&c| (4..=6).contains(&c)));
    }

    #[test]
    fn test_apply_update_takes_real_values() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut snap = MetricsSnapshot::with_defaults(0);
        let update = SourceUpdate {
            pve_cpu: Some(150.0),
            dns_blocked: Some(21.26),
            vram_usage: Some(40.0),
            active_transcodes: Some(0),
            ..Default::default()
        };
        apply_update(&mut snap, &update, 24.0, &mut rng);

        assert_eq!(snap.pve_cpu, 100.0);
        assert_eq!(snap.dns_blocked, "21.3%");
        assert_eq!(snap.vram_usage, 24.0);
        assert_eq!(snap.active_transcodes, 0);
    }

    #[test]
    fn test_apply_update_drifts_missing_values() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut snap = MetricsSnapshot::with_defaults(0);
        let before = snap.clone();
        apply_update(&mut snap, &SourceUpdate::default(), 24.0, &mut rng);

        assert!((snap.ups_watts - before.ups_watts).abs() <= UPS_WATTS_STEP);
        assert!((snap.wan_down - before.wan_down).abs() <= WAN_DOWN_STEP);
        assert!((snap.pve_ram - before.pve_ram).abs() <= PVE_RAM_STEP);
        assert!((snap.dns_blocked_pct() - before.dns_blocked_pct()).abs() <= DNS_BLOCKED_STEP + 0.05);
        assert!(snap.failed_logins.abs_diff(before.failed_logins) <= 1);
    }
}
