//! Local, remote, and total vulnerability factors.
//!
//! - LVF = accumulated / (instructions × distinct resources)
//! - RVF = remote accumulated / remote samples
//! - TVF = local weight × LVF + remote weight × RVF
//!
//! Divisors are floored at 1 so an idle ledger yields zero instead of NaN.

use serde::{Deserialize, Serialize};

use super::exposure::Exposure;

/// Weights applied when combining local and remote factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub local: f64,
    pub remote: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            local: 0.5,
            remote: 0.5,
        }
    }
}

/// Local factor for one resource class.
#[inline]
pub fn local_factor(accumulated: f64, instructions: u64, distinct: usize) -> f64 {
    if instructions == 0 {
        return 0.0;
    }
    accumulated / (instructions as f64 * distinct.max(1) as f64)
}

/// Remote factor for one resource class.
#[inline]
pub fn remote_factor(accumulated: f64, remote_count: u64) -> f64 {
    accumulated / remote_count.max(1) as f64
}

/// Combine local and remote factors into the total factor.
///
/// Until a thread has seen a remote sample its total is its (possibly
/// squared) local factor alone. `redundant` squares the local term first,
/// modelling the reduced exposure of a redundantly executed thread.
pub fn total_factor(
    local: Exposure,
    remote: Exposure,
    has_remote: bool,
    redundant: bool,
    weights: FactorWeights,
) -> Exposure {
    let local = if redundant { local.squared() } else { local };
    if !has_remote {
        return local;
    }
    local.scaled(weights.local) + remote.scaled(weights.remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_factor_floors_divisor() {
        assert_eq!(local_factor(12.0, 4, 0), 3.0);
        assert_eq!(local_factor(12.0, 4, 3), 1.0);
        assert_eq!(local_factor(12.0, 0, 3), 0.0);
    }

    #[test]
    fn test_remote_factor_floors_divisor() {
        assert_eq!(remote_factor(6.0, 0), 6.0);
        assert_eq!(remote_factor(6.0, 3), 2.0);
    }

    #[test]
    fn test_total_without_remote_uses_local_only() {
        let local = Exposure::new(0.2, 0.4, 0.6);
        let remote = Exposure::new(9.0, 9.0, 9.0);
        let total = total_factor(local, remote, false, false, FactorWeights::default());
        assert_eq!(total, local);
    }

    #[test]
    fn test_total_weighted() {
        let local = Exposure::new(1.0, 2.0, 4.0);
        let remote = Exposure::new(3.0, 2.0, 0.0);
        let total = total_factor(local, remote, true, false, FactorWeights::default());
        assert_eq!(total, Exposure::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_total_redundant_squares_local() {
        let local = Exposure::new(0.5, 0.5, 0.5);
        let total = total_factor(local, Exposure::ZERO, false, true, FactorWeights::default());
        assert_eq!(total, Exposure::new(0.25, 0.25, 0.25));
    }
}
