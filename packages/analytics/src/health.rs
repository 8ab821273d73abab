//! Customer health scoring.
//!
//! Pure computation over metrics that were already fetched; nothing here
//! talks to the store. Fewer tickets, fewer unresolved high priority
//! tickets, a higher resolution rate and a longer tenure all score better.

use support_desk_analytics_models::{
    CustomerRef, HealthBand, HealthScoreResult, ScoreBreakdown, TicketMetrics,
};

/// Score of a customer with nothing counting against them.
pub const BASELINE: f64 = 100.0;

/// Days treated as one month when computing ticket velocity.
const DAYS_PER_MONTH: f64 = 30.0;

/// Tickets per month a customer can file before velocity costs points.
const VELOCITY_ALLOWANCE: f64 = 2.0;

/// Points per ticket/month above the allowance.
const VELOCITY_PENALTY_PER_UNIT: f64 = 6.0;

/// Most points velocity alone can take away.
const MAX_VELOCITY_PENALTY: f64 = 30.0;

/// Points per unresolved ticket, by priority.
const OPEN_HIGH_PENALTY: f64 = 12.0;
const OPEN_MEDIUM_PENALTY: f64 = 4.0;
const OPEN_LOW_PENALTY: f64 = 2.0;

/// Points for resolving every ticket ever filed.
const MAX_RESOLUTION_BONUS: f64 = 10.0;

/// Points per full year of tenure, and the cap.
const TENURE_BONUS_PER_YEAR: f64 = 1.0;
const MAX_TENURE_BONUS: f64 = 5.0;

#[allow(clippy::cast_precision_loss)]
fn as_f64(n: u64) -> f64 {
    n as f64
}

/// Tickets filed per 30 days of tenure. Tenure under a month counts as one
/// month.
#[must_use]
pub fn ticket_velocity(metrics: &TicketMetrics) -> f64 {
    let months = (as_f64(metrics.tenure_days) / DAYS_PER_MONTH).max(1.0);
    as_f64(metrics.total_tickets) / months
}

/// Share of tickets in Resolved or Closed, `0.0` with no tickets.
#[must_use]
pub fn resolution_rate(metrics: &TicketMetrics) -> f64 {
    if metrics.total_tickets == 0 {
        return 0.0;
    }
    as_f64(metrics.resolved_tickets.min(metrics.total_tickets)) / as_f64(metrics.total_tickets)
}

/// Computes each factor's contribution.
#[must_use]
pub fn breakdown(metrics: &TicketMetrics) -> ScoreBreakdown {
    let velocity = ticket_velocity(metrics);
    let velocity_penalty = ((velocity - VELOCITY_ALLOWANCE).max(0.0) * VELOCITY_PENALTY_PER_UNIT)
        .min(MAX_VELOCITY_PENALTY);

    let priority_penalty = as_f64(metrics.open_high).mul_add(
        OPEN_HIGH_PENALTY,
        as_f64(metrics.open_medium).mul_add(
            OPEN_MEDIUM_PENALTY,
            as_f64(metrics.open_low) * OPEN_LOW_PENALTY,
        ),
    );

    let rate = resolution_rate(metrics);
    let resolution_bonus = rate * MAX_RESOLUTION_BONUS;

    let tenure_bonus =
        (as_f64(metrics.tenure_days / 365) * TENURE_BONUS_PER_YEAR).min(MAX_TENURE_BONUS);

    ScoreBreakdown {
        baseline: BASELINE,
        ticket_velocity: velocity,
        velocity_penalty,
        priority_penalty,
        resolution_rate: rate,
        resolution_bonus,
        tenure_bonus,
    }
}

/// Scores a customer's support health in `[0, 100]`.
///
/// A customer with no tickets scores exactly [`BASELINE`]. The same
/// metrics always produce the same score and breakdown.
#[must_use]
pub fn score(customer: CustomerRef, metrics: &TicketMetrics) -> HealthScoreResult {
    let breakdown = breakdown(metrics);

    let raw = breakdown.baseline - breakdown.velocity_penalty - breakdown.priority_penalty
        + breakdown.resolution_bonus
        + breakdown.tenure_bonus;
    let score = (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0;

    HealthScoreResult {
        customer,
        score,
        band: HealthBand::from_score(score),
        metrics: *metrics,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> CustomerRef {
        CustomerRef {
            id: 1,
            name: "ASML Holding".to_string(),
            subscription_tier: "Enterprise".to_string(),
            mrr: 85_000.0,
        }
    }

    fn metrics() -> TicketMetrics {
        TicketMetrics {
            total_tickets: 12,
            resolved_tickets: 8,
            open_high: 1,
            open_medium: 2,
            open_low: 1,
            tenure_days: 400,
            avg_resolution_days: Some(3.5),
        }
    }

    #[test]
    fn zero_tickets_scores_baseline() {
        for tenure_days in [0, 1, 29, 365, 10_000] {
            let m = TicketMetrics {
                tenure_days,
                ..TicketMetrics::default()
            };
            let result = score(customer(), &m);
            assert!((result.score - 100.0).abs() < f64::EPSILON, "{tenure_days}");
            assert!(result.score.is_finite());
            assert_eq!(result.band, HealthBand::Healthy);
        }
    }

    #[test]
    fn golden_breakdown() {
        let b = breakdown(&metrics());
        // 12 tickets over 400/30 months is 0.9 per month, under the allowance
        assert!((b.ticket_velocity - 0.9).abs() < 1e-9);
        assert!(b.velocity_penalty.abs() < f64::EPSILON);
        assert!((b.priority_penalty - 22.0).abs() < f64::EPSILON);
        assert!((b.resolution_rate - 8.0 / 12.0).abs() < 1e-9);
        assert!((b.tenure_bonus - 1.0).abs() < f64::EPSILON);

        let result = score(customer(), &metrics());
        assert!((result.score - 85.7).abs() < 1e-9);
        assert_eq!(result.band, HealthBand::Healthy);
    }

    #[test]
    fn deterministic() {
        let a = score(customer(), &metrics());
        let b = score(customer(), &metrics());
        assert_eq!(a, b);
    }

    #[test]
    fn high_velocity_is_penalized_and_capped() {
        let burst = TicketMetrics {
            total_tickets: 10,
            resolved_tickets: 10,
            tenure_days: 15,
            ..TicketMetrics::default()
        };
        let b = breakdown(&burst);
        assert!((b.ticket_velocity - 10.0).abs() < f64::EPSILON);
        assert!((b.velocity_penalty - MAX_VELOCITY_PENALTY).abs() < f64::EPSILON);
    }

    #[test]
    fn high_priority_costs_more_than_medium_or_low() {
        let base = TicketMetrics {
            total_tickets: 1,
            tenure_days: 90,
            ..TicketMetrics::default()
        };
        let high = score(customer(), &TicketMetrics { open_high: 1, ..base });
        let medium = score(customer(), &TicketMetrics { open_medium: 1, ..base });
        let low = score(customer(), &TicketMetrics { open_low: 1, ..base });
        assert!(high.score < medium.score);
        assert!(medium.score < low.score);
    }

    #[test]
    fn monotonic_in_open_high_tickets() {
        for total in [0, 5, 40, 500] {
            for tenure_days in [0, 45, 900] {
                let mut previous = f64::INFINITY;
                for open_high in 0..=20 {
                    let m = TicketMetrics {
                        total_tickets: total,
                        resolved_tickets: total / 2,
                        open_high,
                        open_medium: 1,
                        open_low: 3,
                        tenure_days,
                        avg_resolution_days: None,
                    };
                    let s = score(customer(), &m).score;
                    assert!(s <= previous, "total={total} tenure={tenure_days} high={open_high}");
                    previous = s;
                }
            }
        }
    }

    #[test]
    fn always_within_bounds() {
        let samples = [0u64, 1, 2, 7, 30, 365, 1_000, 100_000, u64::MAX / 4];
        for &total in &samples {
            for &resolved in &samples {
                for &open in &samples {
                    for &tenure_days in &samples {
                        let m = TicketMetrics {
                            total_tickets: total,
                            resolved_tickets: resolved,
                            open_high: open,
                            open_medium: open,
                            open_low: open,
                            tenure_days,
                            avg_resolution_days: None,
                        };
                        let s = score(customer(), &m).score;
                        assert!((0.0..=100.0).contains(&s), "{m:?} -> {s}");
                    }
                }
            }
        }
    }

    #[test]
    fn resolution_rate_is_capped_at_one() {
        let m = TicketMetrics {
            total_tickets: 2,
            resolved_tickets: 5,
            ..TicketMetrics::default()
        };
        assert!((resolution_rate(&m) - 1.0).abs() < f64::EPSILON);
    }
}
