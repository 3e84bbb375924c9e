use std::time::Duration;

use surge_core::prelude::PhaseSpec;

/// When each virtual user of a phase starts, relative to the start of the phase.
///
/// - `arrivalCount` users are spread evenly over the phase.
/// - `arrivalRate` users arrive at a constant rate, or at a rate that changes linearly to `rampTo`
///   over the phase. The k-th user arrives at the point where the expected number of arrivals so far
///   reaches k, so the first one arrives immediately.
/// - A pause has no arrivals.
///
/// Offsets are sorted and strictly less than the phase duration.
pub fn arrival_offsets(phase: &PhaseSpec) -> Vec<Duration> {
    if phase.pause.is_some() || phase.duration == 0 {
        return Vec::new();
    }
    let duration = phase.duration as f64;

    if let Some(count) = phase.arrival_count {
        return (0..count)
            .map(|k| Duration::from_secs_f64(k as f64 * duration / count as f64))
            .collect();
    }

    let Some(start_rate) = phase.arrival_rate else {
        return Vec::new();
    };
    let end_rate = phase.ramp_to.unwrap_or(start_rate);
    if start_rate <= 0.0 && end_rate <= 0.0 {
        return Vec::new();
    }

    // Expected arrivals by time t: start_rate * t + slope * t^2
    let slope = (end_rate - start_rate) / (2.0 * duration);
    let total = ((start_rate + end_rate) / 2.0 * duration + 1e-9).floor() as u64;

    (0..total)
        .map_while(|k| {
            let k = k as f64;
            let discriminant = start_rate * start_rate + 4.0 * slope * k;
            if discriminant < 0.0 {
                return None;
            }

            let denominator = start_rate + discriminant.sqrt();
            let t = if k == 0.0 { 0.0 } else { 2.0 * k / denominator };
            (t.is_finite() && t < duration).then(|| Duration::from_secs_f64(t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn millis(offsets: &[Duration]) -> Vec<u128> {
        offsets.iter().map(Duration::as_millis).collect()
    }

    fn rate(duration: u64, arrival_rate: f64, ramp_to: Option<f64>) -> PhaseSpec {
        PhaseSpec {
            duration,
            arrival_rate: Some(arrival_rate),
            ramp_to,
            ..Default::default()
        }
    }

    #[test]
    fn constant_rate() {
        let offsets = arrival_offsets(&rate(1, 4.0, None));
        assert_eq!(vec![0, 250, 500, 750], millis(&offsets));
    }

    #[test]
    fn fractional_rate() {
        let offsets = arrival_offsets(&rate(10, 0.5, None));
        assert_eq!(vec![0, 2_000, 4_000, 6_000, 8_000], millis(&offsets));
    }

    #[test]
    fn arrival_count_is_spread_over_the_phase() {
        let phase = PhaseSpec {
            duration: 2,
            arrival_count: Some(4),
            ..Default::default()
        };

        assert_eq!(vec![0, 500, 1_000, 1_500], millis(&arrival_offsets(&phase)));
    }

    #[test]
    fn ramp_up() {
        let offsets = arrival_offsets(&rate(10, 0.0, Some(10.0)));

        // Average rate of 5 over 10 seconds.
        assert_eq!(50, offsets.len());
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert!(offsets.iter().all(|t| *t < Duration::from_secs(10)));

        // The rate increases, so later gaps are shorter.
        let first_gap = offsets[2] - offsets[1];
        let last_gap = offsets[49] - offsets[48];
        assert!(last_gap < first_gap);
    }

    #[test]
    fn ramp_down() {
        let offsets = arrival_offsets(&rate(4, 4.0, Some(0.0)));

        assert_eq!(8, offsets.len());
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert!(offsets.iter().all(|t| *t < Duration::from_secs(4)));

        let first_gap = offsets[1] - offsets[0];
        let last_gap = offsets[7] - offsets[6];
        assert!(last_gap > first_gap);
    }

    #[test]
    fn no_arrivals() {
        let pause = PhaseSpec {
            pause: Some(5),
            ..Default::default()
        };
        assert!(arrival_offsets(&pause).is_empty());
        assert!(arrival_offsets(&rate(5, 0.0, None)).is_empty());
        assert!(arrival_offsets(&rate(0, 5.0, None)).is_empty());
    }
}
