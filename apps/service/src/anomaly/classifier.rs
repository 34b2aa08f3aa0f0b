use super::types::{AnomalyVerdict, BaselineSnapshot, Classification, MetricKind, Thresholds};
use crate::baseline::{BaselineKey, BaselineRecord};

/// Classify `observed` against `baseline`, which must not yet include it
pub fn classify(
    key: &BaselineKey,
    observed: f64,
    baseline: &BaselineRecord,
    kind: MetricKind,
    thresholds: &Thresholds,
) -> AnomalyVerdict {
    let snapshot = BaselineSnapshot::from(baseline);
    let factor = (snapshot.mean > 0.0).then(|| observed / snapshot.mean);
    let z = (snapshot.std > 0.0).then(|| (observed - snapshot.mean) / snapshot.std);
    let warmed_up = snapshot.n >= thresholds.min_samples;

    let classification = match kind {
        MetricKind::Magnitude => {
            // A flat baseline has no z signal; the factor test alone decides
            let spike = factor.is_some_and(|f| f >= thresholds.factor)
                && z.is_none_or(|z| z >= thresholds.sigma);
            if warmed_up && spike { Classification::RttAnomaly } else { Classification::Normal }
        }
        MetricKind::Loss => {
            if warmed_up
                && snapshot.mean <= thresholds.loss_baseline_max
                && observed >= thresholds.loss_absolute
            {
                Classification::LossAnomaly
            } else if observed > 0.0 {
                Classification::LossDetected
            } else {
                Classification::Normal
            }
        }
    };

    AnomalyVerdict {
        key: key.clone(),
        observed,
        baseline: snapshot,
        classification,
        factor,
        z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkhost::CheckMode;

    fn key(metric: &str) -> BaselineKey {
        BaselineKey::new(CheckMode::Ping, "example.com", "Netherlands, Amsterdam", metric)
    }

    /// Record with the given count, mean and population std
    fn baseline(n: u64, mean: f64, std: f64) -> BaselineRecord {
        BaselineRecord::new(n, mean, std * std * n as f64)
    }

    fn magnitude(observed: f64, record: &BaselineRecord) -> AnomalyVerdict {
        classify(&key("rtt_avg"), observed, record, MetricKind::Magnitude, &Thresholds::default())
    }

    fn loss(observed: f64, record: &BaselineRecord) -> AnomalyVerdict {
        classify(&key("loss"), observed, record, MetricKind::Loss, &Thresholds::default())
    }

    #[test]
    fn rtt_spike_is_anomaly() {
        let verdict = magnitude(0.450, &baseline(20, 0.120, 0.020));

        assert_eq!(verdict.classification, Classification::RttAnomaly);
        assert!((verdict.factor.unwrap() - 3.75).abs() < 1e-9);
        assert!((verdict.z.unwrap() - 16.5).abs() < 1e-6);
        assert_eq!(verdict.baseline.n, 20);
    }

    #[test]
    fn cold_start_is_normal() {
        let verdict = magnitude(0.450, &baseline(19, 0.120, 0.020));
        assert_eq!(verdict.classification, Classification::Normal);
    }

    #[test]
    fn factor_without_sigma_is_normal() {
        // Doubled, but the baseline is noisy enough that it is within 3 sigma
        let verdict = magnitude(0.240, &baseline(50, 0.120, 0.050));
        assert!(verdict.factor.unwrap() >= 2.0);
        assert!(verdict.z.unwrap() < 3.0);
        assert_eq!(verdict.classification, Classification::Normal);
    }

    #[test]
    fn sigma_without_factor_is_normal() {
        let verdict = magnitude(0.150, &baseline(50, 0.120, 0.005));
        assert!(verdict.z.unwrap() >= 3.0);
        assert_eq!(verdict.classification, Classification::Normal);
    }

    #[test]
    fn flat_baseline_uses_factor_alone() {
        let verdict = magnitude(0.240, &baseline(30, 0.120, 0.0));
        assert_eq!(verdict.z, None);
        assert_eq!(verdict.classification, Classification::RttAnomaly);

        let verdict = magnitude(0.200, &baseline(30, 0.120, 0.0));
        assert_eq!(verdict.classification, Classification::Normal);
    }

    #[test]
    fn zero_mean_disables_magnitude_check() {
        let verdict = magnitude(5.0, &baseline(30, 0.0, 0.0));
        assert_eq!(verdict.factor, None);
        assert_eq!(verdict.classification, Classification::Normal);
    }

    #[test]
    fn loss_boundaries() {
        let record = baseline(20, 0.03, 0.01);

        assert_eq!(loss(0.10, &record).classification, Classification::LossAnomaly);
        assert_eq!(loss(0.07, &record).classification, Classification::LossDetected);
        assert_eq!(loss(0.0, &record).classification, Classification::Normal);
    }

    #[test]
    fn lossy_baseline_only_detects() {
        let record = baseline(20, 0.20, 0.05);
        assert_eq!(loss(0.60, &record).classification, Classification::LossDetected);
    }

    #[test]
    fn loss_during_cold_start_is_only_detected() {
        let record = baseline(3, 0.0, 0.0);
        assert_eq!(loss(1.0, &record).classification, Classification::LossDetected);
        assert_eq!(loss(0.0, &record).classification, Classification::Normal);
    }

    #[test]
    fn classify_is_pure() {
        let record = baseline(25, 0.120, 0.020);
        let first = magnitude(0.450, &record);
        let second = magnitude(0.450, &record);
        assert_eq!(first, second);
        assert_eq!(record, baseline(25, 0.120, 0.020));
    }
}
