//! Alert evaluation.

use metrics::counter;
use vcount_models::{Alert, Interval};

/// Flag `interval` and build its alert when the count exceeds `alert_limit`.
///
/// The comparison is strict: a count equal to the limit does not alert.
pub fn evaluate(interval: &mut Interval, alert_limit: u32) -> Option<Alert> {
    interval.alert = interval.total_count > f64::from(alert_limit);
    interval
        .alert
        .then(|| Alert::for_interval(interval, alert_limit))
}

/// Evaluate every interval in order and collect the alerts raised.
pub fn evaluate_all(intervals: &mut [Interval], alert_limit: u32) -> Vec<Alert> {
    let alerts: Vec<Alert> = intervals
        .iter_mut()
        .filter_map(|interval| evaluate(interval, alert_limit))
        .collect();
    counter!("vcount_alerts_raised_total").increment(alerts.len() as u64);
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(index: u32, total: f64) -> Interval {
        let mut interval = Interval::empty(index, f64::from(index) * 60.0, 60.0);
        interval.total_count = total;
        interval
    }

    #[test]
    fn test_strictly_greater_alerts() {
        let mut at_limit = interval(0, 5.0);
        assert!(evaluate(&mut at_limit, 5).is_none());
        assert!(!at_limit.alert);

        let mut above = interval(0, 5.01);
        let alert = evaluate(&mut above, 5).unwrap();
        assert!(above.alert);
        assert_eq!(alert.limit, 5);
    }

    #[test]
    fn test_alerts_follow_interval_order() {
        let mut intervals = vec![interval(0, 12.0), interval(1, 3.0), interval(2, 10.5)];
        let alerts = evaluate_all(&mut intervals, 10);

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].timestamp, 0.0);
        assert_eq!(alerts[1].timestamp, 120.0);
        assert_eq!(
            alerts[1].message,
            "Object count 10.5 exceeds threshold 10 at interval 2"
        );
        assert_eq!(
            intervals.iter().map(|i| i.alert).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }
}
