use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

/// A single timestamped fix from a movement trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

impl TrajectoryPoint {
    pub(crate) fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Reject traces the pipeline cannot run on: empty traces and timestamps
/// going backwards. These are the only caller-visible failures.
pub fn validate(points: &[TrajectoryPoint]) -> Result<()> {
    if points.is_empty() {
        bail!("trace contains no points");
    }
    for (i, pair) in points.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            bail!(
                "trace timestamps are not monotonic: sample {} at {} precedes sample {} at {}",
                i + 1,
                pair[1].timestamp,
                i,
                pair[0].timestamp
            );
        }
    }
    Ok(())
}

/// Geographic extent of a trace as `(min_lon, min_lat, max_lon, max_lat)`,
/// for consumers that want to size a map around it.
pub fn extent(points: &[TrajectoryPoint]) -> Option<(f64, f64, f64, f64)> {
    let first = points.first()?;
    let mut bounds = (
        first.longitude,
        first.latitude,
        first.longitude,
        first.latitude,
    );
    for p in points {
        bounds.0 = bounds.0.min(p.longitude);
        bounds.1 = bounds.1.min(p.latitude);
        bounds.2 = bounds.2.max(p.longitude);
        bounds.3 = bounds.3.max(p.latitude);
    }
    Some(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(seconds: i64, latitude: f64, longitude: f64) -> TrajectoryPoint {
        TrajectoryPoint {
            timestamp: DateTime::from_timestamp(seconds, 0).unwrap(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn empty_trace_is_rejected() {
        assert!(validate(&[]).is_err());
    }

    #[test]
    fn backwards_timestamps_are_rejected() {
        let points = vec![fix(100, 52.5, 13.4), fix(90, 52.5, 13.4)];
        assert!(validate(&points).is_err());
    }

    #[test]
    fn repeated_timestamps_are_accepted() {
        let points = vec![fix(100, 52.5, 13.4), fix(100, 52.5, 13.4)];
        assert!(validate(&points).is_ok());
    }

    #[test]
    fn extent_covers_all_points() {
        let points = vec![
            fix(0, 52.50, 13.40),
            fix(10, 52.52, 13.38),
            fix(20, 52.48, 13.44),
        ];
        assert_eq!(extent(&points), Some((13.38, 52.48, 13.44, 52.52)));
        assert_eq!(extent(&[]), None);
    }
}
