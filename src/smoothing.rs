use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};
use log::debug;

use crate::trace::TrajectoryPoint;

/// A trajectory sample after moving-average smoothing.
///
/// `position` is `None` where the averaging window reaches past the start of
/// the trace; downstream stages skip undefined samples.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedPoint {
    pub timestamp: DateTime<Utc>,
    pub position: Option<Point<f64>>,
}

/// A smoothed sample judged likely non-moving, carrying its displacement
/// from the lagged reference sample.
#[derive(Debug, Clone, Copy)]
pub struct StationaryCandidate {
    pub timestamp: DateTime<Utc>,
    pub position: Point<f64>,
    pub displacement: f64,
}

/// Time-weighted moving average of the trace over `[t - window, t]`, one
/// output sample per input sample.
///
/// Latitude and longitude are integrated as piecewise-linear signals over
/// the window, so irregular sampling intervals are weighted by the time they
/// cover rather than by sample count.
pub fn smooth(points: &[TrajectoryPoint], window_seconds: f64) -> Vec<SmoothedPoint> {
    if window_seconds <= 0.0 {
        return points
            .iter()
            .map(|p| SmoothedPoint {
                timestamp: p.timestamp,
                position: Some(p.point()),
            })
            .collect();
    }
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let times: Vec<f64> = points
        .iter()
        .map(|p| (p.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0)
        .collect();

    let mut smoothed = Vec::with_capacity(points.len());
    let mut left = 0usize;
    for i in 0..points.len() {
        let window_start = times[i] - window_seconds;
        if window_start < times[0] {
            // not enough history yet for a full window
            smoothed.push(SmoothedPoint {
                timestamp: points[i].timestamp,
                position: None,
            });
            continue;
        }
        while times[left + 1] <= window_start {
            left += 1;
        }
        let mut lat_integral = 0.0;
        let mut lon_integral = 0.0;
        for k in left..i {
            let (seg_start, seg_end) = (times[k], times[k + 1]);
            let span = seg_end - seg_start;
            if span <= 0.0 {
                continue;
            }
            let clip_start = seg_start.max(window_start);
            let f = (clip_start - seg_start) / span;
            let lat0 = points[k].latitude + f * (points[k + 1].latitude - points[k].latitude);
            let lon0 = points[k].longitude + f * (points[k + 1].longitude - points[k].longitude);
            let dt = seg_end - clip_start;
            lat_integral += 0.5 * (lat0 + points[k + 1].latitude) * dt;
            lon_integral += 0.5 * (lon0 + points[k + 1].longitude) * dt;
        }
        smoothed.push(SmoothedPoint {
            timestamp: points[i].timestamp,
            position: Some(Point::new(
                lon_integral / window_seconds,
                lat_integral / window_seconds,
            )),
        });
    }
    smoothed
}

/// Keep smoothed samples whose displacement from the sample `lag` steps
/// earlier is defined and below `threshold_meters`.
///
/// An undefined side propagates as "not stationary". Genuine dwelling shows
/// near-zero smoothed displacement over the lag, while sustained movement
/// shifts the average well past the threshold.
pub fn stationary_candidates(
    smoothed: &[SmoothedPoint],
    lag: usize,
    threshold_meters: f64,
) -> Vec<StationaryCandidate> {
    let mut candidates = Vec::new();
    if lag == 0 || smoothed.len() <= lag {
        return candidates;
    }
    for i in lag..smoothed.len() {
        let (Some(position), Some(reference)) = (smoothed[i].position, smoothed[i - lag].position)
        else {
            continue;
        };
        let displacement = Haversine.distance(reference, position);
        if displacement < threshold_meters {
            candidates.push(StationaryCandidate {
                timestamp: smoothed[i].timestamp,
                position,
                displacement,
            });
        }
    }
    debug!(
        "Filtered {} smoothed samples to {} stationary candidates",
        smoothed.len(),
        candidates.len()
    );
    candidates
}
