use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use geo::{Distance, Haversine};
use log::debug;

use crate::resolver::Stop;
use crate::trace::TrajectoryPoint;

/// A contiguous interval of movement between two stops. Stop indices refer
/// to the stop list the trace was segmented against.
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: TimeDelta,
    pub from_stop: usize,
    pub to_stop: usize,
}

/// Accumulated dwell duration per stop index. Every stop has an entry, zero
/// if the trace never dwelled there.
pub type DwellTimes = HashMap<usize, TimeDelta>;

/// Label every raw trajectory point with the first stop within
/// `radius_meters`, or `None` for "in motion".
pub fn label_points(
    points: &[TrajectoryPoint],
    stops: &[Stop],
    radius_meters: f64,
) -> Vec<Option<usize>> {
    points
        .iter()
        .map(|p| {
            stops.iter().position(|stop| {
                Haversine.distance(
                    geo::Point::new(stop.longitude, stop.latitude),
                    p.point(),
                ) < radius_meters
            })
        })
        .collect()
}

/// Correct isolated mislabels in place: whenever the label two positions
/// back matches the label one position ahead, the two samples in between are
/// overwritten with it. This fixes spurious excursions of length <= 2 caused
/// by single noisy fixes crossing a stop boundary; it is not a general
/// denoiser.
pub fn smooth_labels(labels: &mut [Option<usize>]) {
    if labels.len() < 4 {
        return;
    }
    for i in 2..labels.len() - 1 {
        if labels[i - 2] == labels[i + 1] {
            labels[i - 1] = labels[i - 2];
            labels[i] = labels[i - 2];
        }
    }
}

/// Scan the labeled sequence for maximal "in motion" runs bracketed by stop
/// labels on both sides and emit one trip per run. Runs touching the start
/// or end of the trace have an undefined endpoint and are skipped.
pub fn extract_trips(points: &[TrajectoryPoint], labels: &[Option<usize>]) -> Vec<Trip> {
    let mut trips = Vec::new();
    if points.len() < 2 {
        return trips;
    }
    let mut i = 0;
    while i < labels.len() {
        if labels[i].is_some() {
            i += 1;
            continue;
        }
        let mut j = i;
        while j + 1 < labels.len() && labels[j + 1].is_none() {
            j += 1;
        }
        if i > 0 && j + 1 < labels.len() {
            // the run is maximal, so both brackets are stop labels
            let (Some(from_stop), Some(to_stop)) = (labels[i - 1], labels[j + 1]) else {
                i = j + 1;
                continue;
            };
            let start = points[i].timestamp;
            let end = points[j].timestamp;
            trips.push(Trip {
                start,
                end,
                duration: end - start,
                from_stop,
                to_stop,
            });
        }
        i = j + 1;
    }
    debug!("Extracted {} trips", trips.len());
    trips
}

/// Sum the timestamp deltas between consecutive points sharing a stop label.
/// The final point of a dwelling run contributes no extra delta.
pub fn dwell_times(
    points: &[TrajectoryPoint],
    labels: &[Option<usize>],
    stop_count: usize,
) -> DwellTimes {
    let mut dwell: DwellTimes = (0..stop_count).map(|i| (i, TimeDelta::zero())).collect();
    for i in 1..points.len() {
        let Some(stop) = labels[i] else { continue };
        if labels[i - 1] == Some(stop) {
            let delta = points[i].timestamp - points[i - 1].timestamp;
            if let Some(total) = dwell.get_mut(&stop) {
                *total = *total + delta;
            }
        }
    }
    dwell
}

/// Label the raw trace against the resolved stops, smooth out isolated
/// mislabels, and derive trips and per-stop dwell times.
///
/// Never fails: traces with fewer than 2 points or without any stop segment
/// produce an empty trip list and all-zero dwell times.
pub fn segment(
    points: &[TrajectoryPoint],
    stops: &[Stop],
    radius_meters: f64,
) -> (Vec<Trip>, DwellTimes) {
    if points.len() < 2 {
        return (Vec::new(), dwell_times(points, &[], stops.len()));
    }
    let mut labels = label_points(points, stops, radius_meters);
    smooth_labels(&mut labels);
    let trips = extract_trips(points, &labels);
    let dwell = dwell_times(points, &labels, stops.len());
    (trips, dwell)
}
