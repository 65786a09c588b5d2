use chrono::{DateTime, TimeDelta};
use tripline::{
    GeocodeError, Pipeline, PipelineConfig, ResolvedPlace, ReverseGeocoder, Stop, TrajectoryPoint,
};

const STEP_SECONDS: i64 = 10;

const A: (f64, f64) = (52.5000, 13.4000);
const B: (f64, f64) = (52.5200, 13.4000);
const C: (f64, f64) = (52.5200, 13.4300);

struct TraceBuilder {
    points: Vec<TrajectoryPoint>,
    t: i64,
}

impl TraceBuilder {
    fn new() -> Self {
        Self {
            points: Vec::new(),
            t: 0,
        }
    }

    fn fix(&mut self, latitude: f64, longitude: f64) {
        self.points.push(TrajectoryPoint {
            timestamp: DateTime::from_timestamp(self.t, 0).unwrap(),
            latitude,
            longitude,
        });
        self.t += STEP_SECONDS;
    }

    /// Sit at a location for `seconds`, with deterministic sub-5 m scatter.
    fn dwell(&mut self, at: (f64, f64), seconds: i64) {
        for i in 0..seconds / STEP_SECONDS {
            let a = i as f64 * 2.399963;
            self.fix(at.0 + a.sin() * 3e-5, at.1 + a.cos() * 3e-5);
        }
    }

    /// Move from one location to another at constant speed over `seconds`.
    fn travel(&mut self, from: (f64, f64), to: (f64, f64), seconds: i64) {
        let steps = seconds / STEP_SECONDS;
        for i in 0..steps {
            let f = i as f64 / steps as f64;
            self.fix(from.0 + f * (to.0 - from.0), from.1 + f * (to.1 - from.1));
        }
    }
}

/// The canonical scenario: dwell 10 min at A, travel 30 min to B, dwell
/// 10 min, travel 30 min to C, dwell 10 min.
fn three_stop_trace() -> Vec<TrajectoryPoint> {
    let mut builder = TraceBuilder::new();
    builder.dwell(A, 600);
    builder.travel(A, B, 1800);
    builder.dwell(B, 600);
    builder.travel(B, C, 1800);
    builder.dwell(C, 600);
    builder.points
}

fn stop_index_near(stops: &[Stop], at: (f64, f64)) -> usize {
    stops
        .iter()
        .position(|s| s.distance_to(at.0, at.1) < 90.0)
        .unwrap_or_else(|| panic!("no stop near ({}, {}): {stops:?}", at.0, at.1))
}

struct UnreachableGeocoder;

impl ReverseGeocoder for UnreachableGeocoder {
    fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<ResolvedPlace, GeocodeError> {
        Err(GeocodeError::Timeout)
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn three_stops_and_two_trips_are_recovered() {
    init_logging();
    let trace = three_stop_trace();
    let summary = Pipeline::new(PipelineConfig::default()).run(&trace).unwrap();

    assert_eq!(summary.stops.len(), 3);
    assert_eq!(summary.trips.len(), 2);

    let a = stop_index_near(&summary.stops, A);
    let b = stop_index_near(&summary.stops, B);
    let c = stop_index_near(&summary.stops, C);

    assert_eq!((summary.trips[0].from_stop, summary.trips[0].to_stop), (a, b));
    assert_eq!((summary.trips[1].from_stop, summary.trips[1].to_stop), (b, c));
    for trip in &summary.trips {
        let minutes = trip.duration.num_minutes();
        assert!((25..=31).contains(&minutes), "trip duration {} min", minutes);
    }
    // temporally ordered and non-overlapping
    assert!(summary.trips[0].end <= summary.trips[1].start);

    for index in [a, b, c] {
        assert!(summary.time_at_stops[&index] > TimeDelta::minutes(5));
    }
}

#[test]
fn trip_endpoints_always_reference_existing_stops() {
    init_logging();
    let trace = three_stop_trace();
    let summary = Pipeline::new(PipelineConfig::default()).run(&trace).unwrap();
    for trip in &summary.trips {
        assert!(trip.from_stop < summary.stops.len());
        assert!(trip.to_stop < summary.stops.len());
    }
    for index in summary.time_at_stops.keys() {
        assert!(*index < summary.stops.len());
    }
}

#[test]
fn offline_runs_are_idempotent() {
    init_logging();
    let trace = three_stop_trace();
    let pipeline = Pipeline::new(PipelineConfig::default());
    let first = pipeline.run(&trace).unwrap();
    let second = pipeline.run(&trace).unwrap();
    assert_eq!(first.stops, second.stops);
    assert_eq!(first.trips, second.trips);
    assert_eq!(first.time_at_stops, second.time_at_stops);
}

#[test]
fn failing_geocoder_falls_back_to_deterministic_hashes() {
    init_logging();
    let trace = three_stop_trace();
    let geocoder = UnreachableGeocoder;
    let pipeline = Pipeline::new(PipelineConfig::default()).with_geocoder(&geocoder);
    let first = pipeline.run(&trace).unwrap();
    let second = pipeline.run(&trace).unwrap();

    for stop in &first.stops {
        assert!(stop.name.is_none());
        assert_eq!(stop.short_name.len(), 5, "hash identity: {:?}", stop);
    }
    assert_eq!(first.stops, second.stops);
}

#[test]
fn predefined_stop_identity_is_reused_verbatim() {
    init_logging();
    let home = Stop {
        name: Some("Home".to_string()),
        short_name: "Home".to_string(),
        emoji_name: Some("house".to_string()),
        country: Some("Germany".to_string()),
        latitude: A.0,
        longitude: A.1,
    };
    let predefined = vec![home.clone()];
    let trace = three_stop_trace();
    let summary = Pipeline::new(PipelineConfig::default())
        .with_predefined_stops(&predefined)
        .run(&trace)
        .unwrap();

    assert!(summary.stops.contains(&home));
    // the other two are hash fallbacks
    assert_eq!(summary.stops.iter().filter(|s| s.name.is_none()).count(), 2);
}

#[test]
fn a_trace_that_never_dwells_yields_an_empty_summary() {
    init_logging();
    let mut builder = TraceBuilder::new();
    builder.travel(A, C, 3600);
    let summary = Pipeline::new(PipelineConfig::default())
        .run(&builder.points)
        .unwrap();
    assert!(summary.stops.is_empty());
    assert!(summary.trips.is_empty());
    assert!(summary.time_at_stops.is_empty());
}

#[test]
fn malformed_traces_are_rejected() {
    init_logging();
    assert!(Pipeline::new(PipelineConfig::default()).run(&[]).is_err());

    let backwards = vec![
        TrajectoryPoint {
            timestamp: DateTime::from_timestamp(100, 0).unwrap(),
            latitude: A.0,
            longitude: A.1,
        },
        TrajectoryPoint {
            timestamp: DateTime::from_timestamp(50, 0).unwrap(),
            latitude: A.0,
            longitude: A.1,
        },
    ];
    assert!(Pipeline::new(PipelineConfig::default()).run(&backwards).is_err());
}
