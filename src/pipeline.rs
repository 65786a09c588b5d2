use anyhow::Result;
use log::{debug, info};

use crate::clustering;
use crate::config::PipelineConfig;
use crate::geocode::ReverseGeocoder;
use crate::resolver::{Stop, StopResolver};
use crate::segmenter::{self, DwellTimes, Trip};
use crate::smoothing;
use crate::trace::{self, TrajectoryPoint};

/// Everything the pipeline derives from one trace. Trip and dwell-time stop
/// indices refer to `stops`.
#[derive(Debug, Clone)]
pub struct TraceSummary {
    pub stops: Vec<Stop>,
    pub trips: Vec<Trip>,
    pub time_at_stops: DwellTimes,
}

/// The full stop detection and trip segmentation pipeline over one trace.
///
/// A pipeline holds no per-run state; running it twice over the same trace
/// with the same configuration (and without network resolution) yields
/// identical output.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    predefined_stops: &'a [Stop],
    geocoder: Option<&'a dyn ReverseGeocoder>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            predefined_stops: &[],
            geocoder: None,
        }
    }

    /// Known stops consulted before clustering-based resolution.
    pub fn with_predefined_stops(mut self, stops: &'a [Stop]) -> Self {
        self.predefined_stops = stops;
        self
    }

    /// Enable network resolution of discovered stops. Without a geocoder
    /// every unknown stop gets a deterministic hash identity.
    pub fn with_geocoder(mut self, geocoder: &'a dyn ReverseGeocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Run the pipeline.
    ///
    /// Fails only on a malformed trace (empty, or timestamps going
    /// backwards). Every other degenerate input, including a trace that
    /// never dwells, degrades to an empty summary.
    pub fn run(&self, points: &[TrajectoryPoint]) -> Result<TraceSummary> {
        trace::validate(points)?;
        info!("Segmenting trace with {} points", points.len());

        let smoothed = smoothing::smooth(points, self.config.smoothing_window);
        let candidates = smoothing::stationary_candidates(
            &smoothed,
            self.config.stationary_lag,
            self.config.stationary_distance_threshold,
        );

        let centroids = clustering::discover_stops(&candidates, &self.config);
        debug!("Discovered {} candidate stop centroids", centroids.len());

        let resolver = StopResolver {
            predefined: self.predefined_stops,
            geocoder: self.geocoder,
            match_radius: self.config.stop_match_radius,
        };
        let stops = resolver.resolve_all(&centroids);

        let (trips, time_at_stops) =
            segmenter::segment(points, &stops, self.config.label_match_radius);
        info!("Extracted {} trips over {} stops", trips.len(), stops.len());

        Ok(TraceSummary {
            stops,
            trips,
            time_at_stops,
        })
    }
}
