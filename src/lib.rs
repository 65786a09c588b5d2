//! Turns a raw, timestamped movement trace into a semantic summary: the
//! stops where the subject dwelled and the trips travelled between them.
//!
//! The pipeline runs five stages over one trace:
//!
//! 1. [`smoothing::smooth`] — time-weighted moving average over the raw fixes.
//! 2. [`smoothing::stationary_candidates`] — keep smoothed samples whose
//!    displacement over a short lag stays under a threshold.
//! 3. [`clustering::discover_stops`] — fit Gaussian mixtures of increasing
//!    order to the stationary samples, pick the order by BIC, and keep the
//!    components tight enough to be real stops.
//! 4. [`resolver::StopResolver`] — give every candidate centroid an identity:
//!    a predefined stop, a reverse-geocoded place name, or a deterministic
//!    coordinate hash.
//! 5. [`segmenter::segment`] — label the raw trace against the resolved
//!    stops and extract trips and per-stop dwell times.
//!
//! [`pipeline::Pipeline`] wires the stages together. Parsing trace files,
//! rendering maps and CLI wiring are left to callers.

pub mod clustering;
pub mod config;
pub mod geocode;
pub mod pipeline;
pub mod resolver;
pub mod segmenter;
pub mod smoothing;
pub mod trace;

pub use config::{ModelSelection, PipelineConfig};
pub use geocode::{GeocodeError, PhotonGeocoder, ResolvedPlace, ReverseGeocoder};
pub use pipeline::{Pipeline, TraceSummary};
pub use resolver::{Stop, StopResolver};
pub use segmenter::{DwellTimes, Trip};
pub use trace::TrajectoryPoint;
