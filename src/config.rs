/// How the number of mixture components is chosen during stop discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelSelection {
    /// Grow the component count and stop at the first fit whose BIC does not
    /// improve on the best so far. This can settle on a local optimum; it is
    /// the historical behavior downstream results were tuned against.
    #[default]
    FirstBicIncrease,
    /// Fit every component count up to the maximum and keep the global BIC
    /// minimum.
    GlobalBestBic,
}

/// Tuning parameters for the whole pipeline.
///
/// The defaults reproduce the most refined historical behavior; every
/// threshold that used to be a scattered literal is a named field here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Length of the moving-average window used for position smoothing, in
    /// seconds.
    pub smoothing_window: f64,
    /// How many sample steps back the stationary filter looks when measuring
    /// displacement.
    pub stationary_lag: usize,
    /// Maximum smoothed displacement over the lag for a sample to count as
    /// stationary (meters).
    pub stationary_distance_threshold: f64,
    /// Upper bound on the number of mixture components tried during stop
    /// discovery.
    pub max_stop_components: usize,
    /// A component is kept as a stop only if its restricted BIC stays below
    /// this value (more negative means a tighter cluster).
    pub stop_fit_threshold: f64,
    /// Radius for matching a discovered centroid against a predefined stop
    /// (meters).
    pub stop_match_radius: f64,
    /// Radius for labeling raw trajectory points with a stop (meters).
    /// Tighter than `stop_match_radius` so passing near a stop does not
    /// break a trip in two.
    pub label_match_radius: f64,
    /// Seed for the mixture initialization; fixed so repeated runs over the
    /// same trace are deterministic.
    pub cluster_seed: u64,
    /// How the clustering model order is selected.
    pub model_selection: ModelSelection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 300.0,
            stationary_lag: 2,
            stationary_distance_threshold: 10.0,
            max_stop_components: 20,
            stop_fit_threshold: -30.0,
            stop_match_radius: 90.0,
            label_match_radius: 40.0,
            cluster_seed: 0,
            model_selection: ModelSelection::FirstBicIncrease,
        }
    }
}
