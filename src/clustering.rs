use log::debug;
use ndarray::{Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::{ModelSelection, PipelineConfig};
use crate::smoothing::StationaryCandidate;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Added to covariance diagonals so degenerate clusters (a single fix, or
/// GPS jitter far below a meter of spread) stay invertible.
const COVARIANCE_FLOOR: f64 = 1e-6;

const EM_MAX_ITER: usize = 200;
const EM_TOL: f64 = 1e-6;
const KMEANS_ITER: usize = 10;

/// A 2-D Gaussian mixture fitted with EM, seeded deterministically.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    pub weights: Vec<f64>,
    /// Component means as `[latitude, longitude]`, in degrees.
    pub means: Vec<[f64; 2]>,
    precisions: Vec<[[f64; 2]; 2]>,
    log_dets: Vec<f64>,
    pub n_components: usize,
}

impl GaussianMixture {
    /// Fit `n_components` Gaussians to the rows of `data` (n x 2).
    ///
    /// Initialization is k-means++ seeding plus a short Lloyd refinement,
    /// both driven by `seed`, so repeated fits over the same data are
    /// identical. Requires `data.nrows() >= n_components >= 1`.
    pub fn fit(data: &Array2<f64>, n_components: usize, seed: u64) -> Self {
        let n = data.nrows();
        let k = n_components;
        debug_assert!(k >= 1 && n >= k);
        let mut rng = StdRng::seed_from_u64(seed);
        let means = kmeans(data, k, &mut rng);

        // hard assignment from k-means bootstraps the first M-step
        let mut resp = Array2::zeros((n, k));
        for i in 0..n {
            let j = nearest(&means, [data[[i, 0]], data[[i, 1]]]);
            resp[[i, j]] = 1.0;
        }
        let mut model = GaussianMixture {
            weights: vec![1.0 / k as f64; k],
            means,
            precisions: vec![[[1.0 / COVARIANCE_FLOOR, 0.0], [0.0, 1.0 / COVARIANCE_FLOOR]]; k],
            log_dets: vec![(COVARIANCE_FLOOR * COVARIANCE_FLOOR).ln(); k],
            n_components: k,
        };
        model.m_step(data, &resp);

        let mut previous = f64::NEG_INFINITY;
        for _ in 0..EM_MAX_ITER {
            let (log_likelihood, resp) = model.e_step(data);
            model.m_step(data, &resp);
            let average = log_likelihood / n as f64;
            if (average - previous).abs() < EM_TOL {
                break;
            }
            previous = average;
        }
        model
    }

    /// Most likely component for every row of `data`.
    pub fn predict(&self, data: &Array2<f64>) -> Vec<usize> {
        (0..data.nrows())
            .map(|i| self.posterior_argmax([data[[i, 0]], data[[i, 1]]]))
            .collect()
    }

    /// Total log-likelihood of `data` under the mixture.
    pub fn score(&self, data: &Array2<f64>) -> f64 {
        let per_point: Vec<f64> = (0..data.nrows())
            .into_par_iter()
            .map(|i| self.log_density([data[[i, 0]], data[[i, 1]]]))
            .collect();
        // summed sequentially so the result does not depend on rayon's split
        per_point.iter().sum()
    }

    /// Bayesian Information Criterion over `data`; lower is better.
    pub fn bic(&self, data: &Array2<f64>) -> f64 {
        let n = data.nrows() as f64;
        -2.0 * self.score(data) + self.parameter_count() as f64 * n.ln()
    }

    // means + symmetric covariances + free weights
    fn parameter_count(&self) -> usize {
        let k = self.n_components;
        k * 2 + k * 3 + (k - 1)
    }

    fn component_log_pdf(&self, j: usize, x: [f64; 2]) -> f64 {
        let dx = [x[0] - self.means[j][0], x[1] - self.means[j][1]];
        let p = &self.precisions[j];
        let quad = dx[0] * (p[0][0] * dx[0] + p[0][1] * dx[1])
            + dx[1] * (p[1][0] * dx[0] + p[1][1] * dx[1]);
        -LN_2PI - 0.5 * self.log_dets[j] - 0.5 * quad
    }

    fn log_density(&self, x: [f64; 2]) -> f64 {
        let logp: Vec<f64> = (0..self.n_components)
            .map(|j| self.weights[j].ln() + self.component_log_pdf(j, x))
            .collect();
        log_sum_exp(&logp)
    }

    fn posterior_argmax(&self, x: [f64; 2]) -> usize {
        let mut best = 0;
        let mut best_logp = f64::NEG_INFINITY;
        for j in 0..self.n_components {
            let logp = self.weights[j].ln() + self.component_log_pdf(j, x);
            if logp > best_logp {
                best_logp = logp;
                best = j;
            }
        }
        best
    }

    fn e_step(&self, data: &Array2<f64>) -> (f64, Array2<f64>) {
        let n = data.nrows();
        let k = self.n_components;
        let rows: Vec<(f64, Vec<f64>)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let x = [data[[i, 0]], data[[i, 1]]];
                let mut logp: Vec<f64> = (0..k)
                    .map(|j| self.weights[j].ln() + self.component_log_pdf(j, x))
                    .collect();
                let lse = log_sum_exp(&logp);
                for v in logp.iter_mut() {
                    *v = (*v - lse).exp();
                }
                (lse, logp)
            })
            .collect();

        let mut resp = Array2::zeros((n, k));
        let mut total = 0.0;
        for (i, (lse, r)) in rows.iter().enumerate() {
            total += lse;
            for j in 0..k {
                resp[[i, j]] = r[j];
            }
        }
        (total, resp)
    }

    fn m_step(&mut self, data: &Array2<f64>, resp: &Array2<f64>) {
        let n = data.nrows();
        for j in 0..self.n_components {
            let nk: f64 = resp.column(j).sum();
            if nk < 1e-10 {
                // component lost all its mass; keep its shape, zero its weight
                self.weights[j] = 0.0;
                continue;
            }
            self.weights[j] = nk / n as f64;
            let mut mean = [0.0f64; 2];
            for i in 0..n {
                mean[0] += resp[[i, j]] * data[[i, 0]];
                mean[1] += resp[[i, j]] * data[[i, 1]];
            }
            mean[0] /= nk;
            mean[1] /= nk;
            let mut cov = [[0.0f64; 2]; 2];
            for i in 0..n {
                let r = resp[[i, j]];
                let dx = [data[[i, 0]] - mean[0], data[[i, 1]] - mean[1]];
                cov[0][0] += r * dx[0] * dx[0];
                cov[0][1] += r * dx[0] * dx[1];
                cov[1][1] += r * dx[1] * dx[1];
            }
            cov[0][0] = cov[0][0] / nk + COVARIANCE_FLOOR;
            cov[1][1] = cov[1][1] / nk + COVARIANCE_FLOOR;
            cov[0][1] /= nk;
            cov[1][0] = cov[0][1];
            self.means[j] = mean;
            self.set_covariance(j, cov);
        }
    }

    fn set_covariance(&mut self, j: usize, cov: [[f64; 2]; 2]) {
        let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
        self.precisions[j] = [
            [cov[1][1] / det, -cov[0][1] / det],
            [-cov[1][0] / det, cov[0][0] / det],
        ];
        self.log_dets[j] = det.ln();
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn nearest(means: &[[f64; 2]], x: [f64; 2]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (j, m) in means.iter().enumerate() {
        let d = (x[0] - m[0]).powi(2) + (x[1] - m[1]).powi(2);
        if d < best_d {
            best_d = d;
            best = j;
        }
    }
    best
}

/// k-means++ seeding followed by a short Lloyd refinement.
fn kmeans(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Vec<[f64; 2]> {
    let n = data.nrows();
    let row = |i: usize| [data[[i, 0]], data[[i, 1]]];
    let dist2 =
        |a: [f64; 2], b: [f64; 2]| (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2);

    let mut means = vec![row(rng.random_range(0..n))];
    let mut nearest_d2: Vec<f64> = (0..n).map(|i| dist2(row(i), means[0])).collect();
    while means.len() < k {
        let total: f64 = nearest_d2.iter().sum();
        let next = if total <= 0.0 {
            // all points coincide with a chosen mean
            rng.random_range(0..n)
        } else {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = n - 1;
            for (i, d) in nearest_d2.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        let mean = row(next);
        for i in 0..n {
            nearest_d2[i] = nearest_d2[i].min(dist2(row(i), mean));
        }
        means.push(mean);
    }

    for _ in 0..KMEANS_ITER {
        let mut sums = vec![[0.0f64; 2]; k];
        let mut counts = vec![0usize; k];
        for i in 0..n {
            let x = row(i);
            let j = nearest(&means, x);
            sums[j][0] += x[0];
            sums[j][1] += x[1];
            counts[j] += 1;
        }
        for j in 0..k {
            if counts[j] > 0 {
                means[j] = [sums[j][0] / counts[j] as f64, sums[j][1] / counts[j] as f64];
            }
        }
    }
    means
}

/// Discover candidate stop centroids from the stationary samples.
///
/// Mixtures of growing order are fitted to the candidate coordinates (in
/// degree space, as `[lat, lon]`); the order is selected per
/// [`ModelSelection`]. Components of the winning model are then kept only if
/// the model's BIC restricted to that component's assigned points falls
/// below `stop_fit_threshold`, discarding catch-all clusters too diffuse to
/// be a real stop.
///
/// Returns `(latitude, longitude)` centroids in ascending component order of
/// the winning model; an empty candidate set yields an empty result.
pub fn discover_stops(
    candidates: &[StationaryCandidate],
    config: &PipelineConfig,
) -> Vec<(f64, f64)> {
    if candidates.is_empty() {
        debug!("No stationary candidates, skipping stop discovery");
        return Vec::new();
    }
    let n = candidates.len();
    let data = Array2::from_shape_fn((n, 2), |(i, c)| {
        if c == 0 {
            candidates[i].position.y()
        } else {
            candidates[i].position.x()
        }
    });

    let mut selected: Option<GaussianMixture> = None;
    let mut best_bic = f64::INFINITY;
    for k in 1..=config.max_stop_components {
        if k > n {
            break;
        }
        let model = GaussianMixture::fit(&data, k, config.cluster_seed);
        let bic = model.bic(&data);
        debug!("Fitting {} components gives BIC {:.2}", k, bic);
        match config.model_selection {
            ModelSelection::FirstBicIncrease => {
                if bic >= best_bic {
                    break;
                }
                best_bic = bic;
                selected = Some(model);
            }
            ModelSelection::GlobalBestBic => {
                if bic < best_bic {
                    best_bic = bic;
                    selected = Some(model);
                }
            }
        }
    }
    let Some(model) = selected else {
        return Vec::new();
    };

    let labels = model.predict(&data);
    let mut stops = Vec::new();
    for j in 0..model.n_components {
        let members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, l)| *l == j)
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            debug!("Component {} attracted no points, dropping", j);
            continue;
        }
        let subset = data.select(Axis(0), &members);
        let fitness = model.bic(&subset);
        debug!(
            "Component {} has restricted BIC {:.2} over {} points",
            j,
            fitness,
            members.len()
        );
        if fitness < config.stop_fit_threshold {
            stops.push((model.means[j][0], model.means[j][1]));
        }
    }
    debug!("Kept {} of {} components as stops", stops.len(), model.n_components);
    stops
}
