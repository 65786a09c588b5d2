use std::fmt;
use std::time::Duration;

use anyhow::Result;
use log::debug;
use serde::Deserialize;
use sha2::{Digest, Sha256};

const PHOTON_ENDPOINT: &str = "https://photon.komoot.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a reverse-geocoding attempt failed. Both kinds trigger the same
/// deterministic fallback; the distinction exists for logging.
#[derive(Debug)]
pub enum GeocodeError {
    Timeout,
    Service(String),
}

impl fmt::Display for GeocodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeError::Timeout => write!(f, "reverse geocoding timed out"),
            GeocodeError::Service(message) => {
                write!(f, "reverse geocoding service error: {}", message)
            }
        }
    }
}

impl std::error::Error for GeocodeError {}

/// A place identity returned by a reverse geocoder.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    /// Full display name, comma separated from most to least specific.
    pub name: String,
    /// First two comma-separated segments of `name`.
    pub short_name: String,
    pub country: Option<String>,
}

/// The narrow capability the pipeline needs from a geocoding service:
/// resolve a coordinate to a place identity, or fail. Swap in a fake for
/// offline or reproducible runs.
pub trait ReverseGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<ResolvedPlace, GeocodeError>;
}

/// Deterministic short label for a coordinate, used when no name can be
/// resolved. Coordinates are fixed to 4 decimal places (~11 m) so the same
/// physical stop hashes identically across runs.
pub fn coordinate_hash(latitude: f64, longitude: f64) -> String {
    let digest = Sha256::digest(format!("{latitude:.4} {longitude:.4}").as_bytes());
    let mut hex = String::with_capacity(6);
    for byte in &digest[..3] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(5);
    hex
}

/// Reverse geocoder backed by the public Photon API.
pub struct PhotonGeocoder {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl PhotonGeocoder {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(PHOTON_ENDPOINT)
    }

    /// Point the client at a different Photon instance.
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl ReverseGeocoder for PhotonGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<ResolvedPlace, GeocodeError> {
        debug!("Reverse geocoding ({:.5}, {:.5})", latitude, longitude);
        let response = self
            .client
            .get(format!("{}/reverse", self.endpoint))
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout
                } else {
                    GeocodeError::Service(e.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(GeocodeError::Service(format!("HTTP {}", response.status())));
        }
        let body: PhotonResponse = response
            .json()
            .map_err(|e| GeocodeError::Service(e.to_string()))?;
        let feature = body
            .features
            .first()
            .ok_or_else(|| GeocodeError::Service("no feature for coordinate".to_string()))?;
        place_from_properties(&feature.properties)
            .ok_or_else(|| GeocodeError::Service("feature has no usable name".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PhotonResponse {
    #[serde(default)]
    features: Vec<PhotonFeature>,
}

#[derive(Debug, Deserialize)]
struct PhotonFeature {
    properties: PhotonProperties,
}

#[derive(Debug, Default, Deserialize)]
struct PhotonProperties {
    name: Option<String>,
    housenumber: Option<String>,
    street: Option<String>,
    district: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

fn place_from_properties(properties: &PhotonProperties) -> Option<ResolvedPlace> {
    let street = match (&properties.housenumber, &properties.street) {
        (Some(number), Some(street)) => Some(format!("{} {}", number, street)),
        (None, Some(street)) => Some(street.clone()),
        _ => None,
    };
    let segments: Vec<&str> = [
        properties.name.as_deref(),
        street.as_deref(),
        properties.district.as_deref(),
        properties.city.as_deref(),
        properties.state.as_deref(),
        properties.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if segments.is_empty() {
        return None;
    }
    let name = segments.join(", ");
    Some(ResolvedPlace {
        short_name: short_name_of(&name),
        name,
        country: properties.country.clone(),
    })
}

/// First two comma-separated segments of a full place name.
fn short_name_of(name: &str) -> String {
    name.split(',')
        .take(2)
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}
