use geo::{Distance, Haversine, Point};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::geocode::{ResolvedPlace, ReverseGeocoder, coordinate_hash};

/// A place the subject dwelled at, predefined by the caller or discovered
/// from the trace. Stops are referenced by their index in the resolved stop
/// list for the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Full place name, when one could be resolved.
    #[serde(default)]
    pub name: Option<String>,
    /// Always present: a resolved short form, a predefined name, or a
    /// deterministic coordinate hash.
    pub short_name: String,
    #[serde(default)]
    pub emoji_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Stop {
    /// Great-circle distance from this stop to a coordinate, in meters.
    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        Haversine.distance(
            Point::new(self.longitude, self.latitude),
            Point::new(longitude, latitude),
        )
    }

    /// Identity for a coordinate nothing could name: a short deterministic
    /// hash, with name and country left unset.
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        Stop {
            name: None,
            short_name: coordinate_hash(latitude, longitude),
            emoji_name: None,
            country: None,
            latitude,
            longitude,
        }
    }

    fn from_place(place: ResolvedPlace, latitude: f64, longitude: f64) -> Self {
        Stop {
            name: Some(place.name),
            short_name: place.short_name,
            emoji_name: None,
            country: place.country,
            latitude,
            longitude,
        }
    }
}

/// Maps candidate centroids to stop identities: a predefined stop within the
/// match radius wins, then reverse geocoding if a geocoder was supplied, then
/// the deterministic hash fallback.
pub struct StopResolver<'a> {
    pub predefined: &'a [Stop],
    /// `None` disables network resolution entirely (reproducible runs).
    pub geocoder: Option<&'a dyn ReverseGeocoder>,
    /// Radius for reusing a predefined stop (meters). Predefined stops are
    /// expected not to overlap within this radius; the first match wins.
    pub match_radius: f64,
}

impl StopResolver<'_> {
    /// Resolve every centroid, in order. Exactly one stop per centroid; the
    /// output order fixes the stop indices used by trips and dwell times.
    pub fn resolve_all(&self, centroids: &[(f64, f64)]) -> Vec<Stop> {
        centroids
            .iter()
            .map(|&(latitude, longitude)| self.resolve(latitude, longitude))
            .collect()
    }

    /// Resolve a single centroid to a stop identity. Total: resolution
    /// failures fall back to the coordinate hash, never to an error.
    pub fn resolve(&self, latitude: f64, longitude: f64) -> Stop {
        for stop in self.predefined {
            let distance = stop.distance_to(latitude, longitude);
            debug!("Predefined stop {} is {:.1}m away", stop.short_name, distance);
            if distance < self.match_radius {
                return stop.clone();
            }
        }
        if let Some(geocoder) = self.geocoder {
            match geocoder.reverse(latitude, longitude) {
                Ok(place) => return Stop::from_place(place, latitude, longitude),
                Err(e) => warn!(
                    "Falling back to coordinate hash for ({:.5}, {:.5}): {}",
                    latitude, longitude, e
                ),
            }
        }
        Stop::from_coordinates(latitude, longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeError;

    struct NamedGeocoder;

    impl ReverseGeocoder for NamedGeocoder {
        fn reverse(&self, latitude: f64, _longitude: f64) -> Result<ResolvedPlace, GeocodeError> {
            Ok(ResolvedPlace {
                name: format!("Place at {latitude:.2}, Berlin, Germany"),
                short_name: format!("Place at {latitude:.2} Berlin"),
                country: Some("Germany".to_string()),
            })
        }
    }

    struct UnreachableGeocoder;

    impl ReverseGeocoder for UnreachableGeocoder {
        fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<ResolvedPlace, GeocodeError> {
            Err(GeocodeError::Timeout)
        }
    }

    fn home() -> Stop {
        Stop {
            name: Some("Home".to_string()),
            short_name: "Home".to_string(),
            emoji_name: Some("house".to_string()),
            country: Some("Germany".to_string()),
            latitude: 52.5000,
            longitude: 13.4000,
        }
    }

    #[test]
    fn one_stop_per_centroid_in_order() {
        let resolver = StopResolver {
            predefined: &[],
            geocoder: Some(&NamedGeocoder),
            match_radius: 90.0,
        };
        let centroids = vec![(52.50, 13.40), (52.52, 13.40), (52.52, 13.43)];
        let stops = resolver.resolve_all(&centroids);
        assert_eq!(stops.len(), centroids.len());
        for (stop, &(lat, lon)) in stops.iter().zip(&centroids) {
            assert_eq!((stop.latitude, stop.longitude), (lat, lon));
        }
    }

    #[test]
    fn nearby_predefined_stop_wins_verbatim() {
        let predefined = vec![home()];
        let resolver = StopResolver {
            predefined: &predefined,
            geocoder: Some(&NamedGeocoder),
            match_radius: 90.0,
        };
        // ~30m east of home
        let stop = resolver.resolve(52.5000, 13.40044);
        assert_eq!(stop, home());
    }

    #[test]
    fn distant_centroid_is_geocoded() {
        let predefined = vec![home()];
        let resolver = StopResolver {
            predefined: &predefined,
            geocoder: Some(&NamedGeocoder),
            match_radius: 90.0,
        };
        let stop = resolver.resolve(52.52, 13.43);
        assert_eq!(stop.country.as_deref(), Some("Germany"));
        assert!(stop.name.as_deref().unwrap().starts_with("Place at 52.52"));
        assert_eq!((stop.latitude, stop.longitude), (52.52, 13.43));
    }

    #[test]
    fn failed_resolution_falls_back_to_hash() {
        let resolver = StopResolver {
            predefined: &[],
            geocoder: Some(&UnreachableGeocoder),
            match_radius: 90.0,
        };
        let stop = resolver.resolve(52.52, 13.43);
        assert_eq!(stop, Stop::from_coordinates(52.52, 13.43));
        assert!(stop.name.is_none());
        assert_eq!(stop.short_name.len(), 5);
    }

    #[test]
    fn disabled_resolution_uses_the_hash() {
        let resolver = StopResolver {
            predefined: &[],
            geocoder: None,
            match_radius: 90.0,
        };
        let first = resolver.resolve(52.52, 13.43);
        let second = resolver.resolve(52.52, 13.43);
        assert_eq!(first, second);
        assert!(first.name.is_none());
    }

    #[test]
    fn registry_loads_from_json() {
        let registry = r#"[{
            "name": "Home",
            "short_name": "Home",
            "emoji_name": "house",
            "country": "Germany",
            "latitude": 52.5,
            "longitude": 13.4
        }, {
            "short_name": "Work",
            "latitude": 52.52,
            "longitude": 13.43
        }]"#;
        let stops: Vec<Stop> = serde_json::from_str(registry).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].emoji_name.as_deref(), Some("house"));
        assert!(stops[1].name.is_none());
    }
}
