//! Reverse-geocoding collaborator seam.
//!
//! The geocoder is a black box to the pipeline: a photon-style HTTP
//! service answering `/reverse?lon=..&lat=..&lang=..` with GeoJSON.
//! Lookup failures are degraded by the caller to a formatted coordinate
//! label; they never fail an analysis.

use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::config::GeocoderConfig;
use crate::error::{Result, TrackReelError};

/// Subset of the GeoJSON payload the pipeline cares about.
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    city: Option<String>,
    name: Option<String>,
}

/// Thin client for the reverse-geocoding service.
pub struct ReverseGeocoder {
    client: reqwest::Client,
    base_url: String,
    lang: String,
}

impl ReverseGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| TrackReelError::Geocode {
                message: format!("failed to build http client: {err}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lang: config.lang.clone(),
        })
    }

    /// Resolve a coordinate to a settlement name, if the service knows one.
    pub async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lon", longitude.to_string()),
                ("lat", latitude.to_string()),
                ("lang", self.lang.clone()),
            ])
            .send()
            .await
            .map_err(|err| TrackReelError::Geocode {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TrackReelError::Geocode {
                message: format!("geocoder answered {}", response.status()),
            });
        }

        let collection: FeatureCollection =
            response.json().await.map_err(|err| TrackReelError::Geocode {
                message: format!("unreadable geocoder payload: {err}"),
            })?;

        let place = pick_place(&collection);
        debug!("reverse({latitude:.5}, {longitude:.5}) -> {place:?}");
        Ok(place)
    }
}

/// Last feature wins, preferring the city property over the bare name.
fn pick_place(collection: &FeatureCollection) -> Option<String> {
    collection
        .features
        .iter()
        .rev()
        .find_map(|feature| {
            feature
                .properties
                .city
                .clone()
                .or_else(|| feature.properties.name.clone())
        })
}

/// Human-readable coordinate label used when no place name is available,
/// e.g. `51°30'26"N 0°07'40"W`.
pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!(
        "{} {}",
        format_axis(latitude, 'N', 'S'),
        format_axis(longitude, 'E', 'W')
    )
}

fn format_axis(value: f64, positive: char, negative: char) -> String {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let value = value.abs();
    let degrees = value.trunc();
    let minutes = (value - degrees) * 60.0;
    let seconds = ((minutes - minutes.trunc()) * 60.0).round().min(59.0);
    format!(
        "{}\u{00b0}{:02}'{:02}\"{}",
        degrees as u32,
        minutes.trunc() as u32,
        seconds as u32,
        hemisphere
    )
}
