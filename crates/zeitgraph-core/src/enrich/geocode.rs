use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::GeocoderConfig;
use crate::entity::{BoundingBox, SpatialAttributes};

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("No match for {0:?}")]
    NotFound(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Endpoint cannot be used as a base URL: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type GeocodeResult<T> = Result<T, GeocodeError>;

/// Resolves a place name to coordinates.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> GeocodeResult<SpatialAttributes>;
}

/// Client for a Nominatim `/search` endpoint.
pub struct NominatimGeocoder {
    client: Client,
    search_url: Url,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> GeocodeResult<Self> {
        let mut search_url = Url::parse(&config.endpoint)?;
        search_url
            .path_segments_mut()
            .map_err(|()| GeocodeError::InvalidEndpoint(config.endpoint.clone()))?
            .pop_if_empty()
            .push("search");

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(u64::from(config.connect_timeout_seconds)))
            .timeout(Duration::from_secs(u64::from(config.request_timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client, search_url })
    }

    pub fn search_url(&self, query: &str) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        url
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> GeocodeResult<SpatialAttributes> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(self.search_url(query))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(query.to_string()))?
            .into_attributes()
    }
}

/// One entry of a Nominatim JSON response. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: Option<String>,
    #[serde(rename = "type")]
    place_type: Option<String>,
    importance: Option<f64>,
    osm_id: Option<serde_json::Value>,
    boundingbox: Option<Vec<String>>,
}

impl NominatimPlace {
    fn into_attributes(self) -> GeocodeResult<SpatialAttributes> {
        let coordinate = |raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| GeocodeError::InvalidResponse(format!("bad coordinate {raw:?}")))
        };

        Ok(SpatialAttributes {
            latitude: Some(coordinate(&self.lat)?),
            longitude: Some(coordinate(&self.lon)?),
            display_name: self.display_name,
            location_type: self.place_type,
            importance: self.importance,
            osm_id: self.osm_id.and_then(|id| match id {
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::String(s) => Some(s),
                _ => None,
            }),
            bounding_box: self.boundingbox.as_deref().and_then(parse_bounding_box),
        })
    }
}

/// `[south, north, west, east]`. All four parse or none are kept.
fn parse_bounding_box(raw: &[String]) -> Option<BoundingBox> {
    let [south, north, west, east] = raw else {
        return None;
    };
    Some(BoundingBox {
        south: south.trim().parse().ok()?,
        north: north.trim().parse().ok()?,
        west: west.trim().parse().ok()?,
        east: east.trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIENNA: &str = r#"[{
        "place_id": 112233,
        "osm_type": "relation",
        "osm_id": 109166,
        "lat": "48.2083537",
        "lon": "16.3725042",
        "display_name": "Wien, Österreich",
        "type": "city",
        "importance": 0.8773,
        "boundingbox": ["48.1179069", "48.3226679", "16.1826199", "16.5775132"]
    }]"#;

    #[test]
    fn test_search_url() {
        let geocoder = NominatimGeocoder::new(&GeocoderConfig {
            endpoint: "http://localhost:8080/nominatim/".into(),
            ..GeocoderConfig::default()
        })
        .unwrap();

        let url = geocoder.search_url("The Hague");
        assert_eq!(url.path(), "/nominatim/search");
        assert_eq!(url.query(), Some("q=The+Hague&format=json&limit=1"));
    }

    #[test]
    fn test_response_mapping() {
        let places: Vec<NominatimPlace> = serde_json::from_str(VIENNA).unwrap();
        let attrs = places.into_iter().next().unwrap().into_attributes().unwrap();

        assert!((attrs.latitude.unwrap() - 48.208_353_7).abs() < 1e-9);
        assert!((attrs.longitude.unwrap() - 16.372_504_2).abs() < 1e-9);
        assert_eq!(attrs.display_name.as_deref(), Some("Wien, Österreich"));
        assert_eq!(attrs.location_type.as_deref(), Some("city"));
        assert_eq!(attrs.osm_id.as_deref(), Some("109166"));

        let bbox = attrs.bounding_box.unwrap();
        assert!((bbox.south - 48.117_906_9).abs() < 1e-9);
        assert!((bbox.east - 16.577_513_2).abs() < 1e-9);
    }

    #[test]
    fn test_partial_bounding_box_is_dropped() {
        assert!(parse_bounding_box(&["1".into(), "2".into(), "3".into()]).is_none());
        assert!(parse_bounding_box(&["1".into(), "2".into(), "x".into(), "4".into()]).is_none());
    }

    #[test]
    fn test_bad_coordinates_are_rejected() {
        let places: Vec<NominatimPlace> =
            serde_json::from_str(r#"[{"lat": "north", "lon": "16.3"}]"#).unwrap();
        let err = places.into_iter().next().unwrap().into_attributes().unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidResponse(_)));
    }
}
