//! OpenWeatherMap HTTP client.
//!
//! Two endpoints: current conditions and the 5-day/3-hour forecast, both
//! keyed by latitude/longitude with metric units. A missing API key is a
//! domain error, not a panic, so a bot without weather configured keeps
//! answering text questions.

use farmbuddy_core::error::WeatherError;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Client for the OpenWeatherMap REST API.
pub struct OpenWeatherClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenWeatherClient {
    /// Build a client. `api_key = None` is allowed; calls will fail with
    /// [`WeatherError::NotConfigured`].
    pub fn new(api_key: Option<String>) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WeatherError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        lat: f64,
        lon: f64,
    ) -> Result<T, WeatherError> {
        let api_key = self.api_key.as_ref().ok_or(WeatherError::NotConfigured)?;

        debug!(endpoint, lat, lon, "Fetching weather data");

        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Http(format!(
                "{} returned {}",
                endpoint,
                status.as_u16()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| WeatherError::Malformed(e.to_string()))
    }

    /// Current conditions at the given coordinates.
    pub async fn current(&self, lat: f64, lon: f64) -> Result<CurrentWeather, WeatherError> {
        self.fetch("weather", lat, lon).await
    }

    /// 5-day forecast in 3-hour steps at the given coordinates.
    pub async fn forecast(&self, lat: f64, lon: f64) -> Result<Forecast, WeatherError> {
        self.fetch("forecast", lat, lon).await
    }
}

// --- Response types (subset of the OpenWeatherMap schema we consume) ---

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    /// Resolved place name, when the API knows one
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub main: MainMetrics,

    #[serde(default)]
    pub weather: Vec<Condition>,

    #[serde(default)]
    pub wind: Wind,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MainMetrics {
    #[serde(default)]
    pub temp: f64,

    #[serde(default)]
    pub humidity: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Forecast {
    #[serde(default, rename = "list")]
    pub entries: Vec<ForecastEntry>,
}

/// One 3-hour forecast step.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastEntry {
    /// Timestamp text, e.g. "2026-03-10 12:00:00"
    #[serde(default)]
    pub dt_txt: String,

    #[serde(default)]
    pub main: MainMetrics,

    #[serde(default)]
    pub weather: Vec<Condition>,

    /// Probability of precipitation in [0, 1]
    #[serde(default)]
    pub pop: f64,
}

impl ForecastEntry {
    /// The calendar date portion of `dt_txt`, when present.
    pub fn date(&self) -> Option<&str> {
        let date = self.dt_txt.split(' ').next().unwrap_or("");
        if date.is_empty() { None } else { Some(date) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_a_domain_error() {
        let client = OpenWeatherClient::new(None).unwrap();
        assert!(!client.is_configured());
        let err = client.current(6.45, 3.39).await.unwrap_err();
        assert!(matches!(err, WeatherError::NotConfigured));
    }

    #[test]
    fn parses_current_weather_response() {
        let json = r#"{
            "name": "Lagos",
            "main": {"temp": 29.4, "humidity": 74},
            "weather": [{"description": "clear sky"}],
            "wind": {"speed": 3.6}
        }"#;
        let weather: CurrentWeather = serde_json::from_str(json).unwrap();
        assert_eq!(weather.name.as_deref(), Some("Lagos"));
        assert_eq!(weather.main.temp, 29.4);
        assert_eq!(weather.weather[0].description, "clear sky");
    }

    #[test]
    fn parses_forecast_entry_and_date() {
        let json = r#"{
            "list": [
                {"dt_txt": "2026-03-10 12:00:00",
                 "main": {"temp": 31.0, "humidity": 60},
                 "weather": [{"description": "light rain"}],
                 "pop": 0.45}
            ]
        }"#;
        let forecast: Forecast = serde_json::from_str(json).unwrap();
        assert_eq!(forecast.entries.len(), 1);
        assert_eq!(forecast.entries[0].date(), Some("2026-03-10"));
        assert_eq!(forecast.entries[0].pop, 0.45);
    }

    #[test]
    fn missing_fields_default() {
        let forecast: Forecast = serde_json::from_str(r#"{"list": [{"dt_txt": ""}]}"#).unwrap();
        assert_eq!(forecast.entries[0].date(), None);
        assert_eq!(forecast.entries[0].pop, 0.0);
    }
}
