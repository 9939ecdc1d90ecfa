//! Weather data for FarmBuddy: an OpenWeatherMap client plus the pure
//! formatting that turns raw responses into the summary strings injected
//! into model prompts.

pub mod client;
pub mod format;

pub use client::{Condition, CurrentWeather, Forecast, ForecastEntry, OpenWeatherClient};
pub use format::{current_report, forecast_report, format_current, format_forecast, report};
