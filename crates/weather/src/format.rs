//! Pure formatting of weather data into prompt-ready summary strings.

use farmbuddy_core::error::WeatherError;

use crate::client::{CurrentWeather, Forecast, ForecastEntry};

/// Render current conditions as one sentence for the model context.
pub fn format_current(weather: &CurrentWeather) -> String {
    let location = weather.name.as_deref().unwrap_or("Unknown Location");
    let description = weather
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or("N/A");

    format!(
        "Current weather in {location}: {}°C, {description}. Humidity: {}%. Wind Speed: {} m/s.",
        weather.main.temp, weather.main.humidity, weather.wind.speed
    )
}

/// Render the 5-day forecast as one summary line per calendar date.
///
/// Entries are grouped by date; at most 5 distinct dates are kept in
/// chronological order. Each line carries the date's most frequent
/// condition description (ties broken by first encounter), its min/max
/// temperature, and a rain note only when the average precipitation
/// probability strictly exceeds 0.30.
pub fn format_forecast(forecast: &Forecast) -> String {
    let mut dates: Vec<String> = Vec::new();
    let mut by_date: std::collections::HashMap<String, Vec<&ForecastEntry>> =
        std::collections::HashMap::new();

    for entry in &forecast.entries {
        let Some(date) = entry.date() else { continue };
        if !by_date.contains_key(date) {
            dates.push(date.to_string());
        }
        by_date.entry(date.to_string()).or_default().push(entry);
    }

    dates.sort();
    dates.truncate(5);

    let mut lines = Vec::with_capacity(dates.len());
    for date in &dates {
        let entries = &by_date[date];

        let temps: Vec<f64> = entries.iter().map(|e| e.main.temp).collect();
        let min_temp = temps.iter().copied().fold(f64::INFINITY, f64::min);
        let max_temp = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let description = most_common_description(entries);

        let avg_pop =
            entries.iter().map(|e| e.pop).sum::<f64>() / entries.len() as f64;
        let rain_note = if avg_pop > 0.3 {
            format!(" (Rain chance: {}%)", (avg_pop * 100.0) as i64)
        } else {
            String::new()
        };

        lines.push(format!(
            "- {date}: {description}, {}°C-{}°C{rain_note}",
            min_temp as i64, max_temp as i64
        ));
    }

    format!("Upcoming Forecast:\n{}", lines.join("\n"))
}

/// The most frequent condition description for a date's entries, first
/// encountered winning ties.
fn most_common_description(entries: &[&ForecastEntry]) -> String {
    let descriptions: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.weather.first())
        .map(|c| c.description.as_str())
        .collect();

    let mut best: Option<(&str, usize)> = None;
    for (i, desc) in descriptions.iter().enumerate() {
        if descriptions[..i].contains(desc) {
            continue; // already counted at first encounter
        }
        let count = descriptions.iter().filter(|d| *d == desc).count();
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((desc, count)),
        }
    }

    best.map(|(desc, _)| desc.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Current-conditions summary, with failures rendered as a string the
/// model can still read.
pub fn current_report(result: &Result<CurrentWeather, WeatherError>) -> String {
    match result {
        Ok(weather) => format_current(weather),
        Err(e) => format!("Weather data unavailable: {e}"),
    }
}

/// Forecast summary, with failures rendered as a string.
pub fn forecast_report(result: &Result<Forecast, WeatherError>) -> String {
    match result {
        Ok(forecast) => format_forecast(forecast),
        Err(e) => format!("Forecast unavailable: {e}"),
    }
}

/// Current conditions plus forecast, fetched concurrently. This is the
/// string stored in sessions and handed to the context assembler.
pub async fn report(client: &crate::client::OpenWeatherClient, lat: f64, lon: f64) -> String {
    let (current, forecast) = tokio::join!(client.current(lat, lon), client.forecast(lat, lon));
    format!("{}\n\n{}", current_report(&current), forecast_report(&forecast))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Condition, MainMetrics};

    fn entry(dt_txt: &str, temp: f64, description: &str, pop: f64) -> ForecastEntry {
        ForecastEntry {
            dt_txt: dt_txt.to_string(),
            main: MainMetrics {
                temp,
                humidity: 60.0,
            },
            weather: vec![Condition {
                description: description.to_string(),
            }],
            pop,
        }
    }

    #[test]
    fn formats_current_conditions() {
        let weather = CurrentWeather {
            name: Some("Lagos".into()),
            main: MainMetrics {
                temp: 29.0,
                humidity: 74.0,
            },
            weather: vec![Condition {
                description: "clear sky".into(),
            }],
            wind: crate::client::Wind { speed: 3.6 },
        };

        let summary = format_current(&weather);
        assert!(summary.starts_with("Current weather in Lagos: 29°C, clear sky."));
        assert!(summary.contains("Humidity: 74%"));
        assert!(summary.contains("Wind Speed: 3.6 m/s."));
    }

    #[test]
    fn missing_name_becomes_unknown_location() {
        let weather = CurrentWeather {
            name: None,
            main: MainMetrics::default(),
            weather: vec![],
            wind: crate::client::Wind::default(),
        };
        assert!(format_current(&weather).starts_with("Current weather in Unknown Location:"));
    }

    #[test]
    fn forty_entries_over_five_dates_yield_five_lines() {
        // 8 three-hour steps per day for 5 days, like the real API.
        let mut entries = Vec::new();
        for day in 10..15 {
            for hour in (0..24).step_by(3) {
                let temp = 20.0 + day as f64 + (hour as f64) / 10.0;
                entries.push(entry(
                    &format!("2026-03-{day} {hour:02}:00:00"),
                    temp,
                    "scattered clouds",
                    0.1,
                ));
            }
        }
        assert_eq!(entries.len(), 40);

        let summary = format_forecast(&Forecast { entries });
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Upcoming Forecast:");
        assert_eq!(lines.len(), 6);

        // Chronological order, one line per date, min <= max consistent
        // with the inputs for that date.
        for (i, day) in (10..15).enumerate() {
            let line = lines[i + 1];
            assert!(line.starts_with(&format!("- 2026-03-{day}:")));
            let min = (20.0 + day as f64) as i64;
            let max = (20.0 + day as f64 + 2.1) as i64;
            assert!(line.contains(&format!("{min}°C-{max}°C")));
        }
    }

    #[test]
    fn more_than_five_dates_are_truncated() {
        let entries = (10..18)
            .map(|day| entry(&format!("2026-03-{day} 12:00:00"), 25.0, "clear sky", 0.0))
            .collect();
        let summary = format_forecast(&Forecast { entries });
        assert_eq!(summary.lines().count(), 6);
        assert!(summary.contains("2026-03-14"));
        assert!(!summary.contains("2026-03-15"));
    }

    #[test]
    fn rain_note_requires_strictly_more_than_thirty_percent() {
        let at_boundary = Forecast {
            entries: vec![
                entry("2026-03-10 09:00:00", 28.0, "light rain", 0.3),
                entry("2026-03-10 12:00:00", 30.0, "light rain", 0.3),
            ],
        };
        assert!(!format_forecast(&at_boundary).contains("Rain chance"));

        let above = Forecast {
            entries: vec![
                entry("2026-03-10 09:00:00", 28.0, "light rain", 0.4),
                entry("2026-03-10 12:00:00", 30.0, "light rain", 0.4),
            ],
        };
        let summary = format_forecast(&above);
        assert!(summary.contains("(Rain chance: 40%)"));
    }

    #[test]
    fn description_ties_break_by_first_encounter() {
        let forecast = Forecast {
            entries: vec![
                entry("2026-03-10 06:00:00", 25.0, "clear sky", 0.0),
                entry("2026-03-10 09:00:00", 26.0, "scattered clouds", 0.0),
                entry("2026-03-10 12:00:00", 27.0, "scattered clouds", 0.0),
                entry("2026-03-10 15:00:00", 27.0, "clear sky", 0.0),
            ],
        };
        // 2-2 tie: "clear sky" was seen first.
        assert!(format_forecast(&forecast).contains("clear sky, 25°C-27°C"));
    }

    #[test]
    fn entries_without_dates_are_skipped() {
        let forecast = Forecast {
            entries: vec![
                entry("", 25.0, "clear sky", 0.0),
                entry("2026-03-10 12:00:00", 28.0, "clear sky", 0.0),
            ],
        };
        let summary = format_forecast(&forecast);
        assert_eq!(summary.lines().count(), 2);
    }

    #[test]
    fn error_results_become_readable_strings() {
        let current: Result<CurrentWeather, WeatherError> = Err(WeatherError::NotConfigured);
        assert!(current_report(&current).starts_with("Weather data unavailable:"));

        let forecast: Result<Forecast, WeatherError> =
            Err(WeatherError::Http("forecast returned 502".into()));
        let report = forecast_report(&forecast);
        assert!(report.starts_with("Forecast unavailable:"));
        assert!(report.contains("502"));
    }
}
