use chrono::{DateTime, Utc};
use gondola_core::{CoreError, CoreResult, FlightChanges, NewFlight};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bounds a published flight must respect
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleLimits {
    /// Largest basket certified for commercial rides
    pub max_passengers: i32,
    pub max_duration_minutes: i32,
}

impl Default for ScheduleLimits {
    fn default() -> Self {
        Self {
            max_passengers: 32,
            max_duration_minutes: 600,
        }
    }
}

/// Flight as submitted by a pilot, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct FlightDraft {
    pub title: String,
    pub description: Option<String>,
    pub launch_site: String,
    pub departure_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub currency: Option<String>,
    pub max_passengers: i32,
}

impl FlightDraft {
    /// Validate the draft and turn it into an insertable flight for `pilot_id`.
    pub fn into_new_flight(
        self,
        pilot_id: Uuid,
        default_currency: &str,
        now: DateTime<Utc>,
        limits: &ScheduleLimits,
    ) -> CoreResult<NewFlight> {
        let currency = self
            .currency
            .as_deref()
            .unwrap_or(default_currency)
            .to_ascii_uppercase();

        let mut problems = Vec::new();
        check_text("title", &self.title, &mut problems);
        check_text("launch_site", &self.launch_site, &mut problems);
        check_departure(self.departure_time, now, &mut problems);
        check_duration(self.duration_minutes, limits, &mut problems);
        check_price(self.price_cents, &mut problems);
        check_capacity(self.max_passengers, limits, &mut problems);
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            problems.push(format!("currency must be a 3-letter code, got '{}'", currency));
        }
        reject(problems)?;

        Ok(NewFlight {
            pilot_id,
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            launch_site: self.launch_site.trim().to_string(),
            departure_time: self.departure_time,
            duration_minutes: self.duration_minutes,
            price_cents: self.price_cents,
            currency,
            max_passengers: self.max_passengers,
        })
    }
}

/// Validate the fields present in a partial update.
pub fn validate_changes(changes: &FlightChanges, now: DateTime<Utc>, limits: &ScheduleLimits) -> CoreResult<()> {
    let mut problems = Vec::new();
    if let Some(title) = &changes.title {
        check_text("title", title, &mut problems);
    }
    if let Some(site) = &changes.launch_site {
        check_text("launch_site", site, &mut problems);
    }
    if let Some(departure) = changes.departure_time {
        check_departure(departure, now, &mut problems);
    }
    if let Some(duration) = changes.duration_minutes {
        check_duration(duration, limits, &mut problems);
    }
    if let Some(price) = changes.price_cents {
        check_price(price, &mut problems);
    }
    if let Some(max) = changes.max_passengers {
        check_capacity(max, limits, &mut problems);
    }
    reject(problems)
}

fn check_text(field: &str, value: &str, problems: &mut Vec<String>) {
    if value.trim().is_empty() {
        problems.push(format!("{} must not be empty", field));
    }
}

fn check_departure(departure: DateTime<Utc>, now: DateTime<Utc>, problems: &mut Vec<String>) {
    if departure <= now {
        problems.push("departure_time must be in the future".to_string());
    }
}

fn check_duration(minutes: i32, limits: &ScheduleLimits, problems: &mut Vec<String>) {
    if minutes < 1 || minutes > limits.max_duration_minutes {
        problems.push(format!(
            "duration_minutes must be between 1 and {}",
            limits.max_duration_minutes
        ));
    }
}

fn check_price(price_cents: i64, problems: &mut Vec<String>) {
    if price_cents <= 0 {
        problems.push("price_cents must be positive".to_string());
    }
}

fn check_capacity(max_passengers: i32, limits: &ScheduleLimits, problems: &mut Vec<String>) {
    if max_passengers < 1 || max_passengers > limits.max_passengers {
        problems.push(format!(
            "max_passengers must be between 1 and {}",
            limits.max_passengers
        ));
    }
}

fn reject(problems: Vec<String>) -> CoreResult<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CoreError::ValidationError(problems.join("; ")))
    }
}
