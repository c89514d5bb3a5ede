//! Upcoming calendar events and the Google Calendar v3 client that supplies them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CalendarSettings;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("no calendar access token configured")]
    MissingToken,
    #[error("invalid calendar url: {0}")]
    InvalidUrl(String),
    #[error("calendar request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("calendar api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("event has no start time")]
    MissingStart,
    #[error("unparseable event start {value:?}: {source}")]
    BadStart {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// `start` of a calendar event: either an all-day `date` or a `dateTime`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl EventStart {
    pub fn at(date_time: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            date: None,
        }
    }

    pub fn all_day(date: impl Into<String>) -> Self {
        Self {
            date_time: None,
            date: Some(date.into()),
        }
    }

    /// Start as a local wall-clock time.
    ///
    /// A trailing `Z` is dropped and the remainder read as local time; explicit offsets are
    /// converted to the local zone. All-day events start at local midnight.
    pub fn local_time(&self) -> Result<NaiveDateTime, CalendarError> {
        if let Some(raw) = self.date_time.as_deref() {
            let bad = |source| CalendarError::BadStart {
                value: raw.to_string(),
                source,
            };
            if let Some(naive) = raw.strip_suffix('Z') {
                return NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f").map_err(bad);
            }
            return DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Local).naive_local())
                .map_err(bad);
        }

        let raw = self.date.as_deref().ok_or(CalendarError::MissingStart)?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|source| CalendarError::BadStart {
                value: raw.to_string(),
                source,
            })?
            .and_hms_opt(0, 0, 0)
            .ok_or(CalendarError::MissingStart)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start: EventStart,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl CalendarEvent {
    pub fn new(summary: impl Into<String>, start: EventStart) -> Self {
        Self {
            summary: summary.into(),
            start,
            description: None,
            location: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Source of the user's upcoming events, soonest first.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn upcoming_events(&self, max_count: u32) -> Result<Vec<CalendarEvent>, CalendarError>;
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

pub struct GoogleCalendar {
    client: reqwest::Client,
    settings: CalendarSettings,
}

impl GoogleCalendar {
    pub fn new(settings: CalendarSettings) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    fn events_url(&self) -> Result<reqwest::Url, CalendarError> {
        let mut url = reqwest::Url::parse(&self.settings.base_url)
            .map_err(|e| CalendarError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| CalendarError::InvalidUrl(self.settings.base_url.clone()))?
            .pop_if_empty()
            .extend(["calendars", self.settings.calendar_id.as_str(), "events"]);
        Ok(url)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendar {
    async fn upcoming_events(&self, max_count: u32) -> Result<Vec<CalendarEvent>, CalendarError> {
        let token = self
            .settings
            .access_token
            .as_deref()
            .ok_or(CalendarError::MissingToken)?;
        let url = self.events_url()?;
        let time_min = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("timeMin", time_min),
                ("maxResults", max_count.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let list: EventList = response.json().await?;
        debug!(count = list.items.len(), "fetched calendar events");
        Ok(list.items)
    }
}
