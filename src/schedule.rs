//! Routing calendar events to delivery actions by category and time window.

use chrono::NaiveDateTime;

use crate::calendar::{CalendarError, CalendarEvent};
use crate::config::ScheduleSettings;

/// What an event's summary asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Medicine,
    Trip,
    Party,
    Other,
}

impl EventCategory {
    pub fn classify(summary: &str) -> Self {
        match summary.trim().to_lowercase().as_str() {
            "medicine" => EventCategory::Medicine,
            "trip" | "travel" => EventCategory::Trip,
            "party" => EventCategory::Party,
            _ => EventCategory::Other,
        }
    }
}

/// Occasions that call for the medical kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occasion {
    Trip,
    Party,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DeliverMedicine,
    DeliverKit(Occasion),
}

/// Result of matching one event against the rules at a given instant.
#[derive(Debug)]
pub enum Routing {
    Due(Action),
    /// A rule matched the category but the event is outside its window.
    NotDue(Action),
    Unmatched,
    InvalidStart(CalendarError),
}

/// Per-category windows, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct EventScheduler {
    medicine_window_ms: i64,
    trip_threshold_ms: i64,
    party_threshold_ms: i64,
}

impl EventScheduler {
    pub fn new(settings: &ScheduleSettings) -> Self {
        Self {
            medicine_window_ms: settings.medicine_window_minutes * 60_000,
            trip_threshold_ms: settings.trip_threshold_hours * 3_600_000,
            party_threshold_ms: settings.party_threshold_hours * 3_600_000,
        }
    }

    pub fn action_for(category: EventCategory) -> Option<Action> {
        match category {
            EventCategory::Medicine => Some(Action::DeliverMedicine),
            EventCategory::Trip => Some(Action::DeliverKit(Occasion::Trip)),
            EventCategory::Party => Some(Action::DeliverKit(Occasion::Party)),
            EventCategory::Other => None,
        }
    }

    /// Whether `action` is due for an event starting at `start`.
    ///
    /// Medicine is due within the window either side of the start; kits are due whenever
    /// less than the threshold has passed since the start, future events included. Both
    /// bounds are exclusive.
    pub fn is_due(&self, action: Action, start: NaiveDateTime, now: NaiveDateTime) -> bool {
        let since_start = (now - start).num_milliseconds();
        match action {
            Action::DeliverMedicine => since_start.abs() < self.medicine_window_ms,
            Action::DeliverKit(Occasion::Trip) => since_start < self.trip_threshold_ms,
            Action::DeliverKit(Occasion::Party) => since_start < self.party_threshold_ms,
        }
    }

    pub fn route(&self, event: &CalendarEvent, now: NaiveDateTime) -> Routing {
        let Some(action) = Self::action_for(EventCategory::classify(&event.summary)) else {
            return Routing::Unmatched;
        };
        match event.start.local_time() {
            Ok(start) if self.is_due(action, start, now) => Routing::Due(action),
            Ok(_) => Routing::NotDue(action),
            Err(e) => Routing::InvalidStart(e),
        }
    }
}
