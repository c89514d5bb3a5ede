//! Cozmo caretaker.
//!
//! A session finds the user by face, greets them, reads their next calendar events and
//! delivers the matching cube: medicine (followed by water) when a dose is due, or the
//! medical kit ahead of a trip or party.
//!
//! This crate defines:
//! - [`RobotDevice`]: the motion/perception contract, with [`BridgeDevice`] speaking to the
//!   SDK bridge over a local socket.
//! - [`FaceLocator`], [`CubeLocator`], [`TapWaiter`]: bounded searches and hand-off waits.
//! - [`EventScheduler`]: category and time-window rules for calendar events.
//! - [`TaskRunner`]: the session orchestrator.

pub mod bridge;
pub mod calendar;
pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
pub mod journal;
pub mod notify;
pub mod perception;
pub mod runner;
pub mod schedule;
pub mod session;

pub use crate::bridge::BridgeDevice;
pub use crate::calendar::{CalendarError, CalendarEvent, CalendarSource, EventStart, GoogleCalendar};
pub use crate::config::Settings;
pub use crate::device::{CubeRef, CubeRole, DetectedFace, DeviceError, RobotDevice};
pub use crate::error::CaretakerError;
pub use crate::geometry::{approach_pose, GeometryError, Pose, Position};
pub use crate::journal::{DeliveryJournal, DeliveryRecord};
pub use crate::notify::{GmailNotifier, NotificationSink, NotifyError};
pub use crate::perception::{CubeLocator, FaceFix, FaceLocator, TapOutcome, TapWaiter};
pub use crate::runner::{Clock, DispatchOutcome, SessionOutcome, SystemClock, TaskRunner};
pub use crate::schedule::{EventCategory, EventScheduler};
pub use crate::session::SessionState;
