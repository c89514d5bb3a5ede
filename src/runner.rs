//! One caretaking session: greet the user, read the calendar, deliver what is due.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::bridge::BridgeDevice;
use crate::calendar::{CalendarEvent, CalendarSource, GoogleCalendar};
use crate::config::{JournalSettings, Settings};
use crate::device::{CubeRef, CubeRole, DeviceError, LightColor, Reaction, RobotDevice};
use crate::error::CaretakerError;
use crate::geometry::Pose;
use crate::journal::{DeliveryJournal, DeliveryRecord, DeliveryStatus};
use crate::notify::{GmailNotifier, NotificationSink};
use crate::perception::{CubeLocator, FaceFix, FaceLocator, TapOutcome, TapWaiter};
use crate::schedule::{Action, EventScheduler, Occasion, Routing};
use crate::session::{CubeAvailability, SessionState};

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Both face searches failed; nothing else was attempted.
    UserNotFound,
    NothingScheduled,
    Completed { deliveries: usize },
    /// Stopped from outside while waiting for a tap.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    OutOfWindow,
    CubesMissing,
    Unmatched,
    InvalidStart,
    /// No approach pose yet; the user was never found.
    UserUnknown,
    Cancelled,
}

impl DispatchOutcome {
    pub fn delivered(self) -> bool {
        self == DispatchOutcome::Delivered
    }
}

/// Time-of-day greeting on the local clock.
pub fn greeting(user: &str, hour: u32) -> String {
    match hour {
        0..=11 => format!("Good Morning {user}, Hope you had a good sleep."),
        12..=14 => format!("Good Afternoon {user}"),
        _ => format!("Good Evening {user}, Hope you had a wonderful day today"),
    }
}

fn kit_announcement(occasion: Occasion, location: Option<&str>) -> String {
    let plan = match (occasion, location) {
        (Occasion::Trip, Some(place)) => format!("a trip to {place}"),
        (Occasion::Trip, None) => "a trip".to_string(),
        (Occasion::Party, Some(place)) => format!("a party at {place}"),
        (Occasion::Party, None) => "a party".to_string(),
    };
    format!("Oh. I can see you have {plan} today. I will bring you the medicine kit now.")
}

fn kit_handover(occasion: Occasion) -> &'static str {
    match occasion {
        Occasion::Trip => "Here is your medical kit. Please take it along with you during the travel.",
        Occasion::Party => "Here is your medical kit. Please take it along with you to the party.",
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Journal failures never stop a session; without a journal deliveries go unrecorded.
fn open_journal(settings: &JournalSettings) -> Option<DeliveryJournal> {
    if !settings.enabled {
        return None;
    }
    match DeliveryJournal::open(&settings.path) {
        Ok(journal) => Some(journal),
        Err(e) => {
            warn!(path = %settings.path.display(), error = %e, "delivery journal unavailable; continuing without it");
            None
        }
    }
}

pub struct TaskRunner {
    settings: Settings,
    device: Arc<dyn RobotDevice>,
    calendar: Arc<dyn CalendarSource>,
    notifier: Arc<dyn NotificationSink>,
    journal: Option<DeliveryJournal>,
    clock: Arc<dyn Clock>,
    scheduler: EventScheduler,
    cancel: CancellationToken,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("user", &self.settings.robot.user_name)
            .field("scheduler", &self.scheduler)
            .field("journal", &self.journal.is_some())
            .finish()
    }
}

impl TaskRunner {
    pub fn new(
        settings: Settings,
        device: Arc<dyn RobotDevice>,
        calendar: Arc<dyn CalendarSource>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let scheduler = EventScheduler::new(&settings.schedule);
        Self {
            settings,
            device,
            calendar,
            notifier,
            journal: None,
            clock: Arc::new(SystemClock),
            scheduler,
            cancel: CancellationToken::new(),
        }
    }

    /// Connects to the SDK bridge and the Google APIs described by `settings`.
    pub fn connect(settings: Settings) -> Result<Self, CaretakerError> {
        let device = BridgeDevice::connect(
            &settings.robot.bridge_socket,
            settings.robot.speech_duration_scalar,
        )?;
        let calendar = GoogleCalendar::new(settings.calendar.clone())?;
        let notifier = GmailNotifier::new(settings.email.clone())?;
        let journal = open_journal(&settings.journal);

        let mut runner = Self::new(
            settings,
            Arc::new(device),
            Arc::new(calendar),
            Arc::new(notifier),
        );
        runner.journal = journal;
        Ok(runner)
    }

    pub fn with_journal(mut self, journal: DeliveryJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token that stops the session: searches end early and no further cube is carried.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn journal(&self) -> Option<&DeliveryJournal> {
        self.journal.as_ref()
    }

    fn user(&self) -> &str {
        &self.settings.robot.user_name
    }

    /// Runs one full session. Not resumable; a new session starts from scratch.
    #[instrument(skip(self), fields(user = %self.settings.robot.user_name))]
    pub async fn run(&self) -> Result<SessionOutcome, DeviceError> {
        let mut session = SessionState::new(self.settings.schedule.medicine_stock);
        if self.cancel.is_cancelled() {
            return Ok(SessionOutcome::Cancelled);
        }

        let fix = self.greet().await?;
        if self.cancel.is_cancelled() {
            info!("session cancelled during greeting");
            return Ok(SessionOutcome::Cancelled);
        }
        let Some(fix) = fix else {
            warn!("unable to find the user; ending session");
            self.device.play_reaction(Reaction::Sleep).await?;
            return Ok(SessionOutcome::UserNotFound);
        };
        session.user = Some(fix);

        let events = self.fetch_events().await;
        if events.is_empty() {
            self.device
                .say("You don't have any medicine or upcoming event as of now")
                .await?;
            self.device.play_reaction(Reaction::Sleep).await?;
            return Ok(SessionOutcome::NothingScheduled);
        }

        let mut deliveries = 0;
        for event in &events {
            if self.cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }
            match self.dispatch(&mut session, event).await? {
                DispatchOutcome::Delivered => deliveries += 1,
                DispatchOutcome::Cancelled => return Ok(SessionOutcome::Cancelled),
                _ => {}
            }
        }

        self.device.say("That is all for now. Enjoy your time.").await?;
        self.device.play_reaction(Reaction::Sleep).await?;
        info!(deliveries, remaining_medicine = session.remaining_medicine, "session complete");
        Ok(SessionOutcome::Completed { deliveries })
    }

    /// Finds the user (one long search, then one shorter retry) and greets them.
    async fn greet(&self) -> Result<Option<FaceFix>, DeviceError> {
        let user = self.user();
        let timing = &self.settings.timing;
        let locator = FaceLocator::new(self.device.as_ref(), timing).with_cancellation(&self.cancel);

        let mut fix = locator
            .locate(user, Duration::from_secs(timing.face_search_timeout_secs))
            .await?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        if fix.is_none() {
            self.device.play_reaction(Reaction::Bored).await?;
            self.device
                .say(&format!("Hello {user}, Are you there? I can't find you."))
                .await?;
            fix = locator
                .locate(user, Duration::from_secs(timing.face_retry_timeout_secs))
                .await?;
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
        }

        let Some(fix) = fix else {
            self.device.play_reaction(Reaction::Bored).await?;
            self.device
                .say(&format!(
                    "I can't find you {user}. Please let me know if you are here."
                ))
                .await?;
            return Ok(None);
        };

        self.device.play_reaction(Reaction::Celebrate).await?;
        self.device
            .turn_toward(&fix.face, timing.motion_retries)
            .await?;
        self.device
            .say(&greeting(user, self.clock.now().hour()))
            .await?;
        Ok(Some(fix))
    }

    async fn fetch_events(&self) -> Vec<CalendarEvent> {
        let count = self.settings.schedule.event_count;
        match self.calendar.upcoming_events(count).await {
            Ok(mut events) => {
                events.truncate(count as usize);
                info!(count = events.len(), "upcoming events fetched");
                events
            }
            Err(e) => {
                warn!(error = %e, "calendar fetch failed; treating as no events");
                Vec::new()
            }
        }
    }

    /// Matches one event against the rules and performs the due action, if any.
    pub async fn dispatch(
        &self,
        session: &mut SessionState,
        event: &CalendarEvent,
    ) -> Result<DispatchOutcome, DeviceError> {
        match self.scheduler.route(event, self.clock.now()) {
            Routing::Unmatched => {
                debug!(summary = %event.summary, "no rule for event");
                Ok(DispatchOutcome::Unmatched)
            }
            Routing::InvalidStart(e) => {
                warn!(summary = %event.summary, error = %e, "skipping event with bad start");
                Ok(DispatchOutcome::InvalidStart)
            }
            Routing::NotDue(action) => {
                info!(summary = %event.summary, ?action, "event outside its window");
                Ok(DispatchOutcome::OutOfWindow)
            }
            Routing::Due(Action::DeliverMedicine) => self.deliver_medicine(session, event).await,
            Routing::Due(Action::DeliverKit(occasion)) => {
                self.deliver_kit(session, event, occasion).await
            }
        }
    }

    async fn deliver_medicine(
        &self,
        session: &mut SessionState,
        event: &CalendarEvent,
    ) -> Result<DispatchOutcome, DeviceError> {
        let Some(fix) = session.user.clone() else {
            return Ok(DispatchOutcome::UserUnknown);
        };

        self.device.turn_toward(&fix.face, 1).await?;
        let announcement = match non_empty(&event.description) {
            Some(kind) => format!(
                "It is time for your {kind} medicine. I am going to get the medicine for you now."
            ),
            None => "It is time for your medicine. I am going to get the medicine for you now."
                .to_string(),
        };
        self.device.say(&announcement).await?;

        if !self.ensure_cubes(session).await? {
            return Ok(self.unless_cancelled(DispatchOutcome::CubesMissing));
        }

        let handed = self
            .hand_over(
                CubeRole::Medicine,
                &fix,
                event,
                "Here is your medicine. Please take it.",
                "Please take your medicine.",
            )
            .await?;
        if handed == TapOutcome::Cancelled {
            return Ok(DispatchOutcome::Cancelled);
        }

        if session.record_medicine_delivery() {
            warn!("medicine supply exhausted");
            self.notify(
                "Medicine out of stock",
                &format!(
                    "The medicine supply for {} has run out. Please restock the medicine locker.",
                    self.user()
                ),
            )
            .await;
        }
        if self.cancel.is_cancelled() {
            return Ok(DispatchOutcome::Cancelled);
        }

        self.device.play_reaction(Reaction::Thinking).await?;
        self.device
            .say("Sorry, I forgot to bring you the water. I am going to get it for you.")
            .await?;
        let handed = self
            .hand_over(
                CubeRole::Water,
                &fix,
                event,
                "Sorry. Please have the water.",
                "Please take the water.",
            )
            .await?;
        if handed == TapOutcome::Cancelled {
            return Ok(DispatchOutcome::Cancelled);
        }

        Ok(DispatchOutcome::Delivered)
    }

    async fn deliver_kit(
        &self,
        session: &mut SessionState,
        event: &CalendarEvent,
        occasion: Occasion,
    ) -> Result<DispatchOutcome, DeviceError> {
        let Some(fix) = session.user.clone() else {
            return Ok(DispatchOutcome::UserUnknown);
        };

        self.device
            .say(&kit_announcement(occasion, non_empty(&event.location)))
            .await?;

        if !self.ensure_cubes(session).await? {
            return Ok(self.unless_cancelled(DispatchOutcome::CubesMissing));
        }

        let handed = self
            .hand_over(
                CubeRole::Kit,
                &fix,
                event,
                kit_handover(occasion),
                "Please take the kit along with you.",
            )
            .await?;
        Ok(match handed {
            TapOutcome::Tapped => DispatchOutcome::Delivered,
            TapOutcome::Cancelled => DispatchOutcome::Cancelled,
        })
    }

    fn unless_cancelled(&self, outcome: DispatchOutcome) -> DispatchOutcome {
        if self.cancel.is_cancelled() {
            DispatchOutcome::Cancelled
        } else {
            outcome
        }
    }

    /// Runs the cube search at most once per session. A cancelled search decides nothing.
    async fn ensure_cubes(&self, session: &mut SessionState) -> Result<bool, DeviceError> {
        match session.cubes {
            CubeAvailability::Located => return Ok(true),
            CubeAvailability::Missing => {
                info!("cubes already missing this session; skipping delivery");
                return Ok(false);
            }
            CubeAvailability::Unknown => {}
        }

        let located = CubeLocator::new(self.device.as_ref(), &self.settings.timing)
            .with_cancellation(&self.cancel)
            .locate_fixed_count()
            .await?;
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        if located.is_some() {
            session.cubes = CubeAvailability::Located;
            return Ok(true);
        }

        session.cubes = CubeAvailability::Missing;
        self.device.play_reaction(Reaction::Wondering).await?;
        self.device
            .say("I am unable to find the medicines in the locker. I will send an email to the supervisor regarding this.")
            .await?;
        self.notify(
            "Medicine cubes not found",
            &format!(
                "Cozmo could not find the medicine, kit and water cubes while caring for {}. Please check the locker.",
                self.user()
            ),
        )
        .await;
        Ok(false)
    }

    /// Lights, carries and drops one cube, then waits for the user's tap.
    async fn hand_over(
        &self,
        role: CubeRole,
        fix: &FaceFix,
        event: &CalendarEvent,
        announcement: &str,
        prompt: &str,
    ) -> Result<TapOutcome, DeviceError> {
        if self.cancel.is_cancelled() {
            info!(cube = %role, "hand-over skipped; session cancelled");
            return Ok(TapOutcome::Cancelled);
        }
        let cube = role.cube();
        self.device.set_light(cube, role.light()).await?;
        self.carry(cube, &fix.approach).await?;
        self.device.say(announcement).await?;

        let outcome = TapWaiter::new(self.device.as_ref(), &self.settings.timing)
            .wait_for_tap(cube, prompt, &self.cancel)
            .await?;
        self.device.set_light(cube, LightColor::Off).await?;

        info!(cube = %role, ?outcome, "cube handed over");
        self.log_delivery(role, event, &fix.approach, outcome);
        Ok(outcome)
    }

    async fn carry(&self, cube: CubeRef, target: &Pose) -> Result<(), DeviceError> {
        let retries = self.settings.timing.motion_retries;
        self.device.pickup(cube, retries).await?;
        self.device.go_to_pose(target, retries).await?;
        self.device.place_on_ground(cube, retries).await?;
        self.device.play_reaction(Reaction::Amazed).await
    }

    /// Fire-and-forget: failures are logged, never returned.
    async fn notify(&self, subject: &str, body: &str) {
        if let Err(e) = self.notifier.send_notification(subject, body).await {
            warn!(subject, error = %e, "notification not sent");
        }
    }

    fn log_delivery(&self, role: CubeRole, event: &CalendarEvent, target: &Pose, outcome: TapOutcome) {
        let Some(journal) = &self.journal else {
            return;
        };
        let record = DeliveryRecord {
            timestamp: Utc::now().timestamp().max(0) as u64,
            cube: role,
            event_summary: event.summary.clone(),
            target: *target,
            status: match outcome {
                TapOutcome::Tapped => DeliveryStatus::Acknowledged,
                TapOutcome::Cancelled => DeliveryStatus::Abandoned,
            },
        };
        if let Err(e) = journal.record(&record) {
            warn!(error = %e, "failed to journal delivery");
        }
    }
}
