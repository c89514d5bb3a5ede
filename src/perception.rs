//! Finding the user, confirming the cubes, and waiting for a hand-off tap.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TimingSettings;
use crate::device::{BehaviorId, BehaviorKind, CubeRef, DetectedFace, DeviceError, Reaction, RobotDevice};
use crate::geometry::{approach_pose, Pose};

/// A recognised user and the pose to deliver cubes to.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceFix {
    pub approach: Pose,
    pub face: DetectedFace,
}

async fn release(device: &dyn RobotDevice, behavior: BehaviorId, kind: BehaviorKind) {
    if let Err(e) = device.stop_behavior(behavior).await {
        warn!(?kind, error = %e, "failed to stop behavior");
    }
}

/// Polls the visible faces for a named user.
pub struct FaceLocator<'a> {
    device: &'a dyn RobotDevice,
    poll_interval: Duration,
    standoff_mm: f32,
    turn_retries: u32,
    cancel: CancellationToken,
}

impl<'a> FaceLocator<'a> {
    pub fn new(device: &'a dyn RobotDevice, timing: &TimingSettings) -> Self {
        Self {
            device,
            poll_interval: timing.face_poll_interval(),
            standoff_mm: timing.standoff_mm,
            turn_retries: timing.motion_retries,
            cancel: CancellationToken::new(),
        }
    }

    /// Ends the search early, as not found, once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: &CancellationToken) -> Self {
        self.cancel = cancel.clone();
        self
    }

    /// Searches for `name` until found or `timeout` elapses.
    ///
    /// On success the robot has turned toward the face. The find-faces behavior is stopped
    /// on every path.
    pub async fn locate(&self, name: &str, timeout: Duration) -> Result<Option<FaceFix>, DeviceError> {
        let deadline = Instant::now() + timeout;
        let behavior = self.device.start_behavior(BehaviorKind::FindFaces).await?;
        let found = self.poll_until(name, deadline).await;
        release(self.device, behavior, BehaviorKind::FindFaces).await;

        let Some(fix) = found else {
            if self.cancel.is_cancelled() {
                info!(user = name, "face search cancelled");
                return Ok(None);
            }
            info!(user = name, timeout_secs = timeout.as_secs_f32(), "face not found");
            return Ok(None);
        };

        info!(
            user = name,
            x = fix.approach.position.x(),
            y = fix.approach.position.y(),
            "face found; approach pose computed"
        );
        self.device.turn_toward(&fix.face, self.turn_retries).await?;
        Ok(Some(fix))
    }

    async fn poll_until(&self, name: &str, deadline: Instant) -> Option<FaceFix> {
        loop {
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                polled = self.device.visible_faces() => polled,
            };
            match polled {
                Ok(faces) => {
                    if let Some(face) = faces.into_iter().find(|f| f.is_named(name)) {
                        match self.fix_for(face).await {
                            Ok(fix) => return Some(fix),
                            Err(reason) => debug!(%reason, "face seen but unusable; still polling"),
                        }
                    }
                }
                Err(e) if e.is_transient() => debug!(error = %e, "face poll failed; retrying"),
                Err(e) => {
                    warn!(error = %e, "face detection source failed; ending search");
                    return None;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = sleep_until((now + self.poll_interval).min(deadline)) => {}
            }
        }
    }

    async fn fix_for(&self, face: DetectedFace) -> Result<FaceFix, String> {
        let robot = self.device.robot_pose().await.map_err(|e| e.to_string())?;
        let approach =
            approach_pose(&robot, &face.pose, self.standoff_mm).map_err(|e| e.to_string())?;
        Ok(FaceFix { approach, face })
    }
}

/// Looks around until the expected number of cubes has been seen.
pub struct CubeLocator<'a> {
    device: &'a dyn RobotDevice,
    count: usize,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<'a> CubeLocator<'a> {
    pub fn new(device: &'a dyn RobotDevice, timing: &TimingSettings) -> Self {
        Self {
            device,
            count: timing.cube_count,
            timeout: Duration::from_secs(timing.cube_search_timeout_secs),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: &CancellationToken) -> Self {
        self.cancel = cancel.clone();
        self
    }

    /// Returns the observed cubes, or `None` if fewer were seen before the timeout.
    ///
    /// A failing search counts as not found; only starting the behavior can error.
    pub async fn locate_fixed_count(&self) -> Result<Option<Vec<CubeRef>>, DeviceError> {
        let behavior = self.device.start_behavior(BehaviorKind::LookAroundInPlace).await?;
        let observed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("cube search cancelled");
                Ok(None)
            }
            observed = self.device.wait_for_cubes(self.count, self.timeout) => observed,
        };
        release(self.device, behavior, BehaviorKind::LookAroundInPlace).await;

        match observed {
            Ok(Some(cubes)) if cubes.len() >= self.count => {
                info!(count = cubes.len(), "cubes located");
                Ok(Some(cubes))
            }
            Ok(_) => {
                info!(expected = self.count, "cubes not located");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "cube search failed; treating cubes as missing");
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    Tapped,
    Cancelled,
}

/// Blocks until the user taps a delivered cube, nagging after every quiet attempt.
pub struct TapWaiter<'a> {
    device: &'a dyn RobotDevice,
    attempt_timeout: Duration,
}

impl<'a> TapWaiter<'a> {
    pub fn new(device: &'a dyn RobotDevice, timing: &TimingSettings) -> Self {
        Self {
            device,
            attempt_timeout: Duration::from_secs(timing.tap_timeout_secs),
        }
    }

    /// Has no overall deadline; only a tap or `cancel` ends the wait.
    pub async fn wait_for_tap(
        &self,
        cube: CubeRef,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<TapOutcome, DeviceError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(?cube, attempts, "tap wait cancelled");
                    return Ok(TapOutcome::Cancelled);
                }
                polled = self.device.wait_for_tap(cube, self.attempt_timeout) => polled,
            };

            match polled {
                Ok(true) => {
                    debug!(?cube, attempts, "cube tapped");
                    return Ok(TapOutcome::Tapped);
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => debug!(error = %e, "tap wait failed; retrying"),
                Err(e) => return Err(e),
            }

            self.device.play_reaction(Reaction::Frustrated).await?;
            self.device.say(prompt).await?;
        }
    }
}
