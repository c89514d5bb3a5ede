//! [`RobotDevice`] over a local socket to the SDK bridge process.
//!
//! The bridge owns the robot connection. Requests and replies are single JSON lines:
//!
//! ```text
//! -> {"id":7,"cmd":"say","args":{"text":"Hello","duration_scalar":0.65}}
//! <- {"id":7,"ok":true,"result":null}
//! <- {"id":8,"ok":false,"error":{"kind":"busy","message":"animation in progress"}}
//! ```
//!
//! Calls are strictly sequential: one request is outstanding at a time.

use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use interprocess::local_socket::LocalSocketStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::device::{
    BehaviorId, BehaviorKind, CubeRef, DetectedFace, DeviceError, LightColor, Reaction, RobotDevice,
};
use crate::geometry::Pose;

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", content = "args", rename_all = "snake_case")]
enum Command<'a> {
    StartBehavior { behavior: BehaviorKind },
    StopBehavior { id: BehaviorId },
    VisibleFaces,
    RobotPose,
    TurnToward { face_id: i32, retries: u32 },
    WaitForCubes { count: usize, timeout_secs: f64 },
    Pickup { cube: CubeRef, retries: u32 },
    GoToPose { pose: &'a Pose, retries: u32 },
    PlaceOnGround { cube: CubeRef, retries: u32 },
    PlayReaction { trigger: Reaction },
    Say { text: &'a str, duration_scalar: f32 },
    SetLight { cube: CubeRef, color: LightColor },
    WaitForTap { cube: CubeRef, timeout_secs: f64 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FaultKind {
    Timeout,
    Busy,
    Rejected,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Fault {
    kind: FaultKind,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<Fault>,
}

fn encode(id: u64, command: &Command<'_>) -> Result<String, DeviceError> {
    let mut value =
        serde_json::to_value(command).map_err(|e| DeviceError::Protocol(e.to_string()))?;
    if let serde_json::Value::Object(ref mut m) = value {
        m.insert("id".to_string(), serde_json::Value::Number(id.into()));
    }
    let mut line = value.to_string();
    line.push('\n');
    Ok(line)
}

fn decode<T: DeserializeOwned>(id: u64, line: &str) -> Result<T, DeviceError> {
    let reply: Reply =
        serde_json::from_str(line.trim_end()).map_err(|e| DeviceError::Protocol(e.to_string()))?;
    if reply.id != id {
        return Err(DeviceError::Protocol(format!(
            "reply id {} does not match request {id}",
            reply.id
        )));
    }

    if !reply.ok {
        let fault = reply.error.unwrap_or(Fault {
            kind: FaultKind::Other,
            message: "bridge reported failure without details".to_string(),
        });
        return Err(match fault.kind {
            FaultKind::Timeout => DeviceError::Timeout,
            FaultKind::Busy => DeviceError::Busy(fault.message),
            FaultKind::Rejected => DeviceError::Rejected(fault.message),
            FaultKind::Other => DeviceError::Protocol(fault.message),
        });
    }

    serde_json::from_value(reply.result).map_err(|e| DeviceError::Protocol(e.to_string()))
}

type Connection = Mutex<BufReader<LocalSocketStream>>;

fn exchange(conn: &Connection, line: &str) -> Result<String, DeviceError> {
    let mut conn = conn
        .lock()
        .map_err(|_| DeviceError::Protocol("bridge connection poisoned".to_string()))?;

    let stream = conn.get_mut();
    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(DeviceError::Disconnected)?;

    let mut reply = String::new();
    if conn.read_line(&mut reply).map_err(DeviceError::Disconnected)? == 0 {
        return Err(DeviceError::Disconnected(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "bridge closed the connection",
        )));
    }
    Ok(reply)
}

/// Client side of the bridge socket.
pub struct BridgeDevice {
    conn: Arc<Connection>,
    next_id: AtomicU64,
    speech_duration_scalar: f32,
}

impl std::fmt::Debug for BridgeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDevice")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("speech_duration_scalar", &self.speech_duration_scalar)
            .finish()
    }
}

impl BridgeDevice {
    pub fn connect(socket: &str, speech_duration_scalar: f32) -> Result<Self, DeviceError> {
        let stream = LocalSocketStream::connect(socket).map_err(DeviceError::Disconnected)?;
        Ok(Self::from_stream(stream, speech_duration_scalar))
    }

    pub fn from_stream(stream: LocalSocketStream, speech_duration_scalar: f32) -> Self {
        Self {
            conn: Arc::new(Mutex::new(BufReader::new(stream))),
            next_id: AtomicU64::new(1),
            speech_duration_scalar,
        }
    }

    #[instrument(level = "trace", skip(self))]
    async fn call<T: DeserializeOwned>(&self, command: Command<'_>) -> Result<T, DeviceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = encode(id, &command)?;
        debug!(id, request = line.trim_end(), "bridge request");

        let conn = Arc::clone(&self.conn);
        let reply = tokio::task::spawn_blocking(move || exchange(&conn, &line))
            .await
            .map_err(|e| DeviceError::Protocol(format!("bridge worker failed: {e}")))??;
        decode(id, &reply)
    }
}

#[async_trait]
impl RobotDevice for BridgeDevice {
    async fn start_behavior(&self, kind: BehaviorKind) -> Result<BehaviorId, DeviceError> {
        self.call(Command::StartBehavior { behavior: kind }).await
    }

    async fn stop_behavior(&self, id: BehaviorId) -> Result<(), DeviceError> {
        self.call(Command::StopBehavior { id }).await
    }

    async fn visible_faces(&self) -> Result<Vec<DetectedFace>, DeviceError> {
        self.call(Command::VisibleFaces).await
    }

    async fn robot_pose(&self) -> Result<Pose, DeviceError> {
        self.call(Command::RobotPose).await
    }

    async fn turn_toward(&self, face: &DetectedFace, retries: u32) -> Result<(), DeviceError> {
        self.call(Command::TurnToward {
            face_id: face.face_id,
            retries,
        })
        .await
    }

    async fn wait_for_cubes(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Option<Vec<CubeRef>>, DeviceError> {
        self.call(Command::WaitForCubes {
            count,
            timeout_secs: timeout.as_secs_f64(),
        })
        .await
    }

    async fn pickup(&self, cube: CubeRef, retries: u32) -> Result<(), DeviceError> {
        self.call(Command::Pickup { cube, retries }).await
    }

    async fn go_to_pose(&self, pose: &Pose, retries: u32) -> Result<(), DeviceError> {
        self.call(Command::GoToPose { pose, retries }).await
    }

    async fn place_on_ground(&self, cube: CubeRef, retries: u32) -> Result<(), DeviceError> {
        self.call(Command::PlaceOnGround { cube, retries }).await
    }

    async fn play_reaction(&self, reaction: Reaction) -> Result<(), DeviceError> {
        self.call(Command::PlayReaction { trigger: reaction }).await
    }

    async fn say(&self, text: &str) -> Result<(), DeviceError> {
        self.call(Command::Say {
            text,
            duration_scalar: self.speech_duration_scalar,
        })
        .await
    }

    async fn set_light(&self, cube: CubeRef, color: LightColor) -> Result<(), DeviceError> {
        self.call(Command::SetLight { cube, color }).await
    }

    async fn wait_for_tap(&self, cube: CubeRef, timeout: Duration) -> Result<bool, DeviceError> {
        self.call(Command::WaitForTap {
            cube,
            timeout_secs: timeout.as_secs_f64(),
        })
        .await
    }
}
