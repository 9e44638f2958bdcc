//! A stand-in UR controller serving the realtime interface.
//!
//! Every client gets the full realtime frame at the configured rate and may
//! send script lines back. `movej` and `stopj` drive the shared arm; every
//! line is answered with a short text reply on the same socket, the way a
//! controller interleaves text with binary frames.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use ur_fleet::realtime::{JointMode, ProgramState, RealtimeRecord, RobotMode, SafetyMode};

use crate::motion::{parse_movej, JointMotion};

pub const DEFAULT_RATE_HZ: u32 = 125;

#[derive(Debug)]
struct ArmState {
    motion: JointMotion,
    last_step: Instant,
}

#[derive(Debug)]
pub struct SimulatedController {
    period: Duration,
    started: Instant,
    arm: Mutex<ArmState>,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_HZ)
    }
}

impl SimulatedController {
    pub fn new(rate_hz: u32) -> Self {
        let now = Instant::now();
        Self {
            period: Duration::from_secs_f64(1.0 / rate_hz.max(1) as f64),
            started: now,
            arm: Mutex::new(ArmState {
                motion: JointMotion::default(),
                last_step: now,
            }),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Advances the arm to now and returns the frame a controller would send.
    pub async fn snapshot(&self) -> RealtimeRecord {
        let mut arm = self.arm.lock().await;
        let now = Instant::now();
        let dt = now.duration_since(arm.last_step).as_secs_f64();
        arm.motion.step(dt);
        arm.last_step = now;
        build_record(&arm.motion, now.duration_since(self.started).as_secs_f64())
    }

    /// Applies one script line and returns the text reply.
    pub async fn execute(&self, line: &str) -> String {
        let line = line.trim();
        if line.starts_with("movej(") {
            return match parse_movej(line) {
                Some((target, speed)) => {
                    self.arm.lock().await.motion.move_to(target, speed);
                    format!("ack: {}\n", line)
                }
                None => format!("error: malformed movej: {}\n", line),
            };
        }
        if line.starts_with("stopj(") {
            self.arm.lock().await.motion.stop();
            return format!("ack: {}\n", line);
        }
        format!("error: unsupported instruction: {}\n", line)
    }

    /// Accepts clients forever, one task each.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!(
            "simulated controller listening on {} ({:?} frame period)",
            listener.local_addr()?,
            self.period
        );
        loop {
            let (socket, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            info!("client {} connected", addr);
            let controller = Arc::clone(&self);
            tokio::spawn(async move {
                match controller.handle_client(socket).await {
                    Ok(()) => info!("client {} disconnected", addr),
                    Err(e) => warn!("client {} dropped: {}", addr, e),
                }
            });
        }
    }

    async fn handle_client(&self, socket: TcpStream) -> io::Result<()> {
        socket.set_nodelay(true)?;
        let (mut reader, mut writer) = socket.into_split();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buffer = vec![0u8; 1024];
        let mut pending = Vec::new();

        loop {
            tokio::select! {
                read = reader.read(&mut buffer) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    pending.extend_from_slice(&buffer[..n]);
                    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line);
                        debug!("script: {}", line.trim_end());
                        let reply = self.execute(&line).await;
                        writer.write_all(reply.as_bytes()).await?;
                    }
                }
                _ = ticker.tick() => {
                    let frame = self.snapshot().await.encode();
                    writer.write_all(&frame).await?;
                }
            }
        }
    }
}

/// Fills a realtime record for a powered, running arm at `elapsed` seconds.
pub fn build_record(motion: &JointMotion, elapsed: f64) -> RealtimeRecord {
    let mut record = RealtimeRecord::default();
    record.time = elapsed;
    record.controller_timer = elapsed;
    record.q_actual = motion.position;
    record.q_target = motion.target.unwrap_or(motion.position);
    record.qd_actual = motion.velocity;
    record.qd_target = motion.velocity;
    record.robot_mode = RobotMode::Running as i8 as f64;
    record.safety_mode = SafetyMode::Normal as u8 as f64;
    record.joint_modes = [JointMode::Running as u8 as f64; 6];
    let program = if motion.is_moving() {
        ProgramState::Playing
    } else {
        ProgramState::Stopped
    };
    record.program_state = program as u8 as f64;
    record.speed_scaling = 1.0;
    record.v_main = 48.0;
    record.v_robot = 48.0;
    record.i_robot = 0.4 + 0.1 * (elapsed * 0.5).sin();
    record.v_actual = [48.0; 6];
    for (joint, temperature) in record.motor_temperatures.iter_mut().enumerate() {
        *temperature = 32.0 + 1.5 * (elapsed * 0.1 + joint as f64).sin();
    }
    record.tool_accelerometer = [0.0, 0.0, 9.81];
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_record_reports_running_arm() {
        let record = build_record(&JointMotion::default(), 1.5);
        assert_eq!(record.time, 1.5);
        assert_eq!(record.robot_mode(), Some(RobotMode::Running));
        assert_eq!(record.safety_mode(), Some(SafetyMode::Normal));
        assert_eq!(record.program_state(), Some(ProgramState::Stopped));
        assert_eq!(record.joint_modes(), [Some(JointMode::Running); 6]);
        assert_eq!(RealtimeRecord::decode(&record.encode()), Ok(record));
    }

    #[tokio::test]
    async fn test_execute_replies() {
        let controller = SimulatedController::default();
        assert_eq!(
            controller.execute("movej([0,0,0,0,0,0], a=1.2, v=0.5)\n").await,
            "ack: movej([0,0,0,0,0,0], a=1.2, v=0.5)\n"
        );
        assert!(controller.snapshot().await.program_state() == Some(ProgramState::Playing));
        assert_eq!(controller.execute("stopj(2)").await, "ack: stopj(2)\n");
        assert!(controller.execute("movej(oops)").await.starts_with("error: malformed"));
        assert!(controller.execute("set_digital_out(0, True)").await.starts_with("error: unsupported"));
    }
}
