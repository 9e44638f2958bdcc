use super::{FrameReader, FrameWriter, JointMode, ProgramState, RobotMode, SafetyMode};
use crate::DecodeError;

/// Size in bytes of a realtime frame, including the 4-byte size prefix.
pub const FRAME_SIZE: usize = 4 + RealtimeRecord::FIELD_COUNT * 8;

realtime_layout! {
    time: f64,
    q_target: [6],
    qd_target: [6],
    qdd_target: [6],
    i_target: [6],
    m_target: [6],
    q_actual: [6],
    qd_actual: [6],
    i_actual: [6],
    i_control: [6],
    tool_vector_actual: [6],
    tcp_speed_actual: [6],
    tcp_force: [6],
    tool_vector_target: [6],
    tcp_speed_target: [6],
    /// Bitmask of digital inputs, carried as a double.
    digital_input_bits: f64,
    motor_temperatures: [6],
    controller_timer: f64,
    test_value: f64,
    robot_mode: f64,
    joint_modes: [6],
    safety_mode: f64,
    reserved_1: [6],
    tool_accelerometer: [3],
    reserved_2: [6],
    speed_scaling: f64,
    linear_momentum_norm: f64,
    software_only_1: f64,
    software_only_2: f64,
    v_main: f64,
    v_robot: f64,
    i_robot: f64,
    v_actual: [6],
    /// Bitmask of digital outputs, carried as a double.
    digital_outputs: f64,
    program_state: f64,
    elbow_position: [3],
    elbow_velocity: [3],
    safety_status: f64,
    software_only_3: f64,
    software_only_4: f64,
    software_only_5: f64,
    payload_mass: f64,
    payload_cog: [3],
    payload_inertia: [6],
}

impl RealtimeRecord {
    /// Decodes one frame. The declared size must cover the whole layout and
    /// must not exceed the bytes available; trailing bytes beyond the layout
    /// (newer controller versions) are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = FrameReader::new(frame);
        let message_size = reader.u32()?;
        let declared = message_size as usize;
        if declared > frame.len() {
            return Err(DecodeError::SizeMismatch {
                declared,
                available: frame.len(),
            });
        }
        if declared < FRAME_SIZE {
            return Err(DecodeError::Truncated {
                needed: FRAME_SIZE,
                available: declared,
            });
        }
        Self::read_fields(message_size, &mut reader)
    }

    /// Encodes the record as a `FRAME_SIZE` frame. The size prefix is always
    /// written as `FRAME_SIZE`.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = FrameWriter::with_capacity(FRAME_SIZE);
        writer.u32(FRAME_SIZE as u32);
        self.write_fields(&mut writer);
        writer.into_bytes()
    }

    pub fn robot_mode(&self) -> Option<RobotMode> {
        whole_number(self.robot_mode)
            .and_then(|n| i8::try_from(n).ok())
            .and_then(|n| RobotMode::try_from(n).ok())
    }

    pub fn safety_mode(&self) -> Option<SafetyMode> {
        whole_number(self.safety_mode)
            .and_then(|n| u8::try_from(n).ok())
            .and_then(|n| SafetyMode::try_from(n).ok())
    }

    pub fn program_state(&self) -> Option<ProgramState> {
        whole_number(self.program_state)
            .and_then(|n| u8::try_from(n).ok())
            .and_then(|n| ProgramState::try_from(n).ok())
    }

    pub fn joint_modes(&self) -> [Option<JointMode>; 6] {
        self.joint_modes.map(|mode| {
            whole_number(mode)
                .and_then(|n| u8::try_from(n).ok())
                .and_then(|n| JointMode::try_from(n).ok())
        })
    }

    pub fn digital_input(&self, index: u32) -> bool {
        bit_set(self.digital_input_bits, index)
    }

    pub fn digital_output(&self, index: u32) -> bool {
        bit_set(self.digital_outputs, index)
    }
}

fn whole_number(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

fn bit_set(mask: f64, index: u32) -> bool {
    if index >= 64 || !mask.is_finite() || mask < 0.0 {
        return false;
    }
    (mask as u64 >> index) & 1 == 1
}
