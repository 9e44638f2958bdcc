use int_enum::IntEnum;
use serde::{Deserialize, Serialize};

#[repr(i8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum RobotMode {
    NoController = -1,
    Disconnected = 0,
    ConfirmSafety = 1,
    Booting = 2,
    PowerOff = 3,
    PowerOn = 4,
    Idle = 5,
    Backdrive = 6,
    Running = 7,
    UpdatingFirmware = 8,
}

#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum SafetyMode {
    Normal = 1,
    Reduced = 2,
    ProtectiveStop = 3,
    Recovery = 4,
    SafeguardStop = 5,
    SystemEmergencyStop = 6,
    RobotEmergencyStop = 7,
    Violation = 8,
    Fault = 9,
    ValidateJointId = 10,
    UndefinedSafetyMode = 11,
    AutomaticModeSafeguardStop = 12,
    SystemThreePositionEnablingStop = 13,
}

#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum JointMode {
    ShuttingDown = 236,
    PartDCalibration = 237,
    Backdrive = 238,
    PowerOff = 239,
    ReadyForPowerOff = 240,
    NotResponding = 245,
    MotorInitialisation = 246,
    Booting = 247,
    PartDCalibrationError = 248,
    Bootloader = 249,
    Calibration = 250,
    Violation = 251,
    Fault = 252,
    Running = 253,
    Idle = 255,
}

#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum ProgramState {
    Stopping = 0,
    Stopped = 1,
    Playing = 2,
    Pausing = 3,
    Paused = 4,
    Resuming = 5,
}
