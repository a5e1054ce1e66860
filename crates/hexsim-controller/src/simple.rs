//! A single-axis reference device.
//!
//! Moves a position toward a commanded target at a configurable maximum
//! velocity. Used by the command line runner and as the device behind the
//! engine's own tests.

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use hexsim_protocol::{
    ApplicationStatus, Command, ControllerState, EnabledSubstate, ProtocolError, WireRecord,
    CMD_SET_ENABLED_SUBSTATE,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::ControllerCore;
use crate::device::{Device, DeviceConfig, DeviceTelemetry};
use crate::dispatch::{CommandTable, DispatchKey};
use crate::error::{CommandError, DispatchError};
use crate::state::StateMachine;

/// MOVE: `param1` is the target position.
pub const CMD_MOVE: u32 = 4;
/// CONFIG_VELOCITY: `param1` is the new maximum velocity.
pub const CMD_CONFIG_VELOCITY: u32 = 5;
/// SET_ENABLED_SUBSTATE selector for STOP.
pub const SUBSTATE_STOP: i32 = 3;

// ============================================================================
// Settings
// ============================================================================

/// Start-up parameters of the simple device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleSettings {
    pub min_position: f64,
    pub max_position: f64,
    pub max_velocity: f64,
    /// Initial position, also the initial commanded position.
    pub initial_position: f64,
    /// Standard deviation of Gaussian noise added to the reported position. 0 disables noise.
    pub noise_std_dev: f64,
    /// Noise seed. Without one the noise is seeded from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimpleSettings {
    fn default() -> Self {
        SimpleSettings {
            min_position: -25.0,
            max_position: 25.0,
            max_velocity: 47.0,
            initial_position: 0.0,
            noise_std_dev: 0.0,
            seed: None,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Config record.
///
/// ```text
/// min_position:f64 | max_position:f64 | max_velocity:f64 | drives_enabled:u8   (25 bytes)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleConfig {
    pub min_position: f64,
    pub max_position: f64,
    pub max_velocity: f64,
    pub drives_enabled: bool,
}

impl WireRecord for SimpleConfig {
    const SIZE: usize = 25;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.min_position);
        buf.put_f64_le(self.max_position);
        buf.put_f64_le(self.max_velocity);
        buf.put_u8(self.drives_enabled as u8);
    }

    fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(SimpleConfig {
            min_position: buf.get_f64_le(),
            max_position: buf.get_f64_le(),
            max_velocity: buf.get_f64_le(),
            drives_enabled: buf.get_u8() != 0,
        })
    }
}

impl DeviceConfig for SimpleConfig {
    fn drives_enabled(&self) -> bool {
        self.drives_enabled
    }

    fn set_drives_enabled(&mut self, enabled: bool) {
        self.drives_enabled = enabled;
    }
}

/// Telemetry record.
///
/// ```text
/// application_status:u32 | state:u32 | enabled_substate:u32
///   | curr_position:f64 | cmd_position:f64                                     (28 bytes)
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleTelemetry {
    pub application_status: u32,
    pub state: u32,
    pub enabled_substate: u32,
    pub curr_position: f64,
    pub cmd_position: f64,
}

impl SimpleTelemetry {
    pub fn controller_state(&self) -> Result<ControllerState, ProtocolError> {
        ControllerState::try_from(self.state)
    }

    pub fn substate(&self) -> Result<Option<EnabledSubstate>, ProtocolError> {
        EnabledSubstate::from_wire(self.enabled_substate)
    }
}

impl WireRecord for SimpleTelemetry {
    const SIZE: usize = 28;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.application_status);
        buf.put_u32_le(self.state);
        buf.put_u32_le(self.enabled_substate);
        buf.put_f64_le(self.curr_position);
        buf.put_f64_le(self.cmd_position);
    }

    fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(SimpleTelemetry {
            application_status: buf.get_u32_le(),
            state: buf.get_u32_le(),
            enabled_substate: buf.get_u32_le(),
            curr_position: buf.get_f64_le(),
            cmd_position: buf.get_f64_le(),
        })
    }
}

impl DeviceTelemetry for SimpleTelemetry {
    fn set_controller_state(&mut self, state: ControllerState, substate: Option<EnabledSubstate>) {
        self.state = state.wire_value();
        self.enabled_substate = EnabledSubstate::wire_value(substate);
    }

    fn application_status(&self) -> ApplicationStatus {
        ApplicationStatus(self.application_status)
    }

    fn set_application_status(&mut self, status: ApplicationStatus) {
        self.application_status = status.0;
    }
}

// ============================================================================
// Device
// ============================================================================

/// Seeded Gaussian measurement noise.
struct PositionNoise {
    rng: ChaCha8Rng,
    normal: Normal<f64>,
}

impl PositionNoise {
    fn new(std_dev: f64, seed: Option<u64>) -> Option<Self> {
        if std_dev == 0.0 {
            return None;
        }
        let normal = match Normal::new(0.0, std_dev) {
            Ok(normal) => normal,
            Err(e) => {
                warn!(std_dev, error = %e, "invalid noise standard deviation; noise disabled");
                return None;
            }
        };
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Some(PositionNoise { rng, normal })
    }

    fn sample(&mut self) -> f64 {
        self.normal.sample(&mut self.rng)
    }
}

pub struct SimpleDevice {
    /// True (noise-free) position.
    position: f64,
    last_update: Option<DateTime<Utc>>,
    last_command: Option<u32>,
    noise: Option<PositionNoise>,
}

impl SimpleDevice {
    pub fn new(settings: &SimpleSettings) -> Self {
        SimpleDevice {
            position: settings.initial_position,
            last_update: None,
            last_command: None,
            noise: PositionNoise::new(settings.noise_std_dev, settings.seed),
        }
    }

    /// Device plus its initial config and telemetry.
    pub fn parts(settings: &SimpleSettings) -> (SimpleDevice, SimpleConfig, SimpleTelemetry) {
        let config = SimpleConfig {
            min_position: settings.min_position,
            max_position: settings.max_position,
            max_velocity: settings.max_velocity,
            drives_enabled: false,
        };
        let telemetry = SimpleTelemetry {
            curr_position: settings.initial_position,
            cmd_position: settings.initial_position,
            application_status: ApplicationStatus::MOVE_COMPLETE,
            ..Default::default()
        };
        (Self::new(settings), config, telemetry)
    }

    /// A ready-made core around a new device.
    pub fn core(settings: &SimpleSettings, initial_state: ControllerState) -> ControllerCore<Self> {
        let (device, config, telemetry) = Self::parts(settings);
        ControllerCore::new(device, config, telemetry, initial_state)
    }

    /// True position, without measurement noise.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Time of the last telemetry update, if any.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Code of the last command that succeeded.
    pub fn last_command(&self) -> Option<u32> {
        self.last_command
    }

    /// Advance the position toward `target` by at most `max_step`. Returns true on arrival.
    fn step_toward(&mut self, target: f64, max_step: f64) -> bool {
        let remaining = target - self.position;
        if remaining.abs() <= max_step {
            self.position = target;
            true
        } else {
            self.position += max_step.copysign(remaining);
            false
        }
    }
}

impl Device for SimpleDevice {
    type Config = SimpleConfig;
    type Telemetry = SimpleTelemetry;

    const NAME: &'static str = "simple";

    fn register_commands(table: &mut CommandTable<Self>) -> Result<(), DispatchError> {
        table.register(DispatchKey::code(CMD_MOVE), "move", do_move)?;
        table.register(
            DispatchKey::code(CMD_CONFIG_VELOCITY),
            "config_velocity",
            do_config_velocity,
        )?;
        table.register(
            DispatchKey::with_sub(CMD_SET_ENABLED_SUBSTATE, SUBSTATE_STOP),
            "stop",
            do_stop,
        )?;
        Ok(())
    }

    fn update_telemetry(
        &mut self,
        telemetry: &mut SimpleTelemetry,
        config: &SimpleConfig,
        state: &mut StateMachine,
        now: DateTime<Utc>,
    ) {
        // A negative interval (clock stepped back) counts as no time passing
        let dt = self
            .last_update
            .and_then(|last| (now - last).to_std().ok())
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());
        self.last_update = Some(now);

        let mut status = ApplicationStatus(telemetry.application_status);
        if state.enabled_substate() == Some(EnabledSubstate::MovingPointToPoint)
            && self.step_toward(telemetry.cmd_position, config.max_velocity * dt)
        {
            debug!(position = self.position, "move complete");
            if let Err(e) = state.set_enabled_substate(EnabledSubstate::Stationary) {
                warn!(error = %e, "could not report move complete");
            }
            status = status.with(ApplicationStatus::MOVE_COMPLETE, true);
        }

        let noise = self.noise.as_mut().map_or(0.0, PositionNoise::sample);
        telemetry.curr_position = self.position + noise;
        telemetry.application_status = status
            .with(ApplicationStatus::DRIVES_ENABLED, config.drives_enabled)
            .0;
    }

    fn end_run_command(&mut self, command: &Command, _telemetry: &mut SimpleTelemetry) {
        self.last_command = Some(command.code);
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// MOVE: start a point to point move to `param1`.
fn do_move(
    core: &mut ControllerCore<SimpleDevice>,
    command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.state().assert_state(ControllerState::Enabled, None)?;
    let target = command.param1();
    let config = core.config();
    if !(config.min_position..=config.max_position).contains(&target) {
        return Err(CommandError::rejected(format!(
            "position={target} not in range [{}, {}]",
            config.min_position, config.max_position
        )));
    }
    let max_velocity = config.max_velocity;
    let delta = (target - core.device().position()).abs();

    let telemetry = core.telemetry_mut();
    telemetry.cmd_position = target;
    telemetry.application_status = ApplicationStatus(telemetry.application_status)
        .with(ApplicationStatus::MOVE_COMPLETE, delta == 0.0)
        .0;
    if delta == 0.0 {
        core.state_mut()
            .set_enabled_substate(EnabledSubstate::Stationary)?;
        return Ok(None);
    }
    core.state_mut()
        .set_enabled_substate(EnabledSubstate::MovingPointToPoint)?;
    Ok(Some(delta / max_velocity))
}

/// CONFIG_VELOCITY: set the maximum velocity to `param1`.
fn do_config_velocity(
    core: &mut ControllerCore<SimpleDevice>,
    command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.state().assert_state(ControllerState::Enabled, None)?;
    let velocity = command.param1();
    if !(velocity.is_finite() && velocity > 0.0) {
        return Err(CommandError::rejected(format!(
            "max_velocity={velocity}; must be > 0"
        )));
    }
    core.config_mut().max_velocity = velocity;
    core.request_config_publish();
    Ok(None)
}

/// SET_ENABLED_SUBSTATE/STOP: halt at the current position.
fn do_stop(
    core: &mut ControllerCore<SimpleDevice>,
    _command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.state().assert_state(ControllerState::Enabled, None)?;
    let position = core.device().position();
    core.telemetry_mut().cmd_position = position;
    core.state_mut()
        .set_enabled_substate(EnabledSubstate::Stationary)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TimeDelta;
    use hexsim_protocol::{decode_record, encode_record};

    fn enabled_core() -> ControllerCore<SimpleDevice> {
        SimpleDevice::core(&SimpleSettings::default(), ControllerState::Enabled)
    }

    fn tick(
        core: &mut ControllerCore<SimpleDevice>,
        state: &mut StateMachine,
        now: DateTime<Utc>,
    ) -> SimpleTelemetry {
        let mut telemetry = core.telemetry().clone();
        let config = core.config().clone();
        core.device_mut()
            .update_telemetry(&mut telemetry, &config, state, now);
        telemetry
    }

    #[test]
    fn test_record_sizes() {
        let config = SimpleConfig {
            min_position: -1.0,
            max_position: 1.0,
            max_velocity: 2.0,
            drives_enabled: true,
        };
        let bytes = encode_record(&config);
        assert_eq!(bytes.len(), SimpleConfig::SIZE);
        assert_eq!(bytes[24], 1);
        assert_eq!(decode_record::<SimpleConfig>(&mut &bytes[..]).unwrap(), config);

        let telemetry = SimpleTelemetry::default();
        assert_eq!(encode_record(&telemetry).len(), SimpleTelemetry::SIZE);
    }

    #[test]
    fn test_settings_yaml() {
        let settings: SimpleSettings = serde_yaml::from_str(
            "max_velocity: 10.0\nnoise_std_dev: 0.5\nseed: 7\n",
        )
        .unwrap();
        assert_eq!(settings.max_velocity, 10.0);
        assert_eq!(settings.seed, Some(7));
        // Unspecified fields keep their defaults
        assert_eq!(settings.min_position, -25.0);
        assert_eq!(settings.max_position, 25.0);
    }

    #[test]
    fn test_move_duration_and_substate() {
        let mut core = enabled_core();
        let duration = do_move(&mut core, &Command::new(CMD_MOVE, 1).with_param1(23.5)).unwrap();
        assert_eq!(duration, Some(0.5));
        assert_eq!(core.telemetry().cmd_position, 23.5);
        assert_eq!(
            core.state().enabled_substate(),
            Some(EnabledSubstate::MovingPointToPoint)
        );
        assert!(!ApplicationStatus(core.telemetry().application_status)
            .contains(ApplicationStatus::MOVE_COMPLETE));
    }

    #[test]
    fn test_move_rejections() {
        let mut core = enabled_core();
        for target in [25.5, -30.0, f64::NAN] {
            let err = do_move(&mut core, &Command::new(CMD_MOVE, 1).with_param1(target)).unwrap_err();
            assert!(matches!(err, CommandError::Rejected(_)));
        }
        assert_eq!(core.telemetry().cmd_position, 0.0);

        let mut standby = SimpleDevice::core(&SimpleSettings::default(), ControllerState::Standby);
        let err = do_move(&mut standby, &Command::new(CMD_MOVE, 1).with_param1(1.0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "state=STANDBY; must be ENABLED for this command."
        );
    }

    #[test]
    fn test_config_velocity() {
        let mut core = enabled_core();
        for bad in [0.0, -1.0, f64::INFINITY] {
            assert!(do_config_velocity(&mut core, &Command::new(CMD_CONFIG_VELOCITY, 1).with_param1(bad)).is_err());
        }
        assert!(!core.take_config_publish_request());

        do_config_velocity(&mut core, &Command::new(CMD_CONFIG_VELOCITY, 2).with_param1(5.0)).unwrap();
        assert_eq!(core.config().max_velocity, 5.0);
        assert!(core.take_config_publish_request());
    }

    #[test]
    fn test_motion_reaches_target() {
        let mut core = enabled_core();
        do_config_velocity(&mut core, &Command::new(CMD_CONFIG_VELOCITY, 1).with_param1(10.0)).unwrap();
        do_move(&mut core, &Command::new(CMD_MOVE, 2).with_param1(15.0)).unwrap();
        let mut state = core.state().clone();

        let t0 = Utc::now();
        tick(&mut core, &mut state, t0);
        let telemetry = tick(&mut core, &mut state, t0 + TimeDelta::seconds(1));
        assert_eq!(telemetry.curr_position, 10.0);
        assert_eq!(state.enabled_substate(), Some(EnabledSubstate::MovingPointToPoint));

        let telemetry = tick(&mut core, &mut state, t0 + TimeDelta::seconds(2));
        assert_eq!(telemetry.curr_position, 15.0);
        assert_eq!(state.enabled_substate(), Some(EnabledSubstate::Stationary));
        assert!(ApplicationStatus(telemetry.application_status)
            .contains(ApplicationStatus::MOVE_COMPLETE));
    }

    #[test]
    fn test_fault_mid_move_halts_motion() {
        let mut core = enabled_core();
        do_move(&mut core, &Command::new(CMD_MOVE, 1).with_param1(20.0)).unwrap();
        let mut state = core.state().clone();
        let t0 = Utc::now();
        tick(&mut core, &mut state, t0);
        tick(&mut core, &mut state, t0 + TimeDelta::milliseconds(100));
        let position = core.device().position();

        state.set_state(ControllerState::Fault);
        let telemetry = tick(&mut core, &mut state, t0 + TimeDelta::seconds(5));
        assert_eq!(core.device().position(), position);
        assert_eq!(telemetry.curr_position, position);
        assert_eq!(state.state(), ControllerState::Fault);
        assert_eq!(state.enabled_substate(), None);
        assert!(!ApplicationStatus(telemetry.application_status)
            .contains(ApplicationStatus::MOVE_COMPLETE));
    }

    #[test]
    fn test_stop_holds_position() {
        let mut core = enabled_core();
        do_move(&mut core, &Command::new(CMD_MOVE, 1).with_param1(20.0)).unwrap();
        let mut state = core.state().clone();
        let t0 = Utc::now();
        tick(&mut core, &mut state, t0);
        tick(&mut core, &mut state, t0 + TimeDelta::milliseconds(100));
        *core.state_mut() = state;

        do_stop(&mut core, &Command::new(CMD_SET_ENABLED_SUBSTATE, 2).with_param1(3.0)).unwrap();
        let position = core.device().position();
        assert!(position > 0.0 && position < 20.0);
        assert_eq!(core.telemetry().cmd_position, position);
        assert_eq!(core.state().enabled_substate(), Some(EnabledSubstate::Stationary));
    }

    #[test]
    fn test_drives_enabled_bit() {
        let mut core = enabled_core();
        let mut state = core.state().clone();
        let telemetry = tick(&mut core, &mut state, Utc::now());
        assert!(!ApplicationStatus(telemetry.application_status)
            .contains(ApplicationStatus::DRIVES_ENABLED));

        core.set_drives_enabled(true);
        let telemetry = tick(&mut core, &mut state, Utc::now());
        assert!(ApplicationStatus(telemetry.application_status)
            .contains(ApplicationStatus::DRIVES_ENABLED));
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let settings = SimpleSettings {
            noise_std_dev: 0.1,
            seed: Some(42),
            ..Default::default()
        };
        let mut a = PositionNoise::new(settings.noise_std_dev, settings.seed).unwrap();
        let mut b = PositionNoise::new(settings.noise_std_dev, settings.seed).unwrap();
        for _ in 0..20 {
            assert_eq!(a.sample(), b.sample());
        }
        assert!(PositionNoise::new(0.0, Some(1)).is_none());
        assert!(PositionNoise::new(-1.0, Some(1)).is_none());
    }
}
