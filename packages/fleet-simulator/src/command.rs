//! command.rs — Operator commands against a single relay
//!
//! Commands arrive as a name plus optional parameters and are decoded once
//! into [`Command`]. Execution checks every precondition before touching the
//! relay, so a rejected command leaves the fleet exactly as it was.

use std::fmt;

use lighting_types::{CommandParameters, ConcentratorId, RelayId, RelayStatus};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::SimContext;
use crate::error::FleetError;
use crate::fleet::{Capability, Relay, TimeProgram};
use crate::power;
use crate::registry::DeviceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TurnOn,
    TurnOff,
    EnableDimmer,
    DisableDimmer,
    ProgramDimmerPercentage { percentage: u8 },
    EnableLightSensor,
    DisableLightSensor,
    EnableTimeProgram,
    DisableTimeProgram,
    SetupTimeProgram(TimeProgram),
}

impl Command {
    /// Decode a wire command. Legacy aliases map onto the canonical commands.
    pub fn decode(name: &str, params: Option<&CommandParameters>) -> Result<Self, FleetError> {
        let command = match name.trim() {
            "turn_on" | "turn_light_on" => Self::TurnOn,
            "turn_off" | "turn_light_off" => Self::TurnOff,
            "enable_dimmer" => Self::EnableDimmer,
            "disable_dimmer" => Self::DisableDimmer,
            "program_dimmer_percentage" => {
                let raw = params.and_then(|p| p.percentage).ok_or_else(|| {
                    FleetError::InvalidCommand("program_dimmer_percentage requires `percentage`".into())
                })?;
                if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
                    return Err(FleetError::Validation(format!(
                        "dimmer percentage must be within 0-100, got {raw}"
                    )));
                }
                Self::ProgramDimmerPercentage { percentage: raw.round() as u8 }
            }
            "enable_light_sensor" => Self::EnableLightSensor,
            "disable_light_sensor" => Self::DisableLightSensor,
            "enable_time_program" | "enable_light_time_program" => Self::EnableTimeProgram,
            "disable_time_program" | "disable_light_time_program" => Self::DisableTimeProgram,
            "setup_time_program" | "setup_light_time_program" => {
                let (on, off) = params
                    .and_then(|p| p.on_time.as_deref().zip(p.off_time.as_deref()))
                    .ok_or_else(|| {
                        FleetError::InvalidCommand(
                            "setup_time_program requires `onTime` and `offTime`".into(),
                        )
                    })?;
                Self::SetupTimeProgram(TimeProgram::parse(on, off)?)
            }
            other => return Err(FleetError::InvalidCommand(format!("unknown command '{other}'"))),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::EnableDimmer => "enable_dimmer",
            Self::DisableDimmer => "disable_dimmer",
            Self::ProgramDimmerPercentage { .. } => "program_dimmer_percentage",
            Self::EnableLightSensor => "enable_light_sensor",
            Self::DisableLightSensor => "disable_light_sensor",
            Self::EnableTimeProgram => "enable_time_program",
            Self::DisableTimeProgram => "disable_time_program",
            Self::SetupTimeProgram(_) => "setup_time_program",
        }
    }

    fn required_capability(&self) -> Option<Capability> {
        match self {
            Self::EnableDimmer | Self::ProgramDimmerPercentage { .. } => Some(Capability::Dimmer),
            Self::EnableLightSensor => Some(Capability::LightSensor),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramDimmerPercentage { percentage } => write!(f, "{}({percentage}%)", self.name()),
            Self::SetupTimeProgram(program) => write!(f, "{}({program})", self.name()),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

/// Apply a decoded command to one relay. Fails without mutating anything.
pub fn execute(
    registry: &mut DeviceRegistry,
    concentrator_id: ConcentratorId,
    relay_id: RelayId,
    command: &Command,
    ctx: &SimContext,
) -> Result<String, FleetError> {
    let relay = registry.locate_mut(concentrator_id, relay_id)?;

    if let Some(capability) = command.required_capability() {
        if !relay.capabilities().has(capability) {
            return Err(FleetError::CapabilityViolation { concentrator_id, relay_id, capability });
        }
    }

    let effect = apply(relay, command, ctx);

    if let Some(concentrator) = registry.concentrator_mut(concentrator_id) {
        concentrator.touch(ctx.now);
    }
    Ok(effect)
}

/// Decode and execute in one step, flattening failures into the outcome.
pub fn execute_command(
    registry: &mut DeviceRegistry,
    concentrator_id: ConcentratorId,
    relay_id: RelayId,
    name: &str,
    params: Option<&CommandParameters>,
    ctx: &SimContext,
) -> CommandOutcome {
    let result = Command::decode(name, params)
        .and_then(|command| execute(registry, concentrator_id, relay_id, &command, ctx));
    match result {
        Ok(effect) => {
            info!("💡 {name} on relay {relay_id}@{concentrator_id}: {effect}");
            CommandOutcome {
                success: true,
                message: format!(
                    "Command '{name}' executed on relay {relay_id} of concentrator {concentrator_id}. {effect}"
                ),
            }
        }
        Err(e) => {
            debug!("command {name} on relay {relay_id}@{concentrator_id} rejected: {e}");
            CommandOutcome { success: false, message: e.to_string() }
        }
    }
}

fn apply(relay: &mut Relay, command: &Command, ctx: &SimContext) -> String {
    match *command {
        Command::TurnOn => {
            relay.switch_on(ctx);
            power::compute_power(relay);
            "Luminaire switched on.".into()
        }
        Command::TurnOff => {
            relay.switch_off(ctx);
            power::compute_power(relay);
            "Luminaire switched off.".into()
        }
        Command::EnableDimmer => {
            relay.dimmer_programming = true;
            relay.status = RelayStatus::Dimmed;
            "Dimmer enabled.".into()
        }
        Command::DisableDimmer => {
            relay.dimmer_programming = false;
            relay.dimmer_programming_value = None;
            if relay.status == RelayStatus::Dimmed {
                relay.status = RelayStatus::switched(relay.is_on);
            }
            "Dimmer disabled.".into()
        }
        Command::ProgramDimmerPercentage { percentage } => {
            relay.dimmer_programming_value = Some(percentage);
            relay.dimmer_programming = true;
            relay.status = RelayStatus::Dimmed;
            format!("Dimmer programmed to {percentage}%.")
        }
        Command::EnableLightSensor => {
            relay.is_light_sensor_enabled = true;
            "Light sensor enabled.".into()
        }
        Command::DisableLightSensor => {
            relay.is_light_sensor_enabled = false;
            "Light sensor disabled.".into()
        }
        Command::EnableTimeProgram => {
            relay.programming_hour = true;
            "Time program enabled.".into()
        }
        Command::DisableTimeProgram => {
            relay.programming_hour = false;
            "Time program disabled.".into()
        }
        Command::SetupTimeProgram(program) => {
            relay.hour_programming_value = Some(program);
            relay.programming_hour = true;
            format!("Time program set to {program}.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::night;
    use crate::registry::test_support::registry;

    fn percentage(p: f64) -> CommandParameters {
        CommandParameters { percentage: Some(p), ..Default::default() }
    }

    #[test]
    fn aliases_decode_to_canonical_commands() {
        assert_eq!(Command::decode("turn_light_on", None).unwrap(), Command::TurnOn);
        assert_eq!(Command::decode("turn_light_off", None).unwrap(), Command::TurnOff);
        assert_eq!(Command::decode("enable_light_time_program", None).unwrap(), Command::EnableTimeProgram);
        assert!(matches!(Command::decode("explode", None), Err(FleetError::InvalidCommand(_))));
    }

    #[test]
    fn parameters_are_validated_at_decode() {
        assert!(matches!(Command::decode("program_dimmer_percentage", None), Err(FleetError::InvalidCommand(_))));
        assert!(matches!(
            Command::decode("program_dimmer_percentage", Some(&percentage(150.0))),
            Err(FleetError::Validation(_))
        ));
        assert_eq!(
            Command::decode("program_dimmer_percentage", Some(&percentage(0.0))).unwrap(),
            Command::ProgramDimmerPercentage { percentage: 0 }
        );
        let only_on = CommandParameters { on_time: Some("18:00".into()), ..Default::default() };
        assert!(matches!(Command::decode("setup_time_program", Some(&only_on)), Err(FleetError::InvalidCommand(_))));
    }

    #[test]
    fn unknown_concentrator_is_rejected_without_side_effects() {
        let ctx = night();
        let mut fleet = registry(&ctx, 2, 2);
        let outcome = execute_command(&mut fleet, 999_999, 1, "turn_on", None, &ctx);
        assert!(!outcome.success);
        assert!(outcome.message.contains("999999"));
        assert_eq!(fleet.concentrator_count(), 2);
        assert_eq!(fleet.relay_count(), 4);
    }

    #[test]
    fn turn_on_then_off_zeroes_power() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        assert!(execute_command(&mut fleet, 1, 1, "turn_on", None, &ctx).success);
        let relay = fleet.relay(1, 1).unwrap();
        assert!(relay.is_on);
        assert_eq!(relay.status, RelayStatus::On);
        assert!(relay.electrical.active_power > 0.0);

        assert!(execute_command(&mut fleet, 1, 1, "turn_off", None, &ctx).success);
        let relay = fleet.relay(1, 1).unwrap();
        assert!(!relay.is_on);
        assert_eq!(relay.electrical.active_power, 0.0);
        assert_eq!(relay.time_on(), "00:00:00");
        assert_eq!(relay.shutdown_time, Some(ctx.time_of_day()));
        assert_eq!(fleet.concentrator(1).unwrap().details().last_readings, ctx.now);
    }

    #[test]
    fn out_of_range_percentage_leaves_relay_unchanged() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        fleet.locate_mut(1, 1).unwrap().capabilities.dimmer_present = true;
        let before = serde_json::to_value(fleet.relay(1, 1).unwrap()).unwrap();

        let outcome = execute_command(&mut fleet, 1, 1, "program_dimmer_percentage", Some(&percentage(150.0)), &ctx);
        assert!(!outcome.success);
        assert_eq!(serde_json::to_value(fleet.relay(1, 1).unwrap()).unwrap(), before);
    }

    #[test]
    fn dimmer_commands_require_a_dimmer() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        {
            let relay = fleet.locate_mut(1, 1).unwrap();
            relay.capabilities.dimmer_present = false;
            relay.dimmer_programming = false;
            relay.status = RelayStatus::On;
        }
        let err = execute(&mut fleet, 1, 1, &Command::EnableDimmer, &ctx).unwrap_err();
        assert!(matches!(err, FleetError::CapabilityViolation { capability: Capability::Dimmer, .. }));
        assert_eq!(fleet.relay(1, 1).unwrap().status, RelayStatus::On);

        fleet.locate_mut(1, 1).unwrap().capabilities.dimmer_present = true;
        execute(&mut fleet, 1, 1, &Command::ProgramDimmerPercentage { percentage: 40 }, &ctx).unwrap();
        let relay = fleet.relay(1, 1).unwrap();
        assert_eq!(relay.status, RelayStatus::Dimmed);
        assert_eq!(relay.dimmer_programming_value, Some(40));

        execute(&mut fleet, 1, 1, &Command::DisableDimmer, &ctx).unwrap();
        let relay = fleet.relay(1, 1).unwrap();
        assert!(!relay.dimmer_programming);
        assert_eq!(relay.dimmer_programming_value, None);
        assert_eq!(relay.status, RelayStatus::switched(relay.is_on));
    }

    #[test]
    fn light_sensor_enable_requires_sensor() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        fleet.locate_mut(1, 1).unwrap().capabilities.light_sensor_present = false;
        let err = execute(&mut fleet, 1, 1, &Command::EnableLightSensor, &ctx).unwrap_err();
        assert!(matches!(err, FleetError::CapabilityViolation { capability: Capability::LightSensor, .. }));
        execute(&mut fleet, 1, 1, &Command::DisableLightSensor, &ctx).unwrap();
        assert!(!fleet.relay(1, 1).unwrap().is_light_sensor_enabled);
    }

    #[test]
    fn time_program_setup_enables_programming() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        let params = CommandParameters {
            on_time: Some("19:15".into()),
            off_time: Some("05:30".into()),
            ..Default::default()
        };
        assert!(execute_command(&mut fleet, 1, 1, "setup_light_time_program", Some(&params), &ctx).success);
        let relay = fleet.relay(1, 1).unwrap();
        assert!(relay.programming_hour);
        assert_eq!(relay.hour_programming_value.map(|p| p.to_string()).as_deref(), Some("19:15,05:30"));

        assert!(execute_command(&mut fleet, 1, 1, "disable_time_program", None, &ctx).success);
        assert!(!fleet.relay(1, 1).unwrap().programming_hour);
    }

    #[test]
    fn non_power_commands_leave_electrical_fields_alone() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        let before = fleet.relay(1, 1).unwrap().electrical.clone();
        execute(&mut fleet, 1, 1, &Command::DisableLightSensor, &ctx).unwrap();
        execute(&mut fleet, 1, 1, &Command::EnableTimeProgram, &ctx).unwrap();
        assert_eq!(fleet.relay(1, 1).unwrap().electrical, before);
    }
}
