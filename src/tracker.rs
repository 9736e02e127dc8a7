//! Transition detection against last-known per-entity state.

use crate::models::history::{EventDetails, EventKind};
use crate::models::telemetry::{LiveSnapshot, PumpReading};
use crate::rules::{self, ChannelStatus};
use std::collections::BTreeMap;

// Sensor entity names as persisted on history records. The store's casing
// rule upper-cases the first character and lower-cases the remainder, so the
// second word stays lower-case.
pub const WATER_TANK: &str = "Water tank";
pub const DIESEL_TANK: &str = "Diesel tank";
pub const BATTERY_SYSTEM: &str = "Battery system";
pub const SYSTEM_PRESSURE: &str = "System pressure";

/// A detected state change, independent of the wire record that carries it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub entity: String,
    pub kind: EventKind,
    pub message: String,
    pub details: EventDetails,
}

#[derive(Debug, Clone, PartialEq)]
struct PumpState {
    status: String,
    mode: String,
}

/// Last observed state of every monitored entity.
///
/// Owned exclusively by the worker that polls snapshots; created at worker
/// start, discarded at stop, never persisted. The first observation of an
/// entity seeds its slot silently, so a fresh tracker never reports a
/// transition out of the unknown state.
#[derive(Debug, Default)]
pub struct TransitionDetector {
    pumps: BTreeMap<String, PumpState>,
    water_tank: Option<ChannelStatus>,
    diesel_tank: Option<ChannelStatus>,
    battery: Option<ChannelStatus>,
    pressure: Option<ChannelStatus>,
}

impl TransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one snapshot against last-known state and return the
    /// transitions found. State is updated before returning, so a failed
    /// append downstream never re-emits the same transition next cycle.
    pub fn observe(&mut self, snapshot: &LiveSnapshot) -> Vec<Transition> {
        let mut out = Vec::new();
        self.check_pumps(&snapshot.pumps, &mut out);
        self.check_water_tank(snapshot.water_level.unwrap_or(0.0), &mut out);
        self.check_diesel_tank(snapshot.diesel_level.unwrap_or(0.0), &mut out);
        self.check_battery(snapshot.battery_voltage.unwrap_or(0.0), &mut out);
        self.check_pressure(snapshot.pressure.unwrap_or(0.0), &mut out);
        out
    }

    /// Seed-or-compare for one sensor slot. Returns the new status only when
    /// it differs from a previously seeded one.
    fn shift(slot: &mut Option<ChannelStatus>, current: ChannelStatus) -> Option<ChannelStatus> {
        match slot.replace(current) {
            None => None,
            Some(previous) if previous == current => None,
            Some(_) => Some(current),
        }
    }

    fn check_pumps(&mut self, pumps: &BTreeMap<String, PumpReading>, out: &mut Vec<Transition>) {
        for (name, reading) in pumps {
            let status = rules::pump_status(reading.status.as_deref());
            let mode = rules::pump_mode(reading.mode.as_deref());

            let Some(previous) = self.pumps.get_mut(name) else {
                self.pumps.insert(name.clone(), PumpState { status, mode });
                continue;
            };

            // Status and mode are independent; both may fire in one cycle.
            if previous.status != status {
                out.push(Transition {
                    entity: display_name(name),
                    kind: EventKind::StatusChange,
                    message: format!("Status changed to {}", status),
                    details: EventDetails::Change {
                        from: previous.status.clone(),
                        to: status.clone(),
                    },
                });
                previous.status = status;
            }

            if previous.mode != mode {
                out.push(Transition {
                    entity: display_name(name),
                    kind: EventKind::ModeChange,
                    message: format!("Mode changed to {}", mode),
                    details: EventDetails::Change {
                        from: previous.mode.clone(),
                        to: mode.clone(),
                    },
                });
                previous.mode = mode;
            }
        }
    }

    fn check_water_tank(&mut self, level: f64, out: &mut Vec<Transition>) {
        let Some(status) = Self::shift(&mut self.water_tank, rules::tank_status(level)) else {
            return;
        };
        let (kind, message) = if status.is_critical() {
            (EventKind::Alarm, format!("Critical Level Detected: {}%", level))
        } else {
            (EventKind::StatusChange, format!("Level Restored to Normal: {}%", level))
        };
        out.push(Transition {
            entity: WATER_TANK.to_string(),
            kind,
            message,
            details: EventDetails::LevelWithThreshold {
                level,
                threshold: rules::TANK_CRITICAL_BELOW_PCT,
            },
        });
    }

    fn check_diesel_tank(&mut self, level: f64, out: &mut Vec<Transition>) {
        let Some(status) = Self::shift(&mut self.diesel_tank, rules::tank_status(level)) else {
            return;
        };
        let (kind, message) = if status.is_critical() {
            (EventKind::Alarm, format!("Critical Level Detected: {}%", level))
        } else {
            (EventKind::StatusChange, format!("Level Restored to Normal: {}%", level))
        };
        out.push(Transition {
            entity: DIESEL_TANK.to_string(),
            kind,
            message,
            details: EventDetails::Level { level },
        });
    }

    fn check_battery(&mut self, volts: f64, out: &mut Vec<Transition>) {
        let Some(status) = Self::shift(&mut self.battery, rules::battery_status(volts)) else {
            return;
        };
        let (kind, message) = if status.is_critical() {
            let message = if volts < rules::BATTERY_MIN_VOLTS {
                format!("Low Voltage: {}V", volts)
            } else {
                format!("High Voltage: {}V", volts)
            };
            (EventKind::Alarm, message)
        } else {
            (EventKind::StatusChange, format!("Voltage Normal: {}V", volts))
        };
        out.push(Transition {
            entity: BATTERY_SYSTEM.to_string(),
            kind,
            message,
            details: EventDetails::Voltage { voltage: volts },
        });
    }

    fn check_pressure(&mut self, bar: f64, out: &mut Vec<Transition>) {
        let Some(status) = Self::shift(&mut self.pressure, rules::pressure_status(bar)) else {
            return;
        };
        let (kind, message) = if status.is_critical() {
            (EventKind::Alarm, format!("Low Pressure Detected: {} Bar", bar))
        } else {
            (EventKind::StatusChange, format!("Pressure Normal: {} Bar", bar))
        };
        out.push(Transition {
            entity: SYSTEM_PRESSURE.to_string(),
            kind,
            message,
            details: EventDetails::Pressure { pressure: bar },
        });
    }
}

/// Apply the history casing rule to a raw pump id: first character
/// upper-cased, the remainder lower-cased ("main" -> "Main").
fn display_name(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
