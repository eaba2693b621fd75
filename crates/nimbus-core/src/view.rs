// ── Read-only projections ──
//
// Typed accessors over a replica's document for the fields consumers
// care about. Every accessor returns `None` when the field is absent or
// has an unexpected type; the document schema belongs to the appliance
// firmware and varies between models.

use serde::Serialize;
use serde_json::Value;

use nimbus_api::CONTINUOUS_FAN_SUFFIX;

use crate::faults::FaultRecord;

const ZONE_SENSOR_DEVICE_TYPE: &str = "Zone Sensor";

/// Fan speed with the continuous flag split out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanMode {
    /// Raw mode as reported, e.g. `LOW+CONT`.
    pub mode: String,
    /// Speed without the continuous suffix, e.g. `LOW`.
    pub speed: String,
    pub continuous: bool,
}

impl FanMode {
    pub fn parse(raw: &str) -> Self {
        let (speed, continuous) = match raw.strip_suffix(CONTINUOUS_FAN_SUFFIX) {
            Some(speed) => (speed, true),
            None => (raw, false),
        };
        Self {
            mode: raw.to_owned(),
            speed: speed.to_owned(),
            continuous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurboMode {
    pub supported: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuietMode {
    pub supported: bool,
    pub enabled: bool,
    pub active: bool,
}

/// Firmware versions of the main components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Firmware {
    pub wall_controller: Option<String>,
    pub indoor_unit: Option<String>,
    pub outdoor_unit: Option<String>,
}

/// Allowed user setpoint range, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SetpointLimits {
    pub cool_min: f64,
    pub cool_max: f64,
    pub heat_min: f64,
    pub heat_max: f64,
}

/// Borrowed view of one appliance document.
#[derive(Debug, Clone, Copy)]
pub struct ApplianceView<'a> {
    document: &'a Value,
}

impl<'a> ApplianceView<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &'a Value {
        self.document
    }

    fn at(&self, pointer: &str) -> Option<&'a Value> {
        self.document.pointer(pointer)
    }

    fn bool_at(&self, pointer: &str) -> Option<bool> {
        self.at(pointer).and_then(Value::as_bool)
    }

    fn str_at(&self, pointer: &str) -> Option<&'a str> {
        self.at(pointer).and_then(Value::as_str)
    }

    fn f64_at(&self, pointer: &str) -> Option<f64> {
        self.at(pointer).and_then(Value::as_f64)
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn is_on(&self) -> Option<bool> {
        self.bool_at("/UserAirconSettings/isOn")
    }

    pub fn mode(&self) -> Option<&'a str> {
        self.str_at("/UserAirconSettings/Mode")
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.str_at("/UserAirconSettings/FanMode").map(FanMode::parse)
    }

    pub fn turbo_mode(&self) -> Option<TurboMode> {
        Some(TurboMode {
            supported: self.bool_at("/UserAirconSettings/TurboMode/Supported")?,
            enabled: self.bool_at("/UserAirconSettings/TurboMode/Enabled")?,
        })
    }

    pub fn quiet_mode(&self) -> Option<QuietMode> {
        Some(QuietMode {
            supported: self.bool_at("/UserAirconSettings/QuietMode")?,
            enabled: self.bool_at("/UserAirconSettings/QuietModeEnabled")?,
            active: self.bool_at("/UserAirconSettings/QuietModeActive")?,
        })
    }

    /// Variable fan technology block, passed through as-is.
    pub fn vft(&self) -> Option<&'a Value> {
        self.at("/UserAirconSettings/VFT")
    }

    pub fn cool_setpoint(&self) -> Option<f64> {
        self.f64_at("/UserAirconSettings/TemperatureSetpoint_Cool_oC")
    }

    pub fn heat_setpoint(&self) -> Option<f64> {
        self.f64_at("/UserAirconSettings/TemperatureSetpoint_Heat_oC")
    }

    pub fn setpoint_limits(&self) -> Option<SetpointLimits> {
        Some(SetpointLimits {
            cool_min: self.f64_at("/NV_Limits/UserSetpoint_oC/setCool_Min")?,
            cool_max: self.f64_at("/NV_Limits/UserSetpoint_oC/setCool_Max")?,
            heat_min: self.f64_at("/NV_Limits/UserSetpoint_oC/setHeat_Min")?,
            heat_max: self.f64_at("/NV_Limits/UserSetpoint_oC/setHeat_Max")?,
        })
    }

    // ── Live readings ────────────────────────────────────────────────

    pub fn system_name(&self) -> Option<&'a str> {
        self.str_at("/NV_SystemSettings/SystemName")
    }

    pub fn live_temperature(&self) -> Option<f64> {
        self.f64_at("/MasterInfo/LiveTemp_oC")
    }

    pub fn live_humidity(&self) -> Option<f64> {
        self.f64_at("/MasterInfo/LiveHumidity_pc")
    }

    pub fn clean_filter(&self) -> Option<bool> {
        self.bool_at("/Alerts/CleanFilter")
    }

    pub fn defrosting(&self) -> Option<bool> {
        self.bool_at("/Alerts/Defrosting")
    }

    // ── Zones ────────────────────────────────────────────────────────

    pub fn zones(&self) -> Option<&'a [Value]> {
        self.at("/RemoteZoneInfo")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// Per-zone enabled flags; `None` if any entry is not a boolean.
    pub fn enabled_zones(&self) -> Option<Vec<bool>> {
        self.at("/UserAirconSettings/EnabledZones")?
            .as_array()?
            .iter()
            .map(Value::as_bool)
            .collect()
    }

    pub fn peripherals(&self) -> Option<&'a [Value]> {
        self.at("/AirconSystem/Peripherals")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// Zone sensor peripherals ordered by the first zone they serve.
    pub fn zone_sensors(&self) -> Vec<&'a Value> {
        let mut sensors: Vec<&Value> = self
            .peripherals()
            .unwrap_or_default()
            .iter()
            .filter(|p| p.get("DeviceType").and_then(Value::as_str) == Some(ZONE_SENSOR_DEVICE_TYPE))
            .collect();
        sensors.sort_by_key(|p| p.pointer("/ZoneAssignment/0").and_then(Value::as_u64));
        sensors
    }

    // ── Servicing ────────────────────────────────────────────────────

    pub fn servicing(&self) -> Option<&'a Value> {
        self.at("/Servicing")
    }

    /// Raw fault history, newest first.
    pub fn error_history(&self) -> Option<&'a [Value]> {
        self.at("/Servicing/NV_ErrorHistory")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// Fault history decoded into records; entries that do not decode
    /// are skipped.
    pub fn fault_records(&self) -> Vec<FaultRecord> {
        self.error_history()
            .unwrap_or_default()
            .iter()
            .filter_map(FaultRecord::from_value)
            .collect()
    }

    pub fn firmware(&self) -> Firmware {
        let owned = |pointer: &str| self.str_at(pointer).map(str::to_owned);
        Firmware {
            wall_controller: owned("/AirconSystem/MasterWCFirmwareVersion"),
            indoor_unit: owned("/AirconSystem/IndoorUnit/IndoorFW"),
            outdoor_unit: owned("/AirconSystem/OutdoorUnit/SoftwareVersion"),
        }
    }
}
