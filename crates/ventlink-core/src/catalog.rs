//! Register table of the ventilation controller.
//!
//! Names and value sizes follow the controller's variable list. Several
//! registers are exposed twice, once as the raw value and once as a derived
//! shape (for example the info bit set and its filter-change flag).

use crate::variable::{Access, Converter, VariableDescriptor};

/// Bit of [`INFOS`] signalling a due filter change.
pub const INFO_FILTER_CHANGE_FLAG: u64 = 0x01;

pub const ARTICLE_DESCRIPTION: VariableDescriptor = VariableDescriptor::text("v00000", 31);
pub const MAC_ADDRESS: VariableDescriptor = VariableDescriptor::text("v00002", 18);
pub const PREHEATER_STATUS: VariableDescriptor = VariableDescriptor::boolean("v00024");
pub const AFTERHEATER_STATUS: VariableDescriptor = VariableDescriptor::boolean("v00201");
pub const PARTY_MODE_DURATION: VariableDescriptor = VariableDescriptor::integer("v00091", 3);
pub const PARTY_MODE_FAN_STAGE: VariableDescriptor = VariableDescriptor::integer("v00092", 1);
pub const PARTY_MODE_REMAINING_TIME: VariableDescriptor = VariableDescriptor::integer("v00093", 3);
pub const PARTY_MODE: VariableDescriptor = VariableDescriptor::boolean("v00094");
pub const STANDBY_MODE_DURATION: VariableDescriptor = VariableDescriptor::integer("v00096", 3);
pub const STANDBY_MODE_FAN_STAGE: VariableDescriptor = VariableDescriptor::integer("v00097", 1);
pub const STANDBY_MODE_REMAINING_TIME: VariableDescriptor =
    VariableDescriptor::integer("v00098", 3);
pub const STANDBY_MODE: VariableDescriptor = VariableDescriptor::boolean("v00099");
pub const OPERATING_MODE: VariableDescriptor = VariableDescriptor::integer("v00101", 1);
pub const FAN_STAGE: VariableDescriptor = VariableDescriptor::integer("v00102", 1);
pub const PERCENTAGE_FAN_SPEED: VariableDescriptor =
    VariableDescriptor::new("v00103", 3, Converter::Int, Access::ReadOnly);
pub const TEMPERATURE_OUTSIDE_AIR: VariableDescriptor = read_only_float("v00104", 7);
pub const TEMPERATURE_SUPPLY_AIR: VariableDescriptor = read_only_float("v00105", 7);
pub const TEMPERATURE_OUTGOING_AIR: VariableDescriptor = read_only_float("v00106", 7);
pub const TEMPERATURE_EXTRACT_AIR: VariableDescriptor = read_only_float("v00107", 7);
pub const SERIAL_NUMBER: VariableDescriptor = VariableDescriptor::text("v00303", 16);
pub const SUPPLY_AIR_RPM: VariableDescriptor = read_only_int("v00348", 4);
pub const EXTRACT_AIR_RPM: VariableDescriptor = read_only_int("v00349", 4);
pub const FILTER_CHANGE: VariableDescriptor = VariableDescriptor::boolean("v01031");
pub const FILTER_CHANGE_REMAINING_TIME: VariableDescriptor = read_only_int("v01033", 10);
pub const BYPASS_EXTRACT_AIR_TEMPERATURE: VariableDescriptor =
    VariableDescriptor::integer("v01035", 2);
pub const BYPASS_OUTDOOR_AIR_TEMPERATURE: VariableDescriptor =
    VariableDescriptor::integer("v01036", 2);
pub const SUPPLY_AIR_FAN_STAGE: VariableDescriptor = VariableDescriptor::integer("v01050", 1);
pub const EXTRACT_AIR_FAN_STAGE: VariableDescriptor = VariableDescriptor::integer("v01051", 1);
pub const SOFTWARE_VERSION: VariableDescriptor = VariableDescriptor::text("v01101", 5);
pub const OPERATION_HOURS_SUPPLY_AIR_FAN: VariableDescriptor =
    VariableDescriptor::operation_hours("v01103", 10);
pub const OPERATION_HOURS_EXTRACT_AIR_FAN: VariableDescriptor =
    VariableDescriptor::operation_hours("v01104", 10);
pub const OPERATION_HOURS_PREHEATER: VariableDescriptor =
    VariableDescriptor::operation_hours("v01105", 10);
pub const OPERATION_HOURS_AFTERHEATER: VariableDescriptor =
    VariableDescriptor::operation_hours("v01106", 10);
pub const ERRORS: VariableDescriptor = read_only_int("v01123", 10);
pub const WARNINGS: VariableDescriptor = read_only_int("v01124", 10);
pub const INFOS: VariableDescriptor = read_only_int("v01125", 10);
pub const INFO_FILTER_CHANGE: VariableDescriptor =
    VariableDescriptor::flag("v01125", 10, INFO_FILTER_CHANGE_FLAG);
pub const PERCENTAGE_PREHEATER: VariableDescriptor = read_only_int("v02117", 3);
pub const PERCENTAGE_AFTERHEATER: VariableDescriptor = read_only_int("v02118", 3);
pub const BYPASS: VariableDescriptor =
    VariableDescriptor::new("v02119", 1, Converter::Bool, Access::ReadOnly);
pub const BYPASS_FROM_DAY: VariableDescriptor = VariableDescriptor::integer("v02120", 2);
pub const BYPASS_FROM_MONTH: VariableDescriptor = VariableDescriptor::integer("v02121", 2);
pub const BYPASS_TO_DAY: VariableDescriptor = VariableDescriptor::integer("v02128", 2);
pub const BYPASS_TO_MONTH: VariableDescriptor = VariableDescriptor::integer("v02129", 2);
pub const HUMIDITY_EXTRACT_AIR: VariableDescriptor = read_only_int("v02136", 3);

const fn read_only_int(name: &'static str, size: usize) -> VariableDescriptor {
    VariableDescriptor::new(name, size, Converter::Int, Access::ReadOnly)
}

const fn read_only_float(name: &'static str, size: usize) -> VariableDescriptor {
    VariableDescriptor::new(name, size, Converter::Float, Access::ReadOnly)
}

/// Every variable of the table, each register name once.
///
/// Derived views of a register ([`INFO_FILTER_CHANGE`]) are left out.
pub fn all() -> Vec<VariableDescriptor> {
    let mut vars = vec![
        ARTICLE_DESCRIPTION,
        MAC_ADDRESS,
        SERIAL_NUMBER,
        SOFTWARE_VERSION,
        PREHEATER_STATUS,
        AFTERHEATER_STATUS,
        FILTER_CHANGE,
        FILTER_CHANGE_REMAINING_TIME,
        STANDBY_MODE_DURATION,
    ];
    vars.extend(default_poll_set());
    vars.sort_by(|a, b| a.name().cmp(b.name()));
    vars.dedup_by(|a, b| a.name() == b.name());
    vars
}

/// Look up a catalog variable by register name.
pub fn by_name(name: &str) -> Option<VariableDescriptor> {
    all().into_iter().find(|v| v.name() == name)
}

/// Variables the coordinator polls periodically from startup.
///
/// Each register appears once. Views sharing a register, such as
/// [`INFO_FILTER_CHANGE`] on [`INFOS`], are served by the same read and
/// decoded per listener.
pub fn default_poll_set() -> Vec<VariableDescriptor> {
    vec![
        FAN_STAGE,
        WARNINGS,
        TEMPERATURE_SUPPLY_AIR,
        TEMPERATURE_OUTSIDE_AIR,
        TEMPERATURE_OUTGOING_AIR,
        TEMPERATURE_EXTRACT_AIR,
        SUPPLY_AIR_RPM,
        SUPPLY_AIR_FAN_STAGE,
        STANDBY_MODE,
        STANDBY_MODE_FAN_STAGE,
        STANDBY_MODE_REMAINING_TIME,
        SOFTWARE_VERSION,
        PERCENTAGE_PREHEATER,
        PERCENTAGE_FAN_SPEED,
        PERCENTAGE_AFTERHEATER,
        PARTY_MODE_REMAINING_TIME,
        PARTY_MODE_FAN_STAGE,
        PARTY_MODE_DURATION,
        PARTY_MODE,
        OPERATION_HOURS_SUPPLY_AIR_FAN,
        OPERATION_HOURS_PREHEATER,
        OPERATION_HOURS_EXTRACT_AIR_FAN,
        OPERATION_HOURS_AFTERHEATER,
        OPERATING_MODE,
        INFOS,
        HUMIDITY_EXTRACT_AIR,
        FILTER_CHANGE,
        EXTRACT_AIR_RPM,
        EXTRACT_AIR_FAN_STAGE,
        ERRORS,
        BYPASS,
        BYPASS_EXTRACT_AIR_TEMPERATURE,
        BYPASS_OUTDOOR_AIR_TEMPERATURE,
        BYPASS_FROM_DAY,
        BYPASS_FROM_MONTH,
        BYPASS_TO_DAY,
        BYPASS_TO_MONTH,
    ]
}

/// A named high-level feature of the controller.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature name used on the command line.
    pub name: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Register backing the feature.
    pub variable: VariableDescriptor,
}

/// Named features, in listing order.
pub fn features() -> Vec<Feature> {
    let feature = |name, description, variable| Feature {
        name,
        description,
        variable,
    };

    vec![
        feature("party_mode", "Party mode active", PARTY_MODE),
        feature("standby_mode", "Standby mode active", STANDBY_MODE),
        feature("operating_mode", "Operating mode (0 auto, 1 manual)", OPERATING_MODE),
        feature("fan_stage", "Fan stage (0-4)", FAN_STAGE),
        feature("fan_stage_percentage", "Fan speed in percent", PERCENTAGE_FAN_SPEED),
        feature("temp_outside_air", "Outside air temperature", TEMPERATURE_OUTSIDE_AIR),
        feature("temp_supply_air", "Supply air temperature", TEMPERATURE_SUPPLY_AIR),
        feature("temp_outgoing_air", "Outgoing air temperature", TEMPERATURE_OUTGOING_AIR),
        feature("temp_extract_air", "Extract air temperature", TEMPERATURE_EXTRACT_AIR),
        feature("supply_air_rpm", "Supply air fan RPM", SUPPLY_AIR_RPM),
        feature("extract_air_rpm", "Extract air fan RPM", EXTRACT_AIR_RPM),
        feature("bypass", "Bypass open", BYPASS),
        feature(
            "filter_change_remaining_time",
            "Remaining time until filter change",
            FILTER_CHANGE_REMAINING_TIME,
        ),
        feature("humidity_extract_air", "Extract air humidity", HUMIDITY_EXTRACT_AIR),
        feature("errors", "Error bit set", ERRORS),
        feature("warnings", "Warning bit set", WARNINGS),
        feature("infos", "Info bit set", INFOS),
        feature("filter_change_due", "Filter change info flag", INFO_FILTER_CHANGE),
    ]
}

/// Look up a feature by name.
pub fn feature(name: &str) -> Option<Feature> {
    features().into_iter().find(|f| f.name == name)
}
