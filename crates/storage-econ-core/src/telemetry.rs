//! Battery performance analytics over operational telemetry.
//!
//! Independent of the economics engine: input is a time series of
//! sampled channels, output is a set of measured and derived
//! performance figures. Any channel may be absent from a dataset;
//! metrics that depend on it come back `None` with a warning instead
//! of failing the whole analysis.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::StorageEconError;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::StorageEconResult;

/// Command steps smaller than this are treated as noise.
const COMMAND_STEP_THRESHOLD_KW: f64 = 1.0;
/// A response counts once actual power reaches this share of command.
const RESPONSE_FRACTION: f64 = 0.9;
/// Samples scanned after a command step before giving up.
const RESPONSE_WINDOW_SAMPLES: usize = 5;
/// Sample gaps at or above this are treated as recording breaks.
const MAX_RAMP_INTERVAL_S: f64 = 300.0;
/// Minimum power for frequency-response detection, kW.
const FREQUENCY_RESPONSE_MIN_KW: f64 = 10.0;
const UNDER_FREQUENCY_HZ: f64 = 49.95;
const OVER_FREQUENCY_HZ: f64 = 50.05;

/// One telemetry sample. Every channel other than the timestamp is
/// optional; a dataset simply omits the columns it never recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub commanded_power_kw: Option<f64>,
    #[serde(default)]
    pub actual_power_kw: Option<f64>,
    #[serde(default)]
    pub soc_percent: Option<f64>,
    #[serde(default)]
    pub internal_temp_c: Option<f64>,
    #[serde(default)]
    pub grid_frequency_hz: Option<f64>,
    #[serde(default)]
    pub charge_power_kw: Option<f64>,
    #[serde(default)]
    pub discharge_power_kw: Option<f64>,
    #[serde(default)]
    pub cumulative_energy_in_kwh: Option<f64>,
    #[serde(default)]
    pub cumulative_energy_out_kwh: Option<f64>,
}

/// Nameplate figures and fade assumptions for the system under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub design_capacity_kwh: f64,
    pub max_power_kw: f64,
    pub total_mass_kg: f64,
    pub total_volume_m3: f64,
    /// Relative capacity fade per full cycle
    #[serde(default = "default_cycle_fade")]
    pub capacity_fade_per_cycle: f64,
    /// Relative capacity fade per calendar year
    #[serde(default = "default_calendar_fade")]
    pub calendar_fade_per_year: f64,
    /// Remaining capacity fraction that defines end of life
    #[serde(default = "default_end_of_life")]
    pub end_of_life_capacity: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            design_capacity_kwh: 2000.0,
            max_power_kw: 500.0,
            total_mass_kg: 10_000.0,
            total_volume_m3: 20.0,
            capacity_fade_per_cycle: default_cycle_fade(),
            calendar_fade_per_year: default_calendar_fade(),
            end_of_life_capacity: default_end_of_life(),
        }
    }
}

fn default_cycle_fade() -> f64 {
    0.00004
}

fn default_calendar_fade() -> f64 {
    0.025
}

fn default_end_of_life() -> f64 {
    0.8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyDensity {
    pub mass_density_kwh_per_kg: f64,
    pub volume_density_kwh_per_m3: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerDensity {
    pub mass_density_kw_per_kg: f64,
    pub volume_density_kw_per_m3: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CRates {
    pub charge_c_rate: f64,
    pub discharge_c_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureStats {
    pub average_c: f64,
    pub min_c: f64,
    pub max_c: f64,
}

/// Measured and derived battery performance figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub samples: usize,
    pub system_power_rating_kw: f64,
    /// Usable energy observed: span of cumulative output energy, kWh
    pub energy_capacity_kwh: Option<f64>,
    pub round_trip_efficiency_percent: Option<f64>,
    pub energy_density: Option<EnergyDensity>,
    pub power_density: Option<PowerDensity>,
    /// Mean seconds from a command step to 90% compliance
    pub average_response_time_s: Option<f64>,
    pub max_ramp_rate_kw_per_s: Option<f64>,
    pub c_rate: Option<CRates>,
    pub soc_operating_range_percent: Option<f64>,
    pub temperature_celsius: Option<TemperatureStats>,
    /// Whether power flow tracked grid frequency excursions
    pub frequency_response_detected: Option<bool>,
    pub assumed_cycle_life: u32,
    pub assumed_calendar_life_years: f64,
    pub lifetime_energy_throughput_gwh: f64,
}

/// Analyze a telemetry time series against the system's nameplate.
/// Records must be in chronological order.
pub fn analyze_performance(
    config: &SystemConfig,
    records: &[TelemetryRecord],
) -> StorageEconResult<ComputationOutput<PerformanceReport>> {
    let start = Instant::now();

    validate_config(config)?;
    if records.is_empty() {
        return Err(StorageEconError::InsufficientData(
            "Telemetry dataset is empty".to_string(),
        ));
    }

    let mut warnings = Vec::new();

    let energy_capacity_kwh = energy_capacity(records);
    if energy_capacity_kwh.is_none() {
        warnings.push("Cumulative output energy channel absent; energy capacity and round-trip efficiency unavailable".to_string());
    }

    let round_trip_efficiency_percent = round_trip_efficiency(records);

    let energy_density = energy_capacity_kwh.and_then(|capacity| {
        if config.total_mass_kg > 0.0 && config.total_volume_m3 > 0.0 {
            Some(EnergyDensity {
                mass_density_kwh_per_kg: capacity / config.total_mass_kg,
                volume_density_kwh_per_m3: capacity / config.total_volume_m3,
            })
        } else {
            None
        }
    });
    let power_density = if config.total_mass_kg > 0.0 && config.total_volume_m3 > 0.0 {
        Some(PowerDensity {
            mass_density_kw_per_kg: config.max_power_kw / config.total_mass_kg,
            volume_density_kw_per_m3: config.max_power_kw / config.total_volume_m3,
        })
    } else {
        warnings.push("System mass or volume not positive; density figures unavailable".to_string());
        None
    };

    let average_response_time_s = average_response_time(records);
    if average_response_time_s.is_none() {
        warnings.push(
            "No command step with a tracked response found; response time unavailable"
                .to_string(),
        );
    }

    let max_ramp_rate_kw_per_s = max_ramp_rate(records);
    let c_rate = c_rates(config, records);
    let soc_operating_range_percent = soc_range(records);
    let temperature_celsius = temperature_stats(records);
    let frequency_response_detected = frequency_response(records);
    if frequency_response_detected.is_none() {
        warnings.push(
            "Grid frequency or charge/discharge channels absent; frequency response not assessed"
                .to_string(),
        );
    }

    let usable_fade = 1.0 - config.end_of_life_capacity;
    // Round before casting: 0.2 / 0.00004 lands just under 5000 in
    // binary floating point and a plain cast would truncate it.
    let assumed_cycle_life = (usable_fade / config.capacity_fade_per_cycle).round() as u32;
    let assumed_calendar_life_years = usable_fade / config.calendar_fade_per_year;
    let lifetime_energy_throughput_gwh =
        config.design_capacity_kwh * f64::from(assumed_cycle_life) / 1.0e6;

    let report = PerformanceReport {
        samples: records.len(),
        system_power_rating_kw: config.max_power_kw,
        energy_capacity_kwh,
        round_trip_efficiency_percent,
        energy_density,
        power_density,
        average_response_time_s,
        max_ramp_rate_kw_per_s,
        c_rate,
        soc_operating_range_percent,
        temperature_celsius,
        frequency_response_detected,
        assumed_cycle_life,
        assumed_calendar_life_years,
        lifetime_energy_throughput_gwh,
    };

    let elapsed_us = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Time-series battery performance analytics: observed capacity, efficiency, dynamics and derived life estimates",
        config,
        warnings,
        elapsed_us,
        report,
    ))
}

fn validate_config(config: &SystemConfig) -> StorageEconResult<()> {
    if config.design_capacity_kwh <= 0.0 {
        return Err(StorageEconError::InvalidInput {
            field: "system.design_capacity_kwh".into(),
            reason: "must be positive".into(),
        });
    }
    if config.max_power_kw <= 0.0 {
        return Err(StorageEconError::InvalidInput {
            field: "system.max_power_kw".into(),
            reason: "must be positive".into(),
        });
    }
    if config.capacity_fade_per_cycle <= 0.0 || config.calendar_fade_per_year <= 0.0 {
        return Err(StorageEconError::InvalidInput {
            field: "system.fade_assumptions".into(),
            reason: "fade rates must be positive".into(),
        });
    }
    if config.end_of_life_capacity <= 0.0 || config.end_of_life_capacity >= 1.0 {
        return Err(StorageEconError::InvalidInput {
            field: "system.end_of_life_capacity".into(),
            reason: "must be in (0, 1)".into(),
        });
    }
    Ok(())
}

/// Span of the cumulative output energy counter.
fn energy_capacity(records: &[TelemetryRecord]) -> Option<f64> {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.cumulative_energy_out_kwh)
        .collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if values.is_empty() {
        None
    } else {
        Some(max - min)
    }
}

/// Output energy delivered over input energy drawn, first sample to
/// last, as a percentage. Zero input reads as 0%.
fn round_trip_efficiency(records: &[TelemetryRecord]) -> Option<f64> {
    let inputs: Vec<f64> = records
        .iter()
        .filter_map(|r| r.cumulative_energy_in_kwh)
        .collect();
    let outputs: Vec<f64> = records
        .iter()
        .filter_map(|r| r.cumulative_energy_out_kwh)
        .collect();
    let (first_in, last_in) = (inputs.first()?, inputs.last()?);
    let (first_out, last_out) = (outputs.first()?, outputs.last()?);

    let total_input = last_in - first_in;
    if total_input > 0.0 {
        Some((last_out - first_out) / total_input * 100.0)
    } else {
        Some(0.0)
    }
}

/// Mean time from each significant command step to the first sample
/// within the scan window where actual power reaches 90% of command.
fn average_response_time(records: &[TelemetryRecord]) -> Option<f64> {
    let mut response_times = Vec::new();

    for i in 1..records.len() {
        let (Some(previous), Some(command)) = (
            records[i - 1].commanded_power_kw,
            records[i].commanded_power_kw,
        ) else {
            continue;
        };
        if (command - previous).abs() <= COMMAND_STEP_THRESHOLD_KW {
            continue;
        }

        let window_end = (i + 1 + RESPONSE_WINDOW_SAMPLES).min(records.len());
        for follower in &records[i + 1..window_end] {
            let Some(actual) = follower.actual_power_kw else {
                continue;
            };
            let reached = if command > 0.0 {
                actual >= command * RESPONSE_FRACTION
            } else if command < 0.0 {
                actual <= command * RESPONSE_FRACTION
            } else {
                false
            };
            if reached {
                response_times.push(seconds_between(
                    records[i].timestamp,
                    follower.timestamp,
                ));
                break;
            }
        }
    }

    if response_times.is_empty() {
        None
    } else {
        Some(response_times.iter().sum::<f64>() / response_times.len() as f64)
    }
}

/// Steepest power change per second over plausible sample gaps.
/// Gaps of zero or 300 s and above are treated as recording breaks.
fn max_ramp_rate(records: &[TelemetryRecord]) -> Option<f64> {
    let mut any_power = false;
    let mut max_rate: Option<f64> = None;

    for pair in records.windows(2) {
        let (Some(before), Some(after)) = (pair[0].actual_power_kw, pair[1].actual_power_kw)
        else {
            any_power |= pair[0].actual_power_kw.is_some() || pair[1].actual_power_kw.is_some();
            continue;
        };
        any_power = true;
        let dt = seconds_between(pair[0].timestamp, pair[1].timestamp);
        if dt <= 0.0 || dt >= MAX_RAMP_INTERVAL_S {
            continue;
        }
        let rate = (after - before).abs() / dt;
        max_rate = Some(max_rate.map_or(rate, |m| m.max(rate)));
    }

    if any_power {
        Some(max_rate.unwrap_or(0.0))
    } else {
        None
    }
}

/// Mean C-rate while actively charging/discharging. A side with no
/// active samples reads as 0.
fn c_rates(config: &SystemConfig, records: &[TelemetryRecord]) -> Option<CRates> {
    let charge: Vec<f64> = records
        .iter()
        .filter_map(|r| r.charge_power_kw)
        .filter(|&p| p > 0.0)
        .collect();
    let discharge: Vec<f64> = records
        .iter()
        .filter_map(|r| r.discharge_power_kw)
        .filter(|&p| p > 0.0)
        .collect();

    let any_channel = records
        .iter()
        .any(|r| r.charge_power_kw.is_some() || r.discharge_power_kw.is_some());
    if !any_channel {
        return None;
    }

    let mean_over_capacity = |values: &[f64]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64 / config.design_capacity_kwh
        }
    };

    Some(CRates {
        charge_c_rate: mean_over_capacity(&charge),
        discharge_c_rate: mean_over_capacity(&discharge),
    })
}

fn soc_range(records: &[TelemetryRecord]) -> Option<f64> {
    let values: Vec<f64> = records.iter().filter_map(|r| r.soc_percent).collect();
    if values.is_empty() {
        return None;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    Some(max - min)
}

fn temperature_stats(records: &[TelemetryRecord]) -> Option<TemperatureStats> {
    let values: Vec<f64> = records.iter().filter_map(|r| r.internal_temp_c).collect();
    if values.is_empty() {
        return None;
    }
    Some(TemperatureStats {
        average_c: values.iter().sum::<f64>() / values.len() as f64,
        min_c: values.iter().copied().fold(f64::INFINITY, f64::min),
        max_c: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Did the system discharge into under-frequency or charge into
/// over-frequency at meaningful power?
fn frequency_response(records: &[TelemetryRecord]) -> Option<bool> {
    let assessable = records.iter().any(|r| {
        r.grid_frequency_hz.is_some()
            && (r.charge_power_kw.is_some() || r.discharge_power_kw.is_some())
    });
    if !assessable {
        return None;
    }

    let detected = records.iter().any(|r| {
        let Some(freq) = r.grid_frequency_hz else {
            return false;
        };
        let discharging = r
            .discharge_power_kw
            .map_or(false, |p| p > FREQUENCY_RESPONSE_MIN_KW);
        let charging = r
            .charge_power_kw
            .map_or(false, |p| p > FREQUENCY_RESPONSE_MIN_KW);
        (freq < UNDER_FREQUENCY_HZ && discharging) || (freq > OVER_FREQUENCY_HZ && charging)
    });
    Some(detected)
}

fn seconds_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Timestamp (de)serialization: `YYYY-MM-DD HH:MM:SS`, with RFC 3339
/// accepted on input.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(timestamp: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| {
                chrono::DateTime::parse_from_rfc3339(&raw).map(|parsed| parsed.naive_utc())
            })
            .map_err(serde::de::Error::custom)
    }
}
