//! Shaping of Solar.web records into time-series points

use crate::sink::Point;
use crate::solarweb::{EarningsAndSavings, GridBalance, PowerSnapshot};
use chrono::{DateTime, Utc};

pub const POWER_MEASUREMENT: &str = "power";
pub const EARNINGS_MEASUREMENT: &str = "earnings";
pub const CO2_MEASUREMENT: &str = "co2savings";
pub const BALANCE_MEASUREMENT: &str = "balance";

pub fn power_point(data: &PowerSnapshot, at: DateTime<Utc>) -> Point {
    Point::new(POWER_MEASUREMENT)
        .tag_bool("is_online", data.is_online)
        .tag_bool("all_online", data.all_online)
        .field("power_pv", data.power_pv)
        .field("power_grid", data.power_grid)
        .field("power_load", data.power_load)
        .field("power_battery", data.power_battery)
        .field("battery_percentage", data.battery_percentage)
        .field("battery_mode", data.battery_mode)
        .timestamp(at)
}

/// Earnings and CO2 savings share one response but land in two measurements
pub fn earnings_points(data: &EarningsAndSavings, at: DateTime<Utc>) -> [Point; 2] {
    let earnings = &data.data.earnings;
    let savings = &data.data.total_co2_savings;
    [
        Point::new(EARNINGS_MEASUREMENT)
            .tag("currency", earnings.iso_currency.as_str())
            .tag("year_name", earnings.year_label.as_str())
            .tag("month_name", earnings.month_label.as_str())
            .field("total", earnings.total)
            .field("year", earnings.year)
            .field("month", earnings.month)
            .field("day", earnings.today)
            .timestamp(at),
        Point::new(CO2_MEASUREMENT)
            .tag("distance_unit", savings.distance_unit.as_str())
            .tag("emission_unit", savings.emission_unit.as_str())
            .field("distance", savings.distance_value)
            .field("emission", savings.emission_value)
            .field("trees", savings.trees)
            .timestamp(at),
    ]
}

pub fn balance_point(data: &GridBalance, at: DateTime<Utc>) -> Point {
    Point::new(BALANCE_MEASUREMENT)
        .tag_bool("has_meter", data.has_meter)
        .field("kwh_to_grid_today", data.to_grid)
        .field("kwh_from_grid_today", data.from_grid)
        .timestamp(at)
}
