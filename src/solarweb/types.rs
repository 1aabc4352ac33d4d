use super::numeric::deserialize_localized;
use serde::{Deserialize, Serialize};

/// Live power flow of the installation (`GetCompareDataForPvSystem`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    #[serde(rename = "IsOnline", default)]
    pub is_online: bool,
    #[serde(rename = "AllOnline", default)]
    pub all_online: bool,
    /// Watts from grid to inverter
    #[serde(rename = "P_Grid", default, deserialize_with = "deserialize_localized")]
    pub power_grid: f64,
    /// Watts from house to inverter
    #[serde(rename = "P_Load", default, deserialize_with = "deserialize_localized")]
    pub power_load: f64,
    /// Watts from modules to inverter
    #[serde(rename = "P_PV", default, deserialize_with = "deserialize_localized")]
    pub power_pv: f64,
    /// Watts from battery to inverter
    #[serde(rename = "P_Batt", default, deserialize_with = "deserialize_localized")]
    pub power_battery: f64,
    #[serde(rename = "SOC", default, deserialize_with = "deserialize_localized")]
    pub battery_percentage: f64,
    #[serde(rename = "BatMode", default, deserialize_with = "deserialize_localized")]
    pub battery_mode: f64,
}

/// Envelope of `GetPvSystemEarningsAndSavings`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsAndSavings {
    #[serde(default)]
    pub data: EarningsAndSavingsData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsAndSavingsData {
    #[serde(rename = "Earnings", default)]
    pub earnings: Earnings,
    #[serde(rename = "TotalCo2Savings", default)]
    pub total_co2_savings: Co2Savings,
}

/// Money earned, amounts in `iso_currency`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Earnings {
    #[serde(rename = "IsoCurrency", default)]
    pub iso_currency: String,
    #[serde(rename = "Total", default, deserialize_with = "deserialize_localized")]
    pub total: f64,
    #[serde(rename = "Month", default, deserialize_with = "deserialize_localized")]
    pub month: f64,
    #[serde(rename = "Year", default, deserialize_with = "deserialize_localized")]
    pub year: f64,
    #[serde(rename = "Today", default, deserialize_with = "deserialize_localized")]
    pub today: f64,
    #[serde(rename = "TotalLabel", default)]
    pub total_label: String,
    #[serde(rename = "MonthLabel", default)]
    pub month_label: String,
    #[serde(rename = "YearLabel", default)]
    pub year_label: String,
    #[serde(rename = "TodayLabel", default)]
    pub today_label: String,
}

/// Lifetime CO2 savings expressed as distance, mass and trees
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Co2Savings {
    #[serde(rename = "DistanceUnit", default)]
    pub distance_unit: String,
    #[serde(rename = "DistanceValue", default, deserialize_with = "deserialize_localized")]
    pub distance_value: f64,
    #[serde(rename = "EmissionUnit", default)]
    pub emission_unit: String,
    #[serde(rename = "EmissionValue", default, deserialize_with = "deserialize_localized")]
    pub emission_value: f64,
    #[serde(rename = "Trees", default, deserialize_with = "deserialize_localized")]
    pub trees: f64,
}

/// Today's grid exchange (`GetWidgetChart`).
///
/// Only the summary values are typed; chart series are kept as raw JSON since
/// their shape depends on the series type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridBalance {
    #[serde(rename = "hasMeter", default)]
    pub has_meter: bool,
    /// kWh fed into the grid today
    #[serde(rename = "toGrid", default, deserialize_with = "deserialize_localized")]
    pub to_grid: f64,
    /// kWh drawn from the grid today
    #[serde(rename = "fromGrid", default, deserialize_with = "deserialize_localized")]
    pub from_grid: f64,
    #[serde(default)]
    pub chart: Chart,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_snapshot_accepts_numbers_and_strings() {
        let raw = r#"{
            "IsOnline": true, "AllOnline": false,
            "P_Grid": -120.5, "P_Load": "1.012,4", "P_PV": 2300,
            "P_Batt": null, "SOC": "55", "BatMode": 1,
            "Ohmpilots": [], "Wattpilots": []
        }"#;
        let p: PowerSnapshot = serde_json::from_str(raw).unwrap();
        assert!(p.is_online);
        assert!(!p.all_online);
        assert!((p.power_grid + 120.5).abs() < 1e-9);
        assert!((p.power_load - 1012.4).abs() < 1e-9);
        assert!((p.power_pv - 2300.0).abs() < 1e-9);
        assert_eq!(p.power_battery, 0.0);
        assert!((p.battery_percentage - 55.0).abs() < 1e-9);
        assert!((p.battery_mode - 1.0).abs() < 1e-9);
    }

    #[test]
    fn serializes_with_remote_field_names() {
        let p = PowerSnapshot {
            power_pv: 10.0,
            ..PowerSnapshot::default()
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["P_PV"], 10.0);
        assert_eq!(v["IsOnline"], false);
    }

    #[test]
    fn balance_keeps_raw_series() {
        let raw = r#"{
            "hasMeter": true, "toGrid": "12,4 kWh", "fromGrid": "0,3 kWh",
            "chart": {"series": [
                {"type": "areaspline", "name": "Production", "data": [[1700000000000, 1.5]]},
                {"type": "bubble", "name": "Sun", "data": [{"x": 1, "y": 2, "z": 3}]}
            ]}
        }"#;
        let b: GridBalance = serde_json::from_str(raw).unwrap();
        assert!(b.has_meter);
        assert!((b.to_grid - 12.4).abs() < 1e-9);
        assert!((b.from_grid - 0.3).abs() < 1e-9);
        assert_eq!(b.chart.series.len(), 2);
        assert_eq!(b.chart.series[1].kind, "bubble");
        assert_eq!(b.chart.series[1].data[0]["z"], 3);
    }
}
