//! Reporting: terminal summaries and the configuration record.
//!
//! Formatting lives here so the fitting code never builds strings, and
//! output changes stay in one place.

use chrono::Local;

use crate::domain::FitConfig;

pub mod format;

pub use format::*;

/// Flat text record of the configuration behind a run.
///
/// One `key: value` header line with the local time the record was made,
/// followed by the full configuration as pretty JSON.
pub fn config_record(config: &FitConfig) -> String {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S %z");
    let body = serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{ \"error\": \"config not serializable: {e}\" }}"));
    format!(
        "generated: {stamp}\nversion: {}\nconfig: {body}\n",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_holds_timestamp_and_config() {
        let config = FitConfig {
            baseline_order: 1,
            ..FitConfig::default()
        };
        let record = config_record(&config);
        assert!(record.starts_with("generated: "));
        assert!(record.contains("\"baseline_order\": 1"));

        let json = record.split_once("config: ").unwrap().1;
        let parsed = FitConfig::from_json_str(json).unwrap();
        assert_eq!(parsed, config);
    }
}
