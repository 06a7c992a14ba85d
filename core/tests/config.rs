use retail_analytics_core::{
    config::{AnalyticsConfig, FALLBACK_CONTINENT},
    error::AnalyticsError,
    rfm_engine::Segment,
};
use std::fs;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn repo_data_dir() -> String {
    format!("{}/../data", env!("CARGO_MANIFEST_DIR"))
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// The shipped reference tables match the built-in defaults.
#[test]
fn shipped_tables_match_defaults() {
    let loaded = AnalyticsConfig::load(&repo_data_dir()).unwrap();
    let defaults = AnalyticsConfig::default();

    assert_eq!(loaded.segment_priorities, defaults.segment_priorities);
    assert_eq!(loaded.continents, defaults.continents);
    assert_eq!(loaded.rfm, defaults.rfm);
    assert_eq!(loaded.north_star_window_days, 90);
}

/// Priorities come out in rank order, Champions first.
#[test]
fn priorities_ranked_one_to_ten() {
    let config = AnalyticsConfig::load(&repo_data_dir()).unwrap();
    let ranked = config.segment_priorities.by_priority();
    assert_eq!(ranked.len(), 10);
    assert_eq!(ranked[0].segment, Segment::Champions);
    assert_eq!(ranked[9].segment, Segment::Autres);
}

/// Unknown countries map to the fallback continent.
#[test]
fn unmapped_country_uses_fallback() {
    let config = AnalyticsConfig::load(&repo_data_dir()).unwrap();
    assert_eq!(config.continents.continent_of("Germany"), "Europe");
    assert_eq!(config.continents.continent_of("Iceland"), FALLBACK_CONTINENT);
}

/// A table missing segments is rejected as invalid configuration.
#[test]
fn incomplete_priority_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("segments")).unwrap();
    fs::create_dir_all(dir.path().join("geo")).unwrap();
    fs::write(
        dir.path().join("segments/segment_priorities.json"),
        r##"{"segments":[{"segment":"Champions","priority":1,"color":"#000","action":"a","description":"d"}]}"##,
    )
    .unwrap();
    fs::write(dir.path().join("geo/continent_map.json"), r#"{"countries":{}}"#).unwrap();

    let err = AnalyticsConfig::load(dir.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidConfig(_)), "got {err:?}");
}

/// A missing data directory surfaces the path that could not be read.
#[test]
fn missing_directory_names_the_path() {
    let err = AnalyticsConfig::load("/nonexistent/analytics-data").unwrap_err();
    assert!(
        err.to_string().contains("segment_priorities.json"),
        "error should name the file: {err}"
    );
}
