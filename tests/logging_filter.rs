// tests/logging_filter.rs

use buildcoord::cli::LogLevel;
use buildcoord::logging::resolve_filter;

#[test]
fn cli_level_beats_environment() {
    let filter = resolve_filter(Some(LogLevel::Debug), Some("trace"));
    assert_eq!(filter.to_string(), "debug");
}

#[test]
fn environment_level_is_case_insensitive() {
    let filter = resolve_filter(None, Some(" WARN "));
    assert_eq!(filter.to_string(), "warn");
}

#[test]
fn missing_or_invalid_environment_falls_back_to_info() {
    assert_eq!(resolve_filter(None, None).to_string(), "info");
    assert_eq!(resolve_filter(None, Some("")).to_string(), "info");
    assert_eq!(
        resolve_filter(None, Some("buildcoord=loudest")).to_string(),
        "info"
    );
}
