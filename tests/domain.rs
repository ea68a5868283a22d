use assert_matches::assert_matches;

use long_trips::domain::{Locator, PartitionNaming};
use long_trips::error::TripError;

#[test]
fn locator_trims_whitespace() {
    let locator: Locator = "  https://example.org/data/a.parquet \r\n".parse().unwrap();
    assert_eq!(locator.as_str(), "https://example.org/data/a.parquet");
    assert_eq!(locator.file_name(), "a.parquet");
}

#[test]
fn locator_without_separator_uses_whole_string() {
    let locator: Locator = "local.parquet".parse().unwrap();
    assert_eq!(locator.file_name(), "local.parquet");
}

#[test]
fn empty_locator_is_rejected() {
    let err = "   ".parse::<Locator>().unwrap_err();
    assert_matches!(err, TripError::InvalidLocator(_));
}

#[test]
fn locator_with_trailing_slash_is_rejected() {
    let err = "https://example.org/data/".parse::<Locator>().unwrap_err();
    assert_matches!(err, TripError::InvalidLocator(_));
}

#[test]
fn naming_is_deterministic() {
    let naming = PartitionNaming::new("LongTrips", "parquet").unwrap();
    assert_eq!(naming.name(0), "LongTrips-0.parquet");
    assert_eq!(naming.name(12), "LongTrips-12.parquet");
    assert_eq!(naming.index_of("LongTrips-12.parquet"), Some(12));
    assert_eq!(naming.index_of("OtherTrips-12.parquet"), None);
    assert_eq!(naming.index_of("LongTrips-x.parquet"), None);
}

#[test]
fn naming_escapes_prefix() {
    let naming = PartitionNaming::new("a.b", "parquet").unwrap();
    assert_eq!(naming.index_of("a.b-1.parquet"), Some(1));
    assert_eq!(naming.index_of("axb-1.parquet"), None);
}
