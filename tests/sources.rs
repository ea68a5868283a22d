use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use long_trips::error::TripError;
use long_trips::sources::SourceList;

fn write_list(content: &str) -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("selected_data_urls.txt")).unwrap();
    std::fs::write(path.as_std_path(), content).unwrap();
    (temp, path)
}

#[test]
fn yields_trimmed_locators_in_order() {
    let (_temp, path) = write_list(
        "https://example.org/a.parquet\n  https://example.org/b.parquet  \r\nhttps://example.org/c.parquet",
    );
    let names = SourceList::open(&path)
        .unwrap()
        .map(|locator| locator.unwrap().file_name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["a.parquet", "b.parquet", "c.parquet"]);
}

#[test]
fn skips_blank_lines() {
    let (_temp, path) = write_list("\nhttps://example.org/a.parquet\n   \n\nhttps://example.org/b.parquet\n\n");
    let count = SourceList::open(&path).unwrap().count();
    assert_eq!(count, 2);
}

#[test]
fn empty_file_yields_nothing() {
    let (_temp, path) = write_list("");
    assert_eq!(SourceList::open(&path).unwrap().count(), 0);
}

#[test]
fn missing_file_is_a_configuration_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("absent.txt")).unwrap();
    let err = SourceList::open(&path).err().unwrap();
    assert_matches!(err, TripError::MissingSourceList(_));
}

#[test]
fn invalid_line_surfaces_as_error() {
    let (_temp, path) = write_list("https://example.org/a.parquet\nhttps://example.org/dir/\n");
    let items = SourceList::open(&path).unwrap().collect::<Vec<_>>();
    assert!(items[0].is_ok());
    assert_matches!(items[1], Err(TripError::InvalidLocator(_)));
}
