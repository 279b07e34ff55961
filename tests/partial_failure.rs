//! Fail-fast and best-effort reads over damaged shard sets.

use ironshard::testing::*;
use ironshard::*;
use log::Level;
use std::path::PathBuf;

fn damaged_set(dir: &std::path::Path, corrupt: &[usize]) -> anyhow::Result<(String, Vec<PathBuf>)> {
    let p = dir.join("damaged").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(3);
    let paths = write_dataset(&p, "ids", &ArrayData::Int64((0..9).collect()), &opts)?;
    for &i in corrupt {
        std::fs::write(&paths[i], b"definitely not a shard")?;
    }
    Ok((p, paths))
}

#[test]
fn fail_fast_by_default() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, _) = damaged_set(tmp.path(), &[1])?;
    let err = load_all(&p, &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::Format { .. }));
    Ok(())
}

#[test]
fn allow_errors_skips_and_reports() -> anyhow::Result<()> {
    testing_logger::setup();
    let tmp = tempfile::tempdir()?;
    let (p, paths) = damaged_set(tmp.path(), &[1])?;

    let back = load_all(&p, &ReadOptions::default().allow_errors(true))?;
    assert_same_data(
        back.get("ids").expect("ids"),
        &ArrayData::Int64(vec![0, 1, 2, 6, 7, 8]),
    );

    let report = back.partial_failure().expect("failure report");
    assert_eq!(report.count(), 1);
    let bad = std::fs::canonicalize(&paths[1])?;
    assert!(report.paths().any(|path| std::fs::canonicalize(path).ok().as_ref() == Some(&bad)));
    assert!(report.to_string().starts_with("There were 1 errors reading files on the server."));

    testing_logger::validate(|logs| {
        let warnings: Vec<_> = logs.iter().filter(|l| l.level == Level::Warn).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].body.contains("There were 1 errors"));
    });
    Ok(())
}

#[test]
fn every_shard_failing_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, _) = damaged_set(tmp.path(), &[0, 1, 2])?;
    let err = load_all(&p, &ReadOptions::default().allow_errors(true)).unwrap_err();
    assert!(matches!(err, StoreError::Format { .. }));
    Ok(())
}

#[test]
fn missing_listed_file_is_skipped_when_allowed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (_, paths) = damaged_set(tmp.path(), &[])?;
    let mut sources: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    sources.push(tmp.path().join("gone_LOCALE0003").to_string_lossy().into_owned());

    let err = read(&sources, &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));
    assert!(err.to_string().contains("gone_LOCALE0003"));
    let back = read(&sources, &ReadOptions::default().allow_errors(true))?;
    assert_eq!(back.get("ids").map(ArrayData::len), Some(9));
    assert_eq!(back.partial_failure().map(PartialReadFailure::count), Some(1));
    Ok(())
}

#[test]
fn deleted_shard_of_a_prefix_is_reported() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("holey").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(2);
    let paths = write_dataset(&p, "ids", &ArrayData::Int64((0..10).collect()), &opts)?;
    std::fs::remove_file(&paths[1])?;

    let err = load_all(&p, &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }), "{err}");
    assert!(err.to_string().contains("holey_LOCALE0001"));

    let back = load_all(&p, &ReadOptions::default().allow_errors(true))?;
    assert_eq!(back.get("ids"), Some(&ArrayData::Int64((0..5).collect())));
    assert_eq!(back.partial_failure().map(PartialReadFailure::count), Some(1));
    Ok(())
}

#[test]
fn shards_beyond_the_recorded_count_are_ignored() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let old = tmp.path().join("old").to_string_lossy().into_owned();
    let new = tmp.path().join("new").to_string_lossy().into_owned();
    let wide = WriteOptions::new(FileFormat::Hierarchical).num_locales(4);
    let old_paths = write_dataset(&old, "a", &ArrayData::Int64((0..8).collect()), &wide)?;
    write_dataset(&new, "b", &ArrayData::Int64(vec![1, 2, 3]), &wide.clone().num_locales(2))?;
    std::fs::copy(&old_paths[2], tmp.path().join("new_LOCALE0002"))?;

    let back = load_all(&new, &ReadOptions::default())?;
    assert_eq!(back.names(), vec!["b"]);
    assert_eq!(back.get("b"), Some(&ArrayData::Int64(vec![1, 2, 3])));
    assert!(back.partial_failure().is_none());
    Ok(())
}
