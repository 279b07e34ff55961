//! Legacy (version 0) hierarchical shards.

use ironshard::io::hier::{CURRENT_VERSION, HierShard};
use ironshard::testing::*;
use ironshard::*;

#[test]
fn legacy_shards_read_as_version_zero() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("old").to_string_lossy().into_owned();
    let mut data = Collection::new();
    data.insert("ids", ArrayData::Int64((0..30).collect()));
    data.insert("words", ArrayData::strings(short_strings(30))?);

    let opts = WriteOptions::new(FileFormat::Hierarchical)
        .num_locales(2)
        .legacy(true)
        .save_offsets(false);
    let paths = write_collection(&p, &data, &opts)?;

    let shard = HierShard::open(&paths[1])?;
    assert_eq!(shard.version(), 0);
    assert!(shard.metadata().is_none());
    assert!(ls(&paths[1].to_string_lossy())?.contains("(version 0)"));

    assert_same_collection(&load_all(&p, &ReadOptions::default())?, &data);
    Ok(())
}

#[test]
fn current_shards_carry_metadata() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("new").to_string_lossy().into_owned();
    let paths = write_dataset(
        &p,
        "ids",
        &ArrayData::UInt8(vec![1, 2, 3]),
        &WriteOptions::new(FileFormat::Hierarchical).num_locales(3),
    )?;
    for (locale, path) in paths.iter().enumerate() {
        let meta = HierShard::open(path)?.metadata().cloned().expect("metadata");
        assert_eq!(meta.version, CURRENT_VERSION);
        assert_eq!(meta.locale as usize, locale);
        assert_eq!(meta.num_locales, 3);
    }
    Ok(())
}

#[test]
fn legacy_and_current_shards_mix() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let old = tmp.path().join("mix_old").to_string_lossy().into_owned();
    let new = tmp.path().join("mix_new").to_string_lossy().into_owned();
    let words = ArrayData::strings(["alpha", "beta"])?;
    write_dataset(&old, "w", &words, &WriteOptions::new(FileFormat::Hierarchical).legacy(true))?;
    write_dataset(&new, "w", &words, &WriteOptions::new(FileFormat::Hierarchical))?;

    let pattern = tmp.path().join("mix_*_LOCALE*").to_string_lossy().into_owned();
    let back = read(&[pattern], &ReadOptions::default())?;
    assert_eq!(
        back.get("w").and_then(ArrayData::as_strings).map(Strings::to_vec),
        Some(vec!["alpha".to_owned(), "beta".to_owned(), "alpha".to_owned(), "beta".to_owned()])
    );
    Ok(())
}

#[test]
fn legacy_shards_cannot_hold_lists() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("old_lists").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).legacy(true);
    assert!(matches!(
        write_dataset(&p, "l", &ragged_lists(3), &opts),
        Err(StoreError::InvalidArgument(_))
    ));
    Ok(())
}
