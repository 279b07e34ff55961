//! Appending datasets to existing shards.

use ironshard::testing::*;
use ironshard::*;

#[test]
fn append_adds_datasets_to_every_shard() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for format in [FileFormat::Hierarchical, FileFormat::Columnar] {
        let p = tmp.path().join(format!("app_{format}")).to_string_lossy().into_owned();
        let opts = WriteOptions::new(format).num_locales(3);
        let ids = ArrayData::Int64((0..20).collect());
        let names = ArrayData::strings(short_strings(20))?;

        write_dataset(&p, "ids", &ids, &opts)?;
        write_dataset(&p, "names", &names, &opts.clone().append())?;

        let back = load_all(&p, &ReadOptions::default())?;
        assert_eq!(back.names(), vec!["ids", "names"]);
        assert_same_data(back.get("ids").expect("ids"), &ids);
        assert_same_data(back.get("names").expect("names"), &names);
    }
    Ok(())
}

#[test]
fn append_creates_missing_shards() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("fresh").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(2).append();
    write_dataset(&p, "a", &ArrayData::Bool(vec![true, false, true]), &opts)?;
    assert_eq!(
        load(&p, "a", &ReadOptions::default())?,
        ArrayData::Bool(vec![true, false, true])
    );
    Ok(())
}

#[test]
fn existing_name_collides() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("dup").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(2);
    let data = ArrayData::Float64(vec![1.0, 2.0, 3.0]);
    write_dataset(&p, "v", &data, &opts)?;

    let err = write_dataset(&p, "v", &data, &opts.clone().append()).unwrap_err();
    assert!(matches!(err, StoreError::DatasetNameCollision { .. }));
    assert_eq!(load(&p, "v", &ReadOptions::default())?, data);
    Ok(())
}

#[test]
fn locale_count_must_match() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("count").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(2);
    write_dataset(&p, "a", &ArrayData::Int64(vec![1, 2]), &opts)?;

    let err = write_dataset(&p, "b", &ArrayData::Int64(vec![1, 2]), &opts.num_locales(3).append())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    Ok(())
}

#[test]
fn truncate_replaces_contents() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("trunc").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(2);
    write_dataset(&p, "a", &ArrayData::Int64(vec![1, 2]), &opts)?;
    write_dataset(&p, "b", &ArrayData::Int64(vec![3, 4]), &opts)?;
    assert_eq!(get_datasets(&p, &ReadOptions::default())?, vec!["b"]);
    Ok(())
}

#[test]
fn truncate_to_fewer_locales_removes_surplus_shards() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("shrink").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Hierarchical);
    write_dataset(&p, "a", &ArrayData::Int64((0..8).collect()), &opts.clone().num_locales(4))?;
    write_dataset(&p, "b", &ArrayData::Int64(vec![9, 10]), &opts.num_locales(2))?;

    assert!(!tmp.path().join("shrink_LOCALE0002").exists());
    assert!(!tmp.path().join("shrink_LOCALE0003").exists());
    let back = load_all(&p, &ReadOptions::default())?;
    assert_eq!(back.names(), vec!["b"]);
    assert_eq!(back.get("b"), Some(&ArrayData::Int64(vec![9, 10])));
    Ok(())
}
