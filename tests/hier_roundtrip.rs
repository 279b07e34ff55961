//! Round trips through the hierarchical container across locale counts.

use ironshard::testing::*;
use ironshard::*;
use std::path::Path;

fn prefix(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[test]
fn dict_columns_survive_any_locale_count() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data = dict_columns(100);

    for n in [1, 3, 4, 7] {
        let p = prefix(tmp.path(), &format!("dict_{n}"));
        let written = write_collection(&p, &data, &WriteOptions::new(FileFormat::Hierarchical).num_locales(n))?;
        assert_eq!(written.len(), n);

        let back = load_all(&p, &ReadOptions::default())?;
        assert_same_collection(&back, &data);
        assert!(back.partial_failure().is_none());
    }
    Ok(())
}

#[test]
fn remainder_goes_to_leading_shards() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "uneven");
    let ids = ArrayData::Int64((0..10).collect());
    let paths = write_dataset(&p, "ids", &ids, &WriteOptions::new(FileFormat::Hierarchical).num_locales(4))?;

    let lens = paths
        .iter()
        .map(|path| Ok(load(&path.to_string_lossy(), "ids", &ReadOptions::default())?.len()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    assert_eq!(lens, vec![3, 3, 2, 2]);
    Ok(())
}

#[test]
fn more_locales_than_elements_writes_empty_shards() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "sparse");
    let mut data = Collection::new();
    data.insert("a", ArrayData::UInt32(vec![7, 9]));
    data.insert("s", ArrayData::strings(["x", "yz"])?);
    let paths = write_collection(&p, &data, &WriteOptions::new(FileFormat::Hierarchical).num_locales(5))?;
    assert!(paths.iter().all(|path| path.exists()));

    let back = load_all(&p, &ReadOptions::default())?;
    assert_same_collection(&back, &data);

    let last = read(&[paths[4].to_string_lossy()], &ReadOptions::default())?;
    assert_eq!(last.get("a").map(ArrayData::len), Some(0));
    assert_eq!(last.get("s").map(ArrayData::len), Some(0));
    Ok(())
}

#[test]
fn lists_and_scalars_roundtrip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "lists");
    let mut data = Collection::new();
    data.insert("ragged", ragged_lists(17));
    data.insert("flags", ArrayData::Bool((0..17).map(|i| i % 3 == 0).collect()));
    data.insert("small", ArrayData::Int8((0..17).map(|i| i - 8).collect()));
    data.insert("f32", ArrayData::Float32((0..17).map(|i| i as f32 * 0.5).collect()));

    write_collection(&p, &data, &WriteOptions::new(FileFormat::Hierarchical).num_locales(3))?;
    let back = load_all(&p, &ReadOptions::default())?;
    assert_same_collection(&back, &data);
    Ok(())
}

#[test]
fn block_filters_are_transparent() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data = dict_columns(500);
    let mut filters = vec![BlockFilter::None];
    #[cfg(feature = "compression-gzip")]
    filters.push(BlockFilter::Gzip);
    #[cfg(feature = "compression-zstd")]
    filters.push(BlockFilter::Zstd);
    for filter in filters {
        let p = prefix(tmp.path(), &format!("filtered_{}", filter.name()));
        let opts = WriteOptions::new(FileFormat::Hierarchical)
            .num_locales(2)
            .block_filter(filter);
        write_collection(&p, &data, &opts)?;
        assert_same_collection(&load_all(&p, &ReadOptions::default())?, &data);
    }
    Ok(())
}

#[test]
fn partitioned_write_allows_missing_datasets() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "parts");
    let first: Collection = [
        ("a", ArrayData::Int64(vec![1, 2])),
        ("b", ArrayData::Float64(vec![0.5])),
    ]
    .into_iter()
    .collect();
    let second: Collection = [("a", ArrayData::Int64(vec![3]))].into_iter().collect();

    write_partitioned(&p, &[first, second], &WriteOptions::new(FileFormat::Hierarchical))?;
    let back = load_all(&p, &ReadOptions::default())?;
    assert_eq!(back.get("a"), Some(&ArrayData::Int64(vec![1, 2, 3])));
    assert_eq!(back.get("b"), Some(&ArrayData::Float64(vec![0.5])));
    Ok(())
}

#[test]
fn selected_datasets_only() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "select");
    write_collection(&p, &dict_columns(12), &WriteOptions::new(FileFormat::Hierarchical).num_locales(2))?;

    let back = read(&[&p], &ReadOptions::default().datasets(["str_col", "int_col"]))?;
    assert_eq!(back.names(), vec!["str_col", "int_col"]);

    let err = read(&[&p], &ReadOptions::default().dataset("nope")).unwrap_err();
    assert!(matches!(err, StoreError::DatasetNotFound { .. }));
    Ok(())
}

#[test]
fn listing_and_dataset_names() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "listed");
    write_collection(&p, &dict_columns(8), &WriteOptions::new(FileFormat::Hierarchical).num_locales(2))?;

    let names = get_datasets(&p, &ReadOptions::default())?;
    assert_eq!(names, vec!["int_col", "uint_col", "float_col", "str_col"]);

    let text = ls(&p)?;
    assert!(text.contains("hierarchical (version 1, locale 0 of 2"));
    assert!(text.contains("str_col"));
    assert!(text.contains("int64"));

    assert!(matches!(ls(""), Err(StoreError::InvalidArgument(_))));
    assert!(matches!(
        ls(&prefix(tmp.path(), "missing")),
        Err(StoreError::Io { .. })
    ));
    Ok(())
}

#[test]
fn rejects_bad_write_arguments() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "bad");
    let data = dict_columns(3);
    let opts = WriteOptions::new(FileFormat::Hierarchical);

    assert!(matches!(write_collection("  ", &data, &opts), Err(StoreError::InvalidArgument(_))));
    assert!(matches!(
        write_collection(&p, &Collection::new(), &opts),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        write_collection(&p, &data, &opts.clone().num_locales(0)),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        write_dataset(&p, "a/b", &ArrayData::Int64(vec![1]), &opts),
        Err(StoreError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn extremes_and_odd_names_roundtrip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut data = Collection::new();
    data.insert("u64 \"max\"", ArrayData::UInt64(vec![0, u64::MAX, u64::MAX - 1]));
    data.insert("i64's", ArrayData::Int64(vec![i64::MIN, -1, i64::MAX]));
    data.insert("u8", ArrayData::UInt8(vec![0, 128, u8::MAX]));
    data.insert("i16", ArrayData::Int16(vec![i16::MIN, 0, i16::MAX]));
    data.insert("u32", ArrayData::UInt32(vec![u32::MAX, 1, 0]));
    data.insert("f64", ArrayData::Float64(vec![f64::MAX, f64::MIN_POSITIVE, -0.0]));

    for format in [FileFormat::Hierarchical, FileFormat::Columnar] {
        let p = prefix(tmp.path(), &format!("extremes_{format}"));
        write_collection(&p, &data, &WriteOptions::new(format).num_locales(2))?;
        assert_same_collection(&load_all(&p, &ReadOptions::default())?, &data);
    }
    Ok(())
}

#[test]
fn listing_is_stable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "stable");
    let paths = write_collection(&p, &dict_columns(5), &WriteOptions::new(FileFormat::Hierarchical))?;
    let shard = paths[0].to_string_lossy();
    assert_eq!(ls(&shard)?, ls(&shard)?);
    assert_eq!(
        get_datasets(&shard, &ReadOptions::default())?,
        get_datasets(&shard, &ReadOptions::default())?
    );
    Ok(())
}

#[test]
fn multi_dimensional_roundtrip_in_append_mode() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = prefix(tmp.path(), "multi_dim_test");
    let cube = [3u64, 3, 3];
    let mut data = Collection::new();
    data.insert_shaped("MultiDimObj", ArrayData::Int64((0..27).collect()), cube.to_vec())?;

    let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(2).append();
    write_collection(&p, &data, &opts)?;
    let pattern = format!("{p}*");
    let back = read_hierarchical(&[&pattern], &ReadOptions::default().dataset("MultiDimObj"))?;
    assert_eq!(back.get("MultiDimObj"), data.get("MultiDimObj"));
    assert_eq!(back.shape("MultiDimObj"), Some(&cube[..]));

    write_dataset(&p, "flat", &ArrayData::Float64(vec![0.5; 4]), &opts)?;
    let all = load_all(&p, &ReadOptions::default())?;
    assert_eq!(all.shape("MultiDimObj"), Some(&cube[..]));
    assert_eq!(all.shape("flat"), None);
    assert!(ls(&format!("{p}_LOCALE0000"))?.contains("shape [3, 3, 3]"));
    Ok(())
}

#[test]
fn shapes_are_validated() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut data = Collection::new();
    assert!(matches!(
        data.insert_shaped("m", ArrayData::Int64((0..6).collect()), vec![4, 2]),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        data.insert_shaped("s", ArrayData::strings(["a", "b"])?, vec![2]),
        Err(StoreError::InvalidArgument(_))
    ));
    data.insert_shaped("m", ArrayData::Int64((0..6).collect()), vec![2, 3])?;

    let p = prefix(tmp.path(), "shaped_parquet");
    assert!(matches!(
        write_collection(&p, &data, &WriteOptions::new(FileFormat::Columnar)),
        Err(StoreError::InvalidArgument(_))
    ));

    data.insert("m", ArrayData::Int64(vec![1]));
    assert_eq!(data.shape("m"), None);
    Ok(())
}
