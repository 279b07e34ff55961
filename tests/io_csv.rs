//! Delimited text shards.

use ironshard::testing::*;
use ironshard::*;

#[test]
fn csv_roundtrip_with_header_block() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("table.csv").to_string_lossy().into_owned();
    let data = dict_columns(31);

    let paths = write_collection(&p, &data, &WriteOptions::new(FileFormat::Delimited).num_locales(3))?;
    assert!(paths[2].to_string_lossy().ends_with("table_LOCALE0002.csv"));
    let text = std::fs::read_to_string(&paths[0])?;
    assert!(text.starts_with("**HEADER**\nint64,uint64,float64,str\n*/HEADER/*\n"));

    assert_same_collection(&read_csv(&[&p], &ReadOptions::default())?, &data);
    Ok(())
}

#[test]
fn custom_delimiter() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("piped.txt").to_string_lossy().into_owned();
    let mut data = Collection::new();
    data.insert("a", ArrayData::Int32(vec![1, 2, 3]));
    data.insert("b", ArrayData::strings(["x,y", "z", ""])?);

    write_collection(&p, &data, &WriteOptions::new(FileFormat::Delimited).delimiter("|"))?;
    let back = load_all(&p, &ReadOptions::default().delimiter("|"))?;
    assert_same_collection(&back, &data);
    Ok(())
}

#[test]
fn headerless_files_read_as_strings() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("export.csv");
    std::fs::write(&path, "id,name\n1,ann\n2,bob\n")?;
    let src = path.to_string_lossy().into_owned();

    let back = load_all(&src, &ReadOptions::default())?;
    assert_eq!(
        back.get("id").and_then(ArrayData::as_strings).map(Strings::to_vec),
        Some(vec!["1".to_owned(), "2".to_owned()])
    );
    assert!(ls(&src)?.contains("(no header)"));
    Ok(())
}

#[test]
fn csv_rejects_lists_and_append() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("nope.csv").to_string_lossy().into_owned();
    let opts = WriteOptions::new(FileFormat::Delimited);

    assert!(matches!(
        write_dataset(&p, "l", &ragged_lists(4), &opts),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        write_dataset(&p, "a", &ArrayData::Int64(vec![1]), &opts.clone().append()),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(!tmp.path().join("nope_LOCALE0000.csv").exists());
    Ok(())
}

#[test]
fn bad_field_is_a_format_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("typed.csv");
    std::fs::write(&path, "**HEADER**\nint64\n*/HEADER/*\nn\n1\nseven\n")?;
    assert!(matches!(
        load(&path.to_string_lossy(), "n", &ReadOptions::default()),
        Err(StoreError::Format { .. })
    ));
    Ok(())
}

#[test]
fn subset_of_columns() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("subset.csv").to_string_lossy().into_owned();
    write_collection(&p, &dict_columns(9), &WriteOptions::new(FileFormat::Delimited).num_locales(2))?;

    let back = read_csv(&[&p], &ReadOptions::default().datasets(["float_col", "int_col"]))?;
    assert_eq!(back.names(), vec!["float_col", "int_col"]);
    assert_eq!(back.get("int_col"), dict_columns(9).get("int_col"));
    Ok(())
}

#[test]
fn multi_character_delimiter_through_glob() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("non_standard_delim").to_string_lossy().into_owned();
    let data = dict_columns(12);
    let opts = WriteOptions::new(FileFormat::Delimited).num_locales(2).delimiter("|*|");
    let paths = write_collection(&p, &data, &opts)?;
    let text = std::fs::read_to_string(&paths[0])?;
    assert!(text.starts_with("**HEADER**\nint64|*|uint64|*|float64|*|str\n*/HEADER/*\n"));

    let pattern = format!("{p}*");
    let read_opts = ReadOptions::default().delimiter("|*|");
    assert_same_collection(&read_csv(&[&pattern], &read_opts)?, &data);

    let one = read_csv(&[&pattern], &read_opts.dataset("str_col"))?;
    assert_eq!(one.names(), vec!["str_col"]);
    assert_eq!(one.get("str_col"), data.get("str_col"));
    Ok(())
}
