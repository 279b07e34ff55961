//! String datasets: stored offsets, recomputed offsets and group members.

use ironshard::testing::*;
use ironshard::*;

fn write_strings(prefix: &str, entries: &[String], locales: usize, save_offsets: bool) -> anyhow::Result<()> {
    let opts = WriteOptions::new(FileFormat::Hierarchical)
        .num_locales(locales)
        .save_offsets(save_offsets);
    write_dataset(prefix, "strings", &ArrayData::strings(entries)?, &opts)?;
    Ok(())
}

fn read_strings(prefix: &str, calc: bool) -> anyhow::Result<Vec<String>> {
    let opts = ReadOptions::default().calc_string_offsets(calc);
    let data = load(prefix, "strings", &opts)?;
    Ok(data.as_strings().map(Strings::to_vec).unwrap_or_default())
}

#[test]
fn short_and_long_strings_on_one_and_many_shards() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    for (label, entries) in [("short", short_strings(25)), ("long", long_strings(26))] {
        for locales in [1, 3] {
            for save in [true, false] {
                for calc in [true, false] {
                    let p = tmp
                        .path()
                        .join(format!("{label}_{locales}_{save}_{calc}"))
                        .to_string_lossy()
                        .into_owned();
                    write_strings(&p, &entries, locales, save)?;
                    assert_eq!(
                        read_strings(&p, calc)?,
                        entries,
                        "{label} locales={locales} save={save} calc={calc}"
                    );
                }
            }
        }
    }
    Ok(())
}

#[test]
fn empty_entries_are_preserved() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("empties").to_string_lossy().into_owned();
    let entries: Vec<String> = ["", "a", "", "", "bc", ""].map(String::from).to_vec();
    write_strings(&p, &entries, 4, false)?;
    assert_eq!(read_strings(&p, false)?, entries);
    Ok(())
}

#[test]
fn group_members_are_addressable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("members").to_string_lossy().into_owned();
    let entries: Vec<String> = ["ab", "c"].map(String::from).to_vec();
    write_strings(&p, &entries, 1, true)?;

    let opts = ReadOptions::default().datasets(["strings/values", "strings/segments"]);
    let back = read(&[&p], &opts)?;
    assert_eq!(back.get("strings/values"), Some(&ArrayData::UInt8(b"ab\0c\0".to_vec())));
    assert_eq!(back.get("strings/segments"), Some(&ArrayData::Int64(vec![0, 3])));
    Ok(())
}

#[test]
fn nul_in_entry_is_rejected() {
    assert!(matches!(
        ArrayData::strings(["ok", "bad\0"]),
        Err(StoreError::InvalidArgument(_))
    ));
}
