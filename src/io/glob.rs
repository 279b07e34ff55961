//! Shard path resolution.
//!
//! Every locale writes its own shard named `<prefix>_LOCALE<NNNN>[.ext]`. This
//! module turns what a caller hands us (a prefix, a glob, or an explicit list)
//! into the ordered list of shard files to read.
//!
//! # Ordering
//!
//! - Prefix expansion yields the shards of exactly one *family* ordered by
//!   locale index.
//! - Glob expansion yields every match ordered by `(family, locale, name)`.
//! - Explicit lists keep the caller's order, minus duplicates.
//!
//! A family is a file name with the `_LOCALE####` marker removed, so
//! `data_LOCALE0000.csv` and `data_LOCALE0000.parquet` are different families.
//!
//! ```no_run
//! use ironshard::io::glob::{resolve_prefix, shard_path};
//!
//! assert_eq!(
//!     shard_path("out/data", 3, None).to_string_lossy(),
//!     "out/data_LOCALE0003"
//! );
//! let shards = resolve_prefix("out/data")?;
//! # Ok::<(), ironshard::StoreError>(())
//! ```

use crate::error::{Result, StoreError};
use glob::{MatchOptions, Pattern, glob_with};
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static LOCALE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)_LOCALE(\d{4,})(.*)$").unwrap_or_else(|e| panic!("locale regex: {e}"))
});

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Expand a glob pattern into a sorted vector of matching files.
///
/// Directories are skipped. An empty match is not an error here; see
/// [`expand_glob_required`].
///
/// # Errors
/// Returns [`StoreError::InvalidArgument`] for a malformed pattern and
/// [`StoreError::Io`] when a directory cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob_with(pattern, GLOB_OPTIONS)
        .map_err(|e| StoreError::invalid(format!("invalid glob pattern {pattern:?}: {e}")))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            StoreError::io(path, e.into_error())
        })?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Like [`expand_glob`] but zero matches is [`StoreError::NotFound`].
///
/// # Errors
/// See [`expand_glob`].
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        return Err(StoreError::NotFound {
            pattern: pattern.to_owned(),
        });
    }
    Ok(files)
}

/// Whether `s` contains glob metacharacters.
#[must_use]
pub fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// `<prefix>_LOCALE<locale:04>` followed by `ext` (which should include its
/// leading dot).
#[must_use]
pub fn shard_path(prefix: impl AsRef<Path>, locale: usize, ext: Option<&str>) -> PathBuf {
    let mut name = prefix.as_ref().as_os_str().to_os_string();
    name.push(format!("_LOCALE{locale:04}"));
    if let Some(ext) = ext {
        name.push(ext);
    }
    PathBuf::from(name)
}

/// Split `name.csv` into (`name`, `Some(".csv")`). Only the final component is
/// examined, and dotfiles keep their leading dot.
#[must_use]
pub fn split_extension(path: &Path) -> (PathBuf, Option<String>) {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => (path.with_extension(""), Some(format!(".{ext}"))),
        _ => (path.to_path_buf(), None),
    }
}

/// Locale index encoded in a shard file name.
#[must_use]
pub fn locale_index(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    LOCALE_MARKER.captures(name)?.get(2)?.as_str().parse().ok()
}

/// `path` with its locale marker rewritten to `locale`.
#[must_use]
pub fn with_locale(path: &Path, locale: usize) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let caps = LOCALE_MARKER.captures(name)?;
    Some(path.with_file_name(format!("{}_LOCALE{locale:04}{}", &caps[1], &caps[3])))
}

/// The family of a shard: its full path with the locale marker removed.
/// Files without a marker are their own family.
#[must_use]
pub fn family(path: &Path) -> String {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_string_lossy().into_owned();
    };
    let stem = LOCALE_MARKER
        .captures(name)
        .map_or_else(|| name.to_owned(), |c| format!("{}{}", &c[1], &c[3]));
    path.with_file_name(stem).to_string_lossy().into_owned()
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn sort_key(path: &Path) -> (String, usize, PathBuf) {
    (
        family(path),
        locale_index(path).unwrap_or(usize::MAX),
        path.to_path_buf(),
    )
}

fn families(paths: &[PathBuf]) -> Vec<String> {
    let mut out: Vec<String> = paths.iter().map(|p| family(p)).collect();
    out.sort();
    out.dedup();
    out
}

fn reject_blank(input: &str) -> Result<()> {
    if input.trim().is_empty() {
        return Err(StoreError::invalid("path must not be empty"));
    }
    Ok(())
}

/// Files named `<prefix>_LOCALE####<ext>`; any suffix when `ext` is `None`.
fn prefix_matches(prefix: &Path, ext: Option<&str>) -> Result<Vec<PathBuf>> {
    let stem = prefix
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let pattern = format!(
        "{}_LOCALE*{}",
        Pattern::escape(&prefix.to_string_lossy()),
        ext.map(Pattern::escape).unwrap_or_default()
    );
    Ok(expand_glob(&pattern)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| LOCALE_MARKER.captures(n))
                .is_some_and(|c| &c[1] == stem && ext.is_none_or(|e| &c[3] == e))
        })
        .collect())
}

/// Expand a prefix to the shards of the single family it names.
///
/// An existing file at `prefix` itself is returned as the only shard. A
/// prefix with an extension (`name.csv`) also matches `name_LOCALE####.csv`.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for a blank prefix,
/// [`StoreError::NotFound`] when nothing matches, and
/// [`StoreError::AmbiguousPattern`] when matches span several families
/// (e.g. `data_LOCALE0000.csv` next to `data_LOCALE0000.parquet`).
pub fn resolve_prefix(prefix: &str) -> Result<Vec<PathBuf>> {
    reject_blank(prefix)?;
    let exact = Path::new(prefix);
    if exact.is_file() {
        return Ok(vec![absolute(exact.to_path_buf())]);
    }

    let mut matches = prefix_matches(exact, None)?;
    if matches.is_empty()
        && let (stem, Some(ext)) = split_extension(exact)
    {
        matches = prefix_matches(&stem, Some(&ext))?;
    }

    if matches.is_empty() {
        return Err(StoreError::NotFound {
            pattern: prefix.to_owned(),
        });
    }
    let found = families(&matches);
    if found.len() > 1 {
        return Err(StoreError::AmbiguousPattern {
            pattern: prefix.to_owned(),
            families: found,
        });
    }
    matches.sort_by_key(|p| sort_key(p));
    debug!("resolved prefix {prefix} to {} shard(s)", matches.len());
    Ok(matches.into_iter().map(absolute).collect())
}

/// The `n` shard paths a write of `n` locales under `prefix` produces,
/// whether or not they exist yet.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for a blank prefix or `n == 0`.
pub fn resolve_expected(prefix: &str, n: usize, ext: Option<&str>) -> Result<Vec<PathBuf>> {
    reject_blank(prefix)?;
    if n == 0 {
        return Err(StoreError::invalid("expected shard count must be positive"));
    }
    Ok((0..n)
        .map(|locale| absolute(shard_path(prefix, locale, ext)))
        .collect())
}

/// Existing shards named exactly `<prefix>_LOCALE####<ext>` whose locale is
/// `n` or higher.
///
/// # Errors
/// As for [`expand_glob`].
pub fn surplus_shards(prefix: &Path, ext: Option<&str>, n: usize) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = prefix_matches(prefix, Some(ext.unwrap_or_default()))?
        .into_iter()
        .filter(|p| locale_index(p).is_some_and(|i| i >= n))
        .map(absolute)
        .collect();
    out.sort_by_key(|p| locale_index(p));
    Ok(out)
}

/// Expand a glob into every matching shard ordered by family, then locale.
///
/// # Errors
/// [`StoreError::NotFound`] on zero matches; with `single_family`,
/// [`StoreError::AmbiguousPattern`] when the matches span several families.
pub fn resolve_glob(pattern: &str, single_family: bool) -> Result<Vec<PathBuf>> {
    reject_blank(pattern)?;
    let mut matches = expand_glob_required(pattern)?;
    if single_family {
        let found = families(&matches);
        if found.len() > 1 {
            return Err(StoreError::AmbiguousPattern {
                pattern: pattern.to_owned(),
                families: found,
            });
        }
    }
    matches.sort_by_key(|p| sort_key(p));
    debug!("resolved glob {pattern} to {} file(s)", matches.len());
    Ok(matches.into_iter().map(absolute).collect())
}

/// Resolve the sources of a read.
///
/// A single source that is neither a glob nor an existing file is treated as
/// a prefix. In a list, glob entries are expanded in place, literal entries
/// are kept as given (even if missing) and duplicates are dropped.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for an empty list or a blank entry, plus
/// the errors of [`resolve_prefix`] and [`resolve_glob`].
pub fn resolve_sources<S: AsRef<str>>(sources: &[S], single_family: bool) -> Result<Vec<PathBuf>> {
    match sources {
        [] => Err(StoreError::invalid("no paths given")),
        [one] => {
            let one = one.as_ref();
            reject_blank(one)?;
            if is_glob(one) {
                resolve_glob(one, single_family)
            } else {
                resolve_prefix(one)
            }
        }
        many => {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for source in many {
                let source = source.as_ref();
                reject_blank(source)?;
                let expanded = if is_glob(source) {
                    resolve_glob(source, false)?
                } else {
                    vec![absolute(PathBuf::from(source))]
                };
                out.extend(expanded.into_iter().filter(|p| seen.insert(p.clone())));
            }
            if single_family {
                let found = families(&out);
                if found.len() > 1 {
                    return Err(StoreError::AmbiguousPattern {
                        pattern: many.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", "),
                        families: found,
                    });
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_names_are_zero_padded() {
        assert_eq!(shard_path("a/b", 7, None), PathBuf::from("a/b_LOCALE0007"));
        assert_eq!(
            shard_path("a/b", 12, Some(".csv")),
            PathBuf::from("a/b_LOCALE0012.csv")
        );
    }

    #[test]
    fn family_strips_locale_marker() {
        assert_eq!(family(Path::new("/d/x_LOCALE0001.csv")), "/d/x.csv");
        assert_eq!(family(Path::new("/d/x_dupe_LOCALE0001")), "/d/x_dupe");
        assert_eq!(locale_index(Path::new("/d/x_LOCALE0012")), Some(12));
        assert_eq!(locale_index(Path::new("/d/plain.parquet")), None);
    }

    #[test]
    fn split_extension_handles_missing_ext() {
        let (stem, ext) = split_extension(Path::new("out/data.csv"));
        assert_eq!(stem, PathBuf::from("out/data"));
        assert_eq!(ext.as_deref(), Some(".csv"));
        assert_eq!(split_extension(Path::new("out/data")).1, None);
    }

    #[test]
    fn blank_inputs_are_rejected() {
        assert!(matches!(resolve_prefix("  "), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(
            resolve_sources::<&str>(&[], false),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn with_locale_keeps_family() {
        assert_eq!(
            with_locale(Path::new("/d/x_LOCALE0001.csv"), 12),
            Some(PathBuf::from("/d/x_LOCALE0012.csv"))
        );
        assert_eq!(with_locale(Path::new("/d/plain"), 0), None);
    }

    #[test]
    fn surplus_shards_stay_within_the_family() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["s_LOCALE0000", "s_LOCALE0001", "s_LOCALE0002", "s_LOCALE0003.csv", "s_x_LOCALE0005"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = surplus_shards(&dir.path().join("s"), None, 1).unwrap();
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert_eq!(names, vec!["s_LOCALE0001", "s_LOCALE0002"]);
    }
}
