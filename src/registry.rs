//! Union of datasets across the shards of one read.

use crate::dtype::DType;
use crate::error::{Result, StoreError};
use crate::io::DatasetInfo;
use crate::reconcile::{Strictness, reconcile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One dataset as declared by one shard.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Position of the shard in the resolved path list.
    pub shard: usize,
    pub path: PathBuf,
    pub info: DatasetInfo,
}

#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub name: String,
    pub observations: Vec<Observation>,
}

impl DatasetEntry {
    /// Sum of the per-shard lengths.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.observations.iter().map(|o| o.info.len).sum()
    }

    /// Shape recorded by the shards, with the path of the first shard that
    /// recorded it.
    ///
    /// # Errors
    /// [`StoreError::Format`] when two shards record different shapes.
    pub fn shape(&self) -> Result<Option<(&Path, &[u64])>> {
        let mut found: Option<(&Path, &[u64])> = None;
        for obs in &self.observations {
            let Some(shape) = obs.info.shape.as_deref() else {
                continue;
            };
            match found {
                Some((first, seen)) if seen != shape => {
                    return Err(StoreError::format(
                        &obs.path,
                        format!(
                            "{} has shape {shape:?} here but {seen:?} in {}",
                            self.name,
                            first.display()
                        ),
                    ));
                }
                Some(_) => {}
                None => found = Some((obs.path.as_path(), shape)),
            }
        }
        Ok(found)
    }
}

/// Dataset names in order of first appearance, each with its per-shard
/// observations in shard order.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    entries: Vec<DatasetEntry>,
    index: HashMap<String, usize>,
}

impl DatasetRegistry {
    /// Build from per-shard listings. `shards` holds `(position, path,
    /// datasets)` in resolved order.
    ///
    /// # Errors
    /// [`StoreError::TypeStrictness`] when two shards declare one dataset
    /// with different element kinds.
    pub fn build(shards: Vec<(usize, PathBuf, Vec<DatasetInfo>)>) -> Result<Self> {
        let mut registry = Self::default();
        for (shard, path, infos) in shards {
            for info in infos {
                registry.observe(Observation {
                    shard,
                    path: path.clone(),
                    info,
                })?;
            }
        }
        Ok(registry)
    }

    fn observe(&mut self, obs: Observation) -> Result<()> {
        let name = obs.info.name.clone();
        let Some(&i) = self.index.get(&name) else {
            self.index.insert(name.clone(), self.entries.len());
            self.entries.push(DatasetEntry {
                name,
                observations: vec![obs],
            });
            return Ok(());
        };
        let entry = &mut self.entries[i];
        if let (Some(new), Some(seen)) = (
            obs.info.dtype,
            entry.observations.iter().find_map(|o| o.info.dtype),
        ) && !new.same_family(seen)
        {
            return Err(StoreError::TypeStrictness {
                dataset: name,
                detail: format!(
                    "{} declares {new} but {} declares {seen}",
                    obs.path.display(),
                    entry.observations[0].path.display()
                ),
            });
        }
        entry.observations.push(obs);
        Ok(())
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DatasetEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetEntry> {
        self.entries.iter()
    }

    /// Reconciled logical type of `name`.
    ///
    /// # Errors
    /// [`StoreError::DatasetNotFound`] for an unregistered name,
    /// [`StoreError::Format`] when a shard stores it in an unsupported
    /// physical type, and the errors of [`reconcile`].
    pub fn resolve_dtype(&self, name: &str, strictness: Strictness) -> Result<DType> {
        let entry = self.get(name).ok_or_else(|| StoreError::DatasetNotFound {
            dataset: name.to_owned(),
            location: "any shard".to_owned(),
        })?;
        let observed = entry
            .observations
            .iter()
            .map(|o| {
                o.info.dtype.ok_or_else(|| {
                    StoreError::format(&o.path, format!("column {name:?} has an unsupported type"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        reconcile(name, &observed, strictness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ScalarType;

    fn info(name: &str, dtype: DType, len: u64) -> DatasetInfo {
        DatasetInfo::new(name, dtype, len)
    }

    #[test]
    fn union_keeps_first_appearance_order() {
        let reg = DatasetRegistry::build(vec![
            (0, "a".into(), vec![info("x", ScalarType::Int64.into(), 3)]),
            (
                1,
                "b".into(),
                vec![
                    info("y", DType::Str, 2),
                    info("x", ScalarType::Int64.into(), 4),
                ],
            ),
        ])
        .unwrap();
        assert_eq!(reg.names(), vec!["x", "y"]);
        assert_eq!(reg.get("x").unwrap().total_len(), 7);
        assert_eq!(reg.get("y").unwrap().observations[0].shard, 1);
    }

    #[test]
    fn kind_mismatch_is_rejected_at_registration() {
        let err = DatasetRegistry::build(vec![
            (0, "a".into(), vec![info("x", ScalarType::Int64.into(), 1)]),
            (1, "b".into(), vec![info("x", DType::Str, 1)]),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::TypeStrictness { .. }));
    }

    #[test]
    fn width_mismatch_depends_on_strictness() {
        let reg = DatasetRegistry::build(vec![
            (0, "a".into(), vec![info("x", ScalarType::Float32.into(), 1)]),
            (1, "b".into(), vec![info("x", ScalarType::Float64.into(), 1)]),
        ])
        .unwrap();
        assert!(reg.resolve_dtype("x", Strictness::Strict).is_err());
        assert_eq!(
            reg.resolve_dtype("x", Strictness::Relaxed).unwrap(),
            ScalarType::Float64.into()
        );
    }

    #[test]
    fn shards_must_agree_on_shape() {
        let shaped = |len| info("m", ScalarType::Int64.into(), len).with_shape(Some(vec![3, 3]));
        let reg = DatasetRegistry::build(vec![
            (0, "a".into(), vec![shaped(5)]),
            (1, "b".into(), vec![shaped(4)]),
        ])
        .unwrap();
        let (path, shape) = reg.get("m").unwrap().shape().unwrap().unwrap();
        assert_eq!((path, shape), (Path::new("a"), &[3u64, 3][..]));

        let reg = DatasetRegistry::build(vec![
            (0, "a".into(), vec![shaped(5)]),
            (1, "b".into(), vec![info("m", ScalarType::Int64.into(), 4).with_shape(Some(vec![9]))]),
        ])
        .unwrap();
        assert!(matches!(reg.get("m").unwrap().shape(), Err(StoreError::Format { .. })));
    }
}
