// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Storage for the files a run produces, independent of the directory layout.

use allele_assign::AssignmentTable;
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use germline_db::GermlineAllele;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKey {
    /// Preprocessed and grouped reads.
    Reads,
    Stats,
    /// Outputs of discovery round `n`, starting at 1.
    Iteration(usize),
    Final,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKey::Reads => write!(f, "reads"),
            ArtifactKey::Stats => write!(f, "stats"),
            ArtifactKey::Iteration(n) => write!(f, "iteration-{n:02}"),
            ArtifactKey::Final => write!(f, "final"),
        }
    }
}

impl FromStr for ArtifactKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reads" => Ok(ArtifactKey::Reads),
            "stats" => Ok(ArtifactKey::Stats),
            "final" => Ok(ArtifactKey::Final),
            _ => s
                .strip_prefix("iteration-")
                .and_then(|n| n.parse().ok())
                .filter(|&n| n > 0)
                .map(ArtifactKey::Iteration)
                .ok_or_else(|| format!("not an artifact key: '{s}'")),
        }
    }
}

pub trait ArtifactStore: Send {
    /// Store `data` under `name`. Artifacts are written once; storing the same
    /// name again replaces it whole.
    fn put(&mut self, key: ArtifactKey, name: &str, data: &[u8]) -> Result<()>;

    fn get(&self, key: ArtifactKey, name: &str) -> Result<Option<Vec<u8>>>;

    fn contains(&self, key: ArtifactKey, name: &str) -> bool;

    /// Remove one artifact. Removing a missing name is not an error.
    fn remove(&mut self, key: ArtifactKey, name: &str) -> Result<()>;

    /// Names stored under `key`, sorted.
    fn names(&self, key: ArtifactKey) -> Result<Vec<String>>;

    /// Keys with at least one artifact, sorted.
    fn keys(&self) -> Result<Vec<ArtifactKey>>;

    fn clear(&mut self, key: ArtifactKey) -> Result<()> {
        for name in self.names(key)? {
            self.remove(key, &name)?;
        }
        Ok(())
    }

    /// Replace everything under `key` by `entries`. Either all entries end up
    /// stored or `key` is left empty.
    fn commit(&mut self, key: ArtifactKey, entries: &[(&str, Vec<u8>)]) -> Result<()> {
        self.clear(key)?;
        for (name, data) in entries {
            if let Err(e) = self.put(key, name, data) {
                return Err(match self.clear(key) {
                    Ok(()) => e,
                    Err(cleanup) => {
                        e.context(format!("could not remove partial {key}: {cleanup}"))
                    }
                });
            }
        }
        Ok(())
    }

    fn put_table(&mut self, key: ArtifactKey, name: &str, table: &AssignmentTable) -> Result<()> {
        self.put(key, name, &table_bytes(table)?)
    }

    fn get_table(&self, key: ArtifactKey, name: &str) -> Result<Option<AssignmentTable>> {
        self.get(key, name)?
            .map(|data| AssignmentTable::from_reader(data.as_slice()))
            .transpose()
    }
}

pub fn table_bytes(table: &AssignmentTable) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    table.to_writer(&mut buf)?;
    Ok(buf)
}

#[derive(Serialize)]
struct NovelAlleleRow<'a> {
    name: &'a str,
    segment: String,
    length: usize,
    sequence: String,
}

/// Tab-separated table of newly discovered alleles.
pub fn novel_allele_table(alleles: &[GermlineAllele]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    for allele in alleles {
        writer.serialize(NovelAlleleRow {
            name: &allele.name,
            segment: allele.segment.to_string(),
            length: allele.len(),
            sequence: String::from_utf8_lossy(&allele.sequence).into_owned(),
        })?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// In-memory store, used by tests and library callers that only want values.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<(ArtifactKey, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&mut self, key: ArtifactKey, name: &str, data: &[u8]) -> Result<()> {
        self.entries.insert((key, name.to_string()), data.to_vec());
        Ok(())
    }

    fn get(&self, key: ArtifactKey, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&(key, name.to_string())).cloned())
    }

    fn contains(&self, key: ArtifactKey, name: &str) -> bool {
        self.entries.contains_key(&(key, name.to_string()))
    }

    fn remove(&mut self, key: ArtifactKey, name: &str) -> Result<()> {
        self.entries.remove(&(key, name.to_string()));
        Ok(())
    }

    fn names(&self, key: ArtifactKey) -> Result<Vec<String>> {
        Ok(self
            .entries
            .keys()
            .filter(|(k, _)| *k == key)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        let mut keys: Vec<_> = self.entries.keys().map(|(key, _)| *key).collect();
        keys.dedup();
        Ok(keys)
    }
}

/// `<root>/stats/`, `<root>/iteration-01/`, `<root>/final/`, ...
///
/// Names ending in `.gz` are gzip compressed on disk and transparently
/// decompressed by `get`. Files are written under a temporary name and renamed
/// into place.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: ArtifactKey, name: &str) -> PathBuf {
        self.root.join(key.to_string()).join(name)
    }
}

/// Write `data` to `path` through a temporary file in the same directory.
fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid artifact path {}", path.display()))?;
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    {
        let file = fs::File::create(&tmp)
            .with_context(|| format!("could not create {}", tmp.display()))?;
        if name.ends_with(".gz") {
            let mut encoder = GzEncoder::new(file, Compression::fast());
            encoder.write_all(data)?;
            encoder.finish()?;
        } else {
            let mut file = file;
            file.write_all(data)?;
        }
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("could not move {} into place", path.display()))?;
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("could not remove {}", dir.display()))
        }
        _ => Ok(()),
    }
}

/// Visible file names of `dir`, sorted. Temporary and staging entries start
/// with a dot and are skipped.
fn visible_entries(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("could not list {}", dir.display())),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

impl ArtifactStore for DirectoryStore {
    fn put(&mut self, key: ArtifactKey, name: &str, data: &[u8]) -> Result<()> {
        let dir = self.root.join(key.to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        write_file(&dir.join(name), data)
    }

    fn get(&self, key: ArtifactKey, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key, name);
        if !path.exists() {
            return Ok(None);
        }
        let file =
            fs::File::open(&path).with_context(|| format!("could not open {}", path.display()))?;
        let mut data = Vec::new();
        if name.ends_with(".gz") {
            MultiGzDecoder::new(file).read_to_end(&mut data)?;
        } else {
            let mut file = file;
            file.read_to_end(&mut data)?;
        }
        Ok(Some(data))
    }

    fn contains(&self, key: ArtifactKey, name: &str) -> bool {
        self.path(key, name).exists()
    }

    fn remove(&mut self, key: ArtifactKey, name: &str) -> Result<()> {
        let path = self.path(key, name);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("could not remove {}", path.display()))
            }
            _ => Ok(()),
        }
    }

    fn names(&self, key: ArtifactKey) -> Result<Vec<String>> {
        visible_entries(&self.root.join(key.to_string()))
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        let mut keys: Vec<ArtifactKey> = visible_entries(&self.root)?
            .iter()
            .filter(|name| self.root.join(name).is_dir())
            .filter_map(|name| name.parse().ok())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&mut self, key: ArtifactKey) -> Result<()> {
        remove_dir_if_present(&self.root.join(key.to_string()))
    }

    /// The entries are written to a hidden staging directory which then
    /// replaces the directory of `key`.
    fn commit(&mut self, key: ArtifactKey, entries: &[(&str, Vec<u8>)]) -> Result<()> {
        let dir = self.root.join(key.to_string());
        let staging = self.root.join(format!(".{key}.staging"));
        remove_dir_if_present(&staging)?;
        fs::create_dir_all(&staging)
            .with_context(|| format!("could not create {}", staging.display()))?;
        let written = entries
            .iter()
            .try_for_each(|(name, data)| write_file(&staging.join(name), data));
        if let Err(e) = written {
            remove_dir_if_present(&staging)?;
            return Err(e);
        }
        remove_dir_if_present(&dir)?;
        fs::rename(&staging, &dir)
            .with_context(|| format!("could not move {} into place", dir.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allele_assign::AssignmentRecord;
    use igd_types::Segment;

    #[test]
    fn test_key_names() {
        assert_eq!(ArtifactKey::Iteration(3).to_string(), "iteration-03");
        assert_eq!(ArtifactKey::Iteration(12).to_string(), "iteration-12");
        assert_eq!(ArtifactKey::Final.to_string(), "final");
    }

    #[test]
    fn test_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        let table = AssignmentTable::new(vec![AssignmentRecord::unassigned(
            "r1",
            2,
            b"ACGT".to_vec(),
        )]);
        store
            .put_table(ArtifactKey::Iteration(1), "assigned.tab.gz", &table)
            .unwrap();
        let path = dir.path().join("iteration-01").join("assigned.tab.gz");
        assert!(path.exists());
        // compressed on disk
        assert_eq!(&fs::read(&path).unwrap()[..2], &[0x1f, 0x8b]);
        assert_eq!(
            store
                .get_table(ArtifactKey::Iteration(1), "assigned.tab.gz")
                .unwrap(),
            Some(table)
        );
        assert!(!store.contains(ArtifactKey::Final, "assigned.tab.gz"));
        assert_eq!(store.get(ArtifactKey::Final, "assigned.tab.gz").unwrap(), None);
        assert!(!dir.path().join("iteration-01").join(".assigned.tab.gz.tmp").exists());
    }

    #[test]
    fn test_memory_store_and_novel_table() {
        let mut store = MemoryStore::new();
        let alleles = vec![GermlineAllele::new(
            "IGHV_novel01",
            Segment::V,
            b"ACGTT".to_vec(),
        )];
        store
            .put(
                ArtifactKey::Iteration(1),
                "new_germline.tab",
                &novel_allele_table(&alleles).unwrap(),
            )
            .unwrap();
        let data = store
            .get(ArtifactKey::Iteration(1), "new_germline.tab")
            .unwrap()
            .unwrap();
        assert_eq!(
            String::from_utf8(data).unwrap(),
            "name\tsegment\tlength\tsequence\nIGHV_novel01\tV\t5\tACGTT\n"
        );
        assert_eq!(
            store.names(ArtifactKey::Iteration(1)).unwrap(),
            ["new_germline.tab"]
        );
        assert!(store.names(ArtifactKey::Iteration(2)).unwrap().is_empty());
        assert_eq!(store.keys().unwrap(), [ArtifactKey::Iteration(1)]);

        store.remove(ArtifactKey::Iteration(1), "new_germline.tab").unwrap();
        store.remove(ArtifactKey::Iteration(1), "new_germline.tab").unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_key_from_str() {
        for key in [
            ArtifactKey::Reads,
            ArtifactKey::Stats,
            ArtifactKey::Iteration(7),
            ArtifactKey::Final,
        ] {
            assert_eq!(key.to_string().parse::<ArtifactKey>(), Ok(key));
        }
        assert!("iteration-00".parse::<ArtifactKey>().is_err());
        assert!("database".parse::<ArtifactKey>().is_err());
    }

    #[test]
    fn test_directory_store_commit_replaces_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        let key = ArtifactKey::Iteration(1);
        store.put(key, "new_germline.tab", b"stale").unwrap();
        store.put(ArtifactKey::Iteration(2), "assigned.tab.gz", b"stale").unwrap();
        fs::create_dir_all(dir.path().join("database")).unwrap();
        assert_eq!(
            store.keys().unwrap(),
            [ArtifactKey::Iteration(1), ArtifactKey::Iteration(2)]
        );

        store
            .commit(key, &[("database.fasta", b">a\nACGT\n".to_vec())])
            .unwrap();
        assert_eq!(store.names(key).unwrap(), ["database.fasta"]);
        assert!(!dir.path().join(".iteration-01.staging").exists());

        store.clear(ArtifactKey::Iteration(2)).unwrap();
        store.clear(ArtifactKey::Iteration(2)).unwrap();
        assert_eq!(store.keys().unwrap(), [key]);
    }

    #[test]
    fn test_directory_store_failed_commit_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        let key = ArtifactKey::Iteration(1);
        store.put(key, "assigned.tab.gz", b"old").unwrap();
        // a name inside a missing subdirectory cannot be written
        let err = store
            .commit(
                key,
                &[
                    ("database.fasta", b">a\nACGT\n".to_vec()),
                    ("missing/exact.tab", Vec::new()),
                ],
            )
            .unwrap_err();
        assert!(err.to_string().contains("could not create"), "{err}");
        assert!(!dir.path().join(".iteration-01.staging").exists());
        // the previous contents are left alone
        assert_eq!(store.names(key).unwrap(), ["assigned.tab.gz"]);
    }
}
