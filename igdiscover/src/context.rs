// Copyright (c) 2026 igdiscover developers. All rights reserved.

use allele_discovery::DirectoryStore;
use anyhow::{bail, Context, Result};
use germline_db::GermlineDatabase;
use igd_config::{Config, CONFIG_FILE};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory inside a run holding the starting database.
pub const DATABASE_DIR: &str = "database";

/// Everything a command needs to work on an initialized run directory.
#[derive(Debug)]
pub struct RunContext {
    dir: PathBuf,
    config: Config,
}

impl RunContext {
    pub fn open(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            bail!(
                "{} is not a run directory (no {CONFIG_FILE}), run 'igdiscover init' first",
                dir.display()
            );
        }
        let config = Config::load(&config_path)?;
        Ok(RunContext {
            dir: dir.to_path_buf(),
            config,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn database_dir(&self) -> PathBuf {
        self.dir.join(DATABASE_DIR)
    }

    pub fn load_database(&self) -> Result<GermlineDatabase> {
        GermlineDatabase::from_directory(&self.database_dir())
    }

    /// Artifact store rooted at the run directory.
    pub fn store(&self) -> DirectoryStore {
        DirectoryStore::new(&self.dir)
    }

    /// Paths in the configuration are relative to the run directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub database: PathBuf,
    /// First reads of a paired-end run. The second reads are looked up next to it.
    pub reads1: Option<PathBuf>,
    pub single_reads: Option<PathBuf>,
}

/// Name of the second-read file belonging to `reads1`, found by replacing the
/// last `1` of a `.1.`, `_1.` or `_R1` marker in the file name.
pub fn guess_reads2(reads1: &Path) -> Option<PathBuf> {
    let name = reads1.file_name()?.to_str()?;
    for (one, two) in [(".1.", ".2."), ("_1.", "_2."), ("_R1", "_R2")] {
        if let Some(pos) = name.rfind(one) {
            let mut guessed = name.to_string();
            guessed.replace_range(pos..pos + one.len(), two);
            return Some(reads1.with_file_name(guessed));
        }
    }
    None
}

fn absolute(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("could not find {}", path.display()))
}

/// Create a new run directory. The database is validated and copied, the read
/// files are recorded in the configuration.
pub fn run_init(dir: &Path, options: &InitOptions) -> Result<RunContext> {
    let mut config = Config::default();
    match (&options.reads1, &options.single_reads) {
        (Some(_), Some(_)) => bail!("give either paired-end reads or single reads, not both"),
        (None, None) => bail!("no input reads given"),
        (Some(reads1), None) => {
            let Some(reads2) = guess_reads2(reads1) else {
                bail!(
                    "could not derive the name of the second reads file from {}",
                    reads1.display()
                );
            };
            config.reads1 = Some(absolute(reads1)?);
            config.reads2 = Some(absolute(&reads2)?);
        }
        (None, Some(single)) => config.single_reads = Some(absolute(single)?),
    }

    let database = GermlineDatabase::from_directory(&options.database)
        .with_context(|| format!("invalid germline database in {}", options.database.display()))?;
    config.database = Some(absolute(&options.database)?);

    if dir.exists() {
        bail!("{} already exists, not overwriting it", dir.display());
    }
    fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;
    database.write_directory(&dir.join(DATABASE_DIR))?;
    config.save(&dir.join(CONFIG_FILE))?;
    info!(
        "Initialized {} with database {}",
        dir.display(),
        database.summary()
    );
    RunContext::open(dir)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Show,
    Get(String),
    Set(String, String),
}

/// Inspect or change the configuration of a run. Returns the text to print.
pub fn run_config(dir: &Path, action: &ConfigAction) -> Result<String> {
    let ctx = RunContext::open(dir)?;
    let mut config = ctx.config.clone();
    match action {
        ConfigAction::Show => Ok(config.to_toml()?),
        ConfigAction::Get(key) => Ok(match config.get(key)? {
            Some(toml::Value::String(s)) => s,
            Some(value) => value.to_string(),
            None => String::new(),
        }),
        ConfigAction::Set(key, value) => {
            config.set(key, value)?;
            config.save(&ctx.config_path())?;
            info!("Set {key} = {value}");
            Ok(String::new())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub const V1: &str = "CAGGTGCAGCTGGTGCAGTCTGGGGCTGAGGTGAAGAAGCCTGGGGCC";
    pub const J1: &str = "ACTACTTTGACTACTGGGGCCAGGGAACC";

    /// A database directory and a FASTA file of `n` identical V-J reads.
    pub fn fixture(root: &Path, n: usize) -> (PathBuf, PathBuf) {
        let db = root.join("db");
        fs::create_dir_all(&db).unwrap();
        fs::write(db.join("V.fasta"), format!(">IGHV1-2*02\n{V1}\n")).unwrap();
        fs::write(db.join("J.fasta"), format!(">IGHJ4*02\n{J1}\n")).unwrap();
        let reads = root.join("reads.fasta");
        let text: String = (0..n).map(|i| format!(">r{i}\n{V1}{J1}\n")).collect();
        fs::write(&reads, text).unwrap();
        (db, reads)
    }

    #[test]
    fn test_guess_reads2() {
        assert_eq!(
            guess_reads2(Path::new("/data/sample.1.fastq.gz")),
            Some(PathBuf::from("/data/sample.2.fastq.gz"))
        );
        assert_eq!(
            guess_reads2(Path::new("lib_R1_001.fastq")),
            Some(PathBuf::from("lib_R2_001.fastq"))
        );
        assert_eq!(
            guess_reads2(Path::new("run1_1.fq")),
            Some(PathBuf::from("run1_2.fq"))
        );
        assert_eq!(guess_reads2(Path::new("reads.fastq")), None);
    }

    #[test]
    fn test_init_and_config() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, reads) = fixture(tmp.path(), 3);
        let dir = tmp.path().join("run");
        let options = InitOptions {
            database: db,
            reads1: None,
            single_reads: Some(reads.clone()),
        };
        let ctx = run_init(&dir, &options).unwrap();
        assert!(ctx.database_dir().join("V.fasta").exists());
        assert!(ctx.database_dir().join("D.fasta").exists());
        assert_eq!(ctx.load_database().unwrap().summary(), "V=1 D=0 J=1");
        assert_eq!(
            ctx.config().single_reads.as_deref(),
            Some(fs::canonicalize(&reads).unwrap().as_path())
        );

        // the directory is never reused
        assert!(run_init(&dir, &options).is_err());

        run_config(&dir, &ConfigAction::Set("iterations".into(), "3".into())).unwrap();
        assert_eq!(
            run_config(&dir, &ConfigAction::Get("iterations".into())).unwrap(),
            "3"
        );
        assert!(run_config(&dir, &ConfigAction::Set("iterations".into(), "0".into())).is_err());
        assert_eq!(RunContext::open(&dir).unwrap().config().iterations, 3);
        assert!(run_config(&dir, &ConfigAction::Show)
            .unwrap()
            .contains("iterations = 3"));
    }

    #[test]
    fn test_init_rejects_bad_input() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, reads) = fixture(tmp.path(), 1);
        let no_reads = InitOptions {
            database: db.clone(),
            ..Default::default()
        };
        assert!(run_init(&tmp.path().join("a"), &no_reads).is_err());

        // reads.fastq has no counterpart for the second reads
        let unpaired = InitOptions {
            database: db,
            reads1: Some(reads),
            single_reads: None,
        };
        assert!(run_init(&tmp.path().join("b"), &unpaired).is_err());
        assert!(!tmp.path().join("b").exists());

        assert!(RunContext::open(tmp.path()).is_err());
    }
}
