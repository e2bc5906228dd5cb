// Copyright (c) 2026 igdiscover developers. All rights reserved.

use anyhow::Result;
use bio::io::fasta::Record;
use igd_types::{Segment, ALLOWED_NUCLEOTIDES};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::iter::Enumerate;
use std::path::{Path, PathBuf};

/// Follows a FASTA file line by line alongside the record parser so errors can
/// point at the offending header.
pub struct ErrorContext {
    reader: Enumerate<Lines<BufReader<File>>>,
    pub state: FastaState,
}

impl ErrorContext {
    pub fn new(fa_file: &Path) -> Result<Self> {
        Ok(ErrorContext {
            reader: BufReader::new(File::open(fa_file)?).lines().enumerate(),
            state: FastaState::NoRecordProcessed,
        })
    }

    pub fn advance(&mut self, record: &Record) -> Result<()> {
        let current_header = match record.desc() {
            Some(desc) => format!(">{} {desc}", record.id()),
            None => format!(">{}", record.id()),
        };

        self.state = loop {
            match self.reader.next() {
                Some((line_num, line)) => {
                    let header = line?;
                    if header.trim_end() == current_header.trim_end() {
                        break FastaState::ProcessedRecord { line_num, header };
                    }
                }
                None => break FastaState::Unknown,
            }
        };
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FastaState {
    NoRecordProcessed,
    ProcessedRecord { line_num: usize, header: String },
    Unknown,
}

impl FastaState {
    fn is_processed(&self) -> bool {
        matches!(self, &FastaState::ProcessedRecord { .. })
    }

    pub fn line_num(&self) -> Option<usize> {
        if let FastaState::ProcessedRecord { line_num, .. } = self {
            Some(*line_num)
        } else {
            None
        }
    }
}

impl fmt::Display for FastaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FastaState::NoRecordProcessed => {
                write!(f, "No fasta records were processed successfully!")
            }
            FastaState::ProcessedRecord { line_num, header } => {
                write!(f, "LINE {:5}: {header}", line_num + 1)
            }
            FastaState::Unknown => Ok(()),
        }
    }
}

#[derive(Debug)]
pub enum GermlineDbError {
    MissingSegmentFile {
        dir: PathBuf,
        segment: Segment,
    },
    CannotReadFastaRecord {
        fa_file: PathBuf,
        state: FastaState,
        error: std::io::Error,
    },
    InvalidBaseInSequence {
        fa_file: PathBuf,
        state: FastaState,
        base: char,
        position: usize,
    },
    EmptySequence {
        fa_file: PathBuf,
        state: FastaState,
    },
    NoAlleles {
        fa_file: PathBuf,
    },
    DuplicateName {
        name: String,
        state: FastaState,
        first_line: Option<usize>,
    },
    /// A discovered allele reuses a name already in the database.
    NameAlreadyPresent {
        name: String,
        version: usize,
    },
}

impl fmt::Display for GermlineDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GermlineDbError::{
            CannotReadFastaRecord, DuplicateName, EmptySequence, InvalidBaseInSequence,
            MissingSegmentFile, NameAlreadyPresent, NoAlleles,
        };

        fn _common_error(fa_file: &Path) -> String {
            format!(
                "Error reading the germline fasta file \"{}\" due to:",
                fa_file.display()
            )
        }

        let msg = match self {
            MissingSegmentFile { dir, segment } => format!(
                "The germline database directory \"{}\" has no {segment}.fasta file.",
                dir.display()
            ),
            CannotReadFastaRecord {
                fa_file,
                state,
                error,
            } => {
                let state_msg = if state.is_processed() {
                    format!("The last successfully processed record is:\n{state}\n")
                } else {
                    state.to_string()
                };
                format!("{}\n\n- {error}\n\n{state_msg}\n", _common_error(fa_file))
            }
            InvalidBaseInSequence {
                fa_file,
                state,
                base,
                position,
            } => format!(
                "{}\n\n\
                - Invalid character '{base}' in the sequence at position {position}. Only {} \
                characters are allowed. Please correct the sequence associated with the \
                following header:\n\n{state}\n",
                _common_error(fa_file),
                String::from_utf8_lossy(ALLOWED_NUCLEOTIDES),
            ),
            EmptySequence { fa_file, state } => format!(
                "{}\n\n- The record has an empty sequence:\n\n{state}\n",
                _common_error(fa_file)
            ),
            NoAlleles { fa_file } => format!(
                "{}\n\n- The file contains no records. V and J genes are required.\n",
                _common_error(fa_file)
            ),
            DuplicateName {
                name,
                state,
                first_line,
            } => format!(
                "The allele name '{name}' is duplicated ({state}). {}",
                first_line.map_or(String::new(), |line| format!(
                    "The same name was encountered in line {}.",
                    line + 1
                ))
            ),
            NameAlreadyPresent { name, version } => format!(
                "Cannot add allele '{name}': database version {version} already contains it."
            ),
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for GermlineDbError {}
