// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! FASTA/FASTQ input and output, transparently gzipped when the path ends in `.gz`.

use crate::grouper::ReadGroup;
use anyhow::{bail, Context, Result};
use bio::io::{fasta, fastq};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use igd_types::Read;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Open `path` for reading, decompressing if needed.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    Ok(if is_gzipped(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    })
}

/// Create `path` for writing, compressing if needed.
pub fn create_writer(path: &Path) -> Result<Box<dyn Write>> {
    let file =
        File::create(path).with_context(|| format!("could not create {}", path.display()))?;
    Ok(if is_gzipped(path) {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::fast())))
    } else {
        Box::new(BufWriter::new(file))
    })
}

/// Parse FASTA or FASTQ, deciding by the first non-blank byte.
pub fn parse_fastx<R: BufRead>(mut reader: R) -> Result<Vec<Read>> {
    let first = loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => {
                let first = buf[i];
                reader.consume(i);
                break first;
            }
            None => {
                let n = buf.len();
                reader.consume(n);
            }
        }
    };
    match first {
        b'>' => fasta::Reader::from_bufread(reader)
            .records()
            .map(|rec| -> Result<Read> {
                let rec = rec?;
                Ok(Read::new(rec.id(), rec.seq().to_ascii_uppercase()))
            })
            .collect(),
        b'@' => fastq::Reader::from_bufread(reader)
            .records()
            .map(|rec| -> Result<Read> {
                let rec = rec?;
                Ok(Read::with_qual(
                    rec.id(),
                    rec.seq().to_ascii_uppercase(),
                    rec.qual().to_vec(),
                ))
            })
            .collect(),
        other => bail!(
            "expected FASTA ('>') or FASTQ ('@') input, found '{}'",
            other as char
        ),
    }
}

pub fn read_fastx(path: &Path) -> Result<Vec<Read>> {
    parse_fastx(open_reader(path)?).with_context(|| format!("while reading {}", path.display()))
}

pub fn write_fasta<'a, W, I>(writer: W, reads: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Read>,
{
    let mut writer = fasta::Writer::new(writer);
    for read in reads {
        writer.write(read.name(), None, read.seq())?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes FASTQ when every read has qualities, FASTA otherwise.
pub fn write_fastx(path: &Path, reads: &[Read]) -> Result<()> {
    let out = create_writer(path)?;
    if !reads.is_empty() && reads.iter().all(|r| r.qual().is_some()) {
        let mut writer = fastq::Writer::new(out);
        for read in reads {
            writer.write(read.name(), None, read.seq(), read.qual().unwrap_or_default())?;
        }
        writer.flush()?;
        Ok(())
    } else {
        write_fasta(out, reads)
    }
}

#[derive(Serialize)]
struct GroupRow<'a> {
    barcode: String,
    pseudo_cdr3: String,
    size: usize,
    first_read: &'a str,
}

/// One tab-separated line per group.
pub fn write_group_table<W: Write>(writer: W, groups: &[ReadGroup]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for group in groups {
        writer.serialize(GroupRow {
            barcode: String::from_utf8_lossy(&group.key().barcode).into_owned(),
            pseudo_cdr3: String::from_utf8_lossy(&group.key().pseudo_cdr3).into_owned(),
            size: group.len(),
            first_read: group.members().first().map_or("", Read::name),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouper::{group_reads, ReadGrouper};
    use crate::spec::BarcodeSpec;

    #[test]
    fn test_parse_fasta() {
        let reads = parse_fastx(&b"\n>r1 desc\nacgt\nAC\n>r2\nGGGG\n"[..]).unwrap();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].name(), "r1");
        assert_eq!(reads[0].seq(), b"ACGTAC");
        assert_eq!(reads[1].qual(), None);
    }

    #[test]
    fn test_parse_fastq() {
        let reads = parse_fastx(&b"@r1\nACGT\n+\nIIII\n"[..]).unwrap();
        assert_eq!(reads[0].qual(), Some(&b"IIII"[..]));
        assert!(parse_fastx(&b"ACGT\n"[..]).is_err());
        assert!(parse_fastx(&b""[..]).unwrap().is_empty());
    }

    #[test]
    fn test_gz_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fastq.gz");
        let reads = vec![
            Read::with_qual("a", b"ACGT".to_vec(), b"IIII".to_vec()),
            Read::with_qual("b", b"TTTT".to_vec(), b"####".to_vec()),
        ];
        write_fastx(&path, &reads).unwrap();
        assert_eq!(read_fastx(&path).unwrap(), reads);

        let path = dir.path().join("reads.fasta");
        let reads = vec![Read::new("a", b"ACGT".to_vec())];
        write_fastx(&path, &reads).unwrap();
        assert_eq!(read_fastx(&path).unwrap(), reads);
    }

    #[test]
    fn test_group_table() {
        let reads = vec![
            Read::new("a", b"ACGTTT".to_vec()),
            Read::new("b", b"ACGTCC".to_vec()),
        ];
        let (groups, _) = group_reads(ReadGrouper::new(BarcodeSpec::new(4)), reads);
        let mut out = Vec::new();
        write_group_table(&mut out, &groups).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "barcode\tpseudo_cdr3\tsize\tfirst_read\nACGT\t\t2\ta\n"
        );
    }
}
