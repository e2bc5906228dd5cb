// Copyright (c) 2026 igdiscover developers. All rights reserved.

use std::collections::HashMap;

/// Weighted column-wise majority of equal-length sequences.
///
/// Returns None for empty input or when the lengths differ. Ties in a column
/// go to the smallest byte so the result does not depend on input order.
pub fn column_consensus<'a, I>(seqs: I) -> Option<Vec<u8>>
where
    I: IntoIterator<Item = (&'a [u8], usize)>,
{
    let mut iter = seqs.into_iter().peekable();
    let len = iter.peek()?.0.len();
    let mut counts = vec![[0usize; 256]; len];
    for (seq, weight) in iter {
        if seq.len() != len {
            return None;
        }
        for (column, &base) in counts.iter_mut().zip(seq) {
            column[base as usize] += weight;
        }
    }
    Some(
        counts
            .iter()
            .map(|column| {
                let mut best = 0;
                for base in 1..256 {
                    if column[base] > column[best] {
                        best = base;
                    }
                }
                best as u8
            })
            .collect(),
    )
}

/// The most common sequence, the earliest one on ties.
pub fn most_frequent<'a, I>(seqs: I) -> Option<&'a [u8]>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut counts: HashMap<&[u8], (usize, usize)> = HashMap::new();
    for (i, seq) in seqs.into_iter().enumerate() {
        counts.entry(seq).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (n1, i1)), (_, (n2, i2))| n1.cmp(n2).then(i2.cmp(i1)))
        .map(|(seq, _)| seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_consensus() {
        let seqs: [&[u8]; 3] = [b"ACGT", b"ACTT", b"GCTT"];
        assert_eq!(
            column_consensus(seqs.iter().map(|s| (*s, 1))),
            Some(b"ACTT".to_vec())
        );
        // weights beat raw counts
        assert_eq!(
            column_consensus([(&b"AA"[..], 1), (&b"CC"[..], 1), (&b"GG"[..], 5)]),
            Some(b"GG".to_vec())
        );
        // ties go to the smallest base
        assert_eq!(
            column_consensus([(&b"T"[..], 1), (&b"C"[..], 1)]),
            Some(b"C".to_vec())
        );
        assert_eq!(column_consensus([(&b"AC"[..], 1), (&b"A"[..], 1)]), None);
        assert_eq!(column_consensus(std::iter::empty::<(&[u8], usize)>()), None);
    }

    #[test]
    fn test_most_frequent() {
        let seqs: [&[u8]; 4] = [b"AC", b"GT", b"GT", b"AC"];
        assert_eq!(most_frequent(seqs), Some(&b"AC"[..]));
        let seqs: [&[u8]; 3] = [b"AC", b"GT", b"GT"];
        assert_eq!(most_frequent(seqs), Some(&b"GT"[..]));
        assert_eq!(most_frequent(std::iter::empty::<&[u8]>()), None);
    }
}
