use itertools::Itertools;

use crate::alignment::Alignment;
use crate::interval::Interval;

/// Maximal runs of alternate positions that differ from the reference:
/// insertions (no reference partner), deletions (the next aligned base
/// does not map to the next reference base) and substitutions.
pub fn changed_intervals(alt: &[u8], reference: &[u8], alt_to_ref: &Alignment) -> Vec<Interval> {
    let n = alt.len() as i64;
    let changed = |pos: i64| match alt_to_ref.map(pos) {
        None => true,
        Some(to) => {
            // the next aligned base, skipping over inserted ones
            let next = (pos + 1..n).find_map(|p| alt_to_ref.map(p));
            next.is_some_and(|next| next != to + 1)
                || !reference
                    .get(to as usize)
                    .is_some_and(|r| r.eq_ignore_ascii_case(&alt[pos as usize]))
        }
    };
    (0..n)
        .filter(|&pos| changed(pos))
        .map(|pos| Interval::new(pos, pos + 1))
        .coalesce(|a, b| {
            if a.end == b.begin {
                Ok(Interval::new(a.begin, b.end))
            } else {
                Err((a, b))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutions() {
        let reference = b"ACGTACGTAC";
        let alt = b"ACGAACGGCC";
        let ali = Alignment::identity(10);
        assert_eq!(
            changed_intervals(alt, reference, &ali),
            vec![Interval::new(3, 4), Interval::new(7, 9)]
        );
    }

    #[test]
    fn test_indels() {
        // alt = ref with 2 bases deleted after position 3 and 1 base inserted
        // after position 6
        let reference = b"AAAACCGGGG";
        let alt = b"AAAAGGTGG";
        let ali = Alignment::from_cigar("4M2D2M1I2M").unwrap().inverse();
        assert_eq!(
            changed_intervals(alt, reference, &ali),
            vec![Interval::new(3, 4), Interval::new(6, 7)]
        );
    }

    #[test]
    fn test_insertion_marks_inserted_bases_only() {
        let reference = b"ACGTACGTACGTACGTACGT";
        let mut alt = reference[..10].to_vec();
        alt.extend_from_slice(b"TTT");
        alt.extend_from_slice(&reference[10..]);
        let ali = Alignment::from_cigar("10M3I10M").unwrap().inverse();
        assert_eq!(changed_intervals(&alt, reference, &ali), vec![Interval::new(10, 13)]);

        // a deletion right after an insertion still flags the base before both
        let reference = b"AAAACCGGGG";
        let alt = b"AAAATGGGG";
        let ali = Alignment::from_cigar("4M1I2D4M").unwrap().inverse();
        assert_eq!(changed_intervals(alt, reference, &ali), vec![Interval::new(3, 5)]);
    }

    #[test]
    fn test_identical() {
        let seq = b"ACGTACGT";
        assert!(changed_intervals(seq, seq, &Alignment::identity(8)).is_empty());
    }
}
