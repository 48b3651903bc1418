use anyhow::{bail, ensure, Result};

/// Which side to look on when a position has no partner in the other
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    /// Whichever mapped neighbour is closer, preferring the right on ties.
    None,
}

/// Base-level correspondence between a source and a target sequence.
/// Unaligned positions map to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    forward: Vec<Option<usize>>,
    inverse: Vec<Option<usize>>,
}

impl Alignment {
    /// Every position maps to itself.
    pub fn identity(len: usize) -> Self {
        let map: Vec<_> = (0..len).map(Some).collect();
        Self {
            forward: map.clone(),
            inverse: map,
        }
    }

    /// Build from a CIGAR string describing the target (alternate sequence)
    /// against the source (reference). `M`, `=` and `X` consume both,
    /// `I` and `S` only the target, `D` and `N` only the source.
    pub fn from_cigar(cigar: &str) -> Result<Self> {
        let mut forward = Vec::new();
        let mut inverse = Vec::new();
        let mut num = String::new();
        for c in cigar.chars() {
            if c.is_ascii_digit() {
                num.push(c);
                continue;
            }
            ensure!(!num.is_empty(), "missing length before '{}' in CIGAR {}", c, cigar);
            let n: usize = num.parse()?;
            num.clear();
            match c {
                'M' | '=' | 'X' => {
                    for _ in 0..n {
                        forward.push(Some(inverse.len()));
                        inverse.push(Some(forward.len() - 1));
                    }
                }
                'I' | 'S' => inverse.extend(std::iter::repeat(None).take(n)),
                'D' | 'N' => forward.extend(std::iter::repeat(None).take(n)),
                'H' | 'P' => {}
                _ => bail!("unknown CIGAR operation '{}' in {}", c, cigar),
            }
        }
        ensure!(num.is_empty(), "trailing length without operation in CIGAR {}", cigar);
        Ok(Self { forward, inverse })
    }

    pub fn source_len(&self) -> usize {
        self.forward.len()
    }

    pub fn target_len(&self) -> usize {
        self.inverse.len()
    }

    /// The same alignment seen from the target side.
    pub fn inverse(&self) -> Alignment {
        Alignment {
            forward: self.inverse.clone(),
            inverse: self.forward.clone(),
        }
    }

    pub fn map(&self, pos: i64) -> Option<i64> {
        lookup(&self.forward, pos)
    }

    pub fn map_inverse(&self, pos: i64) -> Option<i64> {
        lookup(&self.inverse, pos)
    }

    /// Map `pos`, falling back to the nearest mapped neighbour when it is
    /// unaligned. The end of the source maps to the end of the target. A
    /// left neighbour `q` contributes the boundary just after its image,
    /// a right neighbour its image itself, so that both agree across a
    /// pure deletion.
    pub fn map_approximate(&self, pos: i64, dir: Direction) -> Option<i64> {
        let len = self.forward.len() as i64;
        if pos == len {
            return Some(self.inverse.len() as i64);
        }
        if pos < 0 || pos > len {
            return None;
        }
        if let Some(p) = self.map(pos) {
            return Some(p);
        }
        let left = (0..pos)
            .rev()
            .find_map(|q| self.map(q).map(|p| (pos - q, p + 1)));
        let right = (pos + 1..len)
            .find_map(|q| self.map(q).map(|p| (q - pos, p)))
            .or(Some((len - pos, self.inverse.len() as i64)));
        match dir {
            Direction::Left => left.or(right).map(|(_, p)| p),
            Direction::Right => right.or(left).map(|(_, p)| p),
            Direction::None => match (left, right) {
                (Some(l), Some(r)) if l.0 < r.0 => Some(l.1),
                (_, Some(r)) => Some(r.1),
                (l, None) => l.map(|(_, p)| p),
            },
        }
    }
}

fn lookup(map: &[Option<usize>], pos: i64) -> Option<i64> {
    if pos < 0 {
        return None;
    }
    map.get(pos as usize).copied().flatten().map(|p| p as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cigar() {
        let ali = Alignment::from_cigar("3M2D2M1I2M").unwrap();
        assert_eq!(ali.source_len(), 9);
        assert_eq!(ali.target_len(), 8);
        assert_eq!(ali.map(2), Some(2));
        assert_eq!(ali.map(3), None);
        assert_eq!(ali.map(5), Some(3));
        assert_eq!(ali.map(7), Some(6));
        assert_eq!(ali.map_inverse(5), None);
        assert_eq!(ali.inverse().map(6), Some(7));
        assert!(Alignment::from_cigar("3Q").is_err());
        assert!(Alignment::from_cigar("M").is_err());
        assert!(Alignment::from_cigar("3M4").is_err());
    }

    #[test]
    fn test_map_approximate() {
        // source positions 3 and 4 are deleted
        let ali = Alignment::from_cigar("3M2D4M").unwrap();
        assert_eq!(ali.map_approximate(3, Direction::Left), Some(3));
        assert_eq!(ali.map_approximate(4, Direction::Right), Some(3));
        assert_eq!(ali.map_approximate(4, Direction::None), Some(3));
        assert_eq!(ali.map_approximate(9, Direction::None), Some(7));
        assert_eq!(ali.map_approximate(10, Direction::None), None);
        assert_eq!(ali.map_approximate(6, Direction::Left), Some(4));
    }

    #[test]
    fn test_identity() {
        let ali = Alignment::identity(5);
        assert_eq!(ali.map(4), Some(4));
        assert_eq!(ali.map(5), None);
        assert_eq!(ali.map(-1), None);
        assert_eq!(ali, ali.inverse());
    }
}
