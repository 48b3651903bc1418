use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::ops::{BitOr, BitOrAssign};

/// Reasons an edge or a path departs from the annotated structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureChange {
    pub exon_skipping: bool,
    pub intron_retention: bool,
    pub cryptic_site: bool,
    pub de_novo_site: bool,
    pub cryptic_exon: bool,
    pub regulatory: bool,
}

impl StructureChange {
    pub const EXON_SKIPPING: Self = Self::flag(0);
    pub const INTRON_RETENTION: Self = Self::flag(1);
    pub const CRYPTIC_SITE: Self = Self::flag(2);
    pub const DE_NOVO_SITE: Self = Self::flag(3);
    pub const CRYPTIC_EXON: Self = Self::flag(4);
    pub const REGULATORY: Self = Self::flag(5);

    const fn flag(i: usize) -> Self {
        Self {
            exon_skipping: i == 0,
            intron_retention: i == 1,
            cryptic_site: i == 2,
            de_novo_site: i == 3,
            cryptic_exon: i == 4,
            regulatory: i == 5,
        }
    }

    pub fn any(&self) -> bool {
        self.tags().next().is_some()
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        [
            (self.exon_skipping, "exon-skipping"),
            (self.intron_retention, "intron-retention"),
            (self.cryptic_site, "cryptic-site"),
            (self.de_novo_site, "denovo-site"),
            (self.cryptic_exon, "cryptic-exon"),
            (self.regulatory, "regulatory-change"),
        ]
        .into_iter()
        .filter_map(|(set, tag)| set.then_some(tag))
    }
}

impl BitOr for StructureChange {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            exon_skipping: self.exon_skipping || rhs.exon_skipping,
            intron_retention: self.intron_retention || rhs.intron_retention,
            cryptic_site: self.cryptic_site || rhs.cryptic_site,
            de_novo_site: self.de_novo_site || rhs.de_novo_site,
            cryptic_exon: self.cryptic_exon || rhs.cryptic_exon,
            regulatory: self.regulatory || rhs.regulatory,
        }
    }
}

impl BitOrAssign for StructureChange {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl Display for StructureChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<_> = self.tags().collect();
        if tags.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", tags.join(","))
        }
    }
}

impl Serialize for StructureChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.tags())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine() {
        let mut change = StructureChange::default();
        assert!(!change.any());
        assert_eq!(change.to_string(), ".");
        change |= StructureChange::CRYPTIC_EXON | StructureChange::REGULATORY;
        assert!(change.cryptic_exon && change.regulatory && !change.exon_skipping);
        assert_eq!(change.to_string(), "cryptic-exon,regulatory-change");
        assert_eq!(
            serde_json::to_string(&StructureChange::EXON_SKIPPING).unwrap(),
            r#"["exon-skipping"]"#
        );
    }
}
