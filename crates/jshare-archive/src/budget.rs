use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Kinds of metaspace objects the builder lays out, one region each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaspaceObjType {
    Symbol,
    Class,
    ConstantPool,
    TypeArrayU1,
}

impl MetaspaceObjType {
    /// Allocation order for every record.
    pub const ALL: [MetaspaceObjType; 4] = [
        MetaspaceObjType::Symbol,
        MetaspaceObjType::Class,
        MetaspaceObjType::ConstantPool,
        MetaspaceObjType::TypeArrayU1,
    ];

    pub fn tag(self) -> u8 {
        match self {
            MetaspaceObjType::Symbol => 1,
            MetaspaceObjType::Class => 2,
            MetaspaceObjType::ConstantPool => 3,
            MetaspaceObjType::TypeArrayU1 => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            MetaspaceObjType::Symbol => "Symbol",
            MetaspaceObjType::Class => "Class",
            MetaspaceObjType::ConstantPool => "ConstantPool",
            MetaspaceObjType::TypeArrayU1 => "TypeArrayU1",
        }
    }
}

impl fmt::Display for MetaspaceObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upper bound on bytes the builder may lay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaspaceBudget(u64);

impl MetaspaceBudget {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Parses `12M`-style sizes.
    pub fn parse(input: &str) -> Option<Self> {
        jshare_core::parse_size(input).map(Self)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

/// Percentage of the budget given to each region. Must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionShares {
    pub symbol: u8,
    pub class: u8,
    pub constant_pool: u8,
    pub type_array_u1: u8,
}

impl Default for RegionShares {
    fn default() -> Self {
        Self {
            symbol: 10,
            class: 30,
            constant_pool: 20,
            type_array_u1: 40,
        }
    }
}

impl RegionShares {
    pub fn get(self, kind: MetaspaceObjType) -> u8 {
        match kind {
            MetaspaceObjType::Symbol => self.symbol,
            MetaspaceObjType::Class => self.class,
            MetaspaceObjType::ConstantPool => self.constant_pool,
            MetaspaceObjType::TypeArrayU1 => self.type_array_u1,
        }
    }

    pub fn validate(self) -> Result<(), BuildError> {
        let total: u32 = MetaspaceObjType::ALL
            .iter()
            .map(|kind| u32::from(self.get(*kind)))
            .sum();
        if total != 100 {
            return Err(BuildError::InvalidRegionShares { total });
        }
        Ok(())
    }
}

/// Fixed-capacity bump region. Space is never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub kind: MetaspaceObjType,
    pub capacity: u64,
    pub used: u64,
}

impl Region {
    fn allocate(&mut self, size: u64) -> Option<u64> {
        let end = self.used.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        let offset = self.used;
        self.used = end;
        Some(offset)
    }
}

/// One object placed in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub kind: MetaspaceObjType,
    pub offset: u64,
    pub size: u64,
}

/// The scratch area a build allocates into.
#[derive(Debug, Clone)]
pub struct MetaspaceArena {
    budget: MetaspaceBudget,
    regions: [Region; 4],
}

impl MetaspaceArena {
    pub fn new(budget: MetaspaceBudget, shares: RegionShares) -> Result<Self, BuildError> {
        shares.validate()?;
        let regions = MetaspaceObjType::ALL.map(|kind| Region {
            kind,
            // Rounded down to 8 so every offset stays 8-aligned.
            capacity: (budget.bytes() / 100 * u64::from(shares.get(kind))
                + budget.bytes() % 100 * u64::from(shares.get(kind)) / 100)
                & !7,
            used: 0,
        });
        Ok(Self { budget, regions })
    }

    pub fn budget(&self) -> MetaspaceBudget {
        self.budget
    }

    pub fn regions(&self) -> &[Region; 4] {
        &self.regions
    }

    pub fn region(&self, kind: MetaspaceObjType) -> &Region {
        &self.regions[Self::index(kind)]
    }

    /// Places `size` bytes (rounded up to 8) in the region for `kind`.
    pub fn allocate(&mut self, kind: MetaspaceObjType, size: u64) -> Result<Placement, BuildError> {
        let size = jshare_core::align8(size);
        let region = &mut self.regions[Self::index(kind)];
        match region.allocate(size) {
            Some(offset) => Ok(Placement { kind, offset, size }),
            None => Err(BuildError::MetaspaceExhausted {
                kind,
                size,
                capacity: region.capacity,
                used: region.used,
            }),
        }
    }

    fn index(kind: MetaspaceObjType) -> usize {
        match kind {
            MetaspaceObjType::Symbol => 0,
            MetaspaceObjType::Class => 1,
            MetaspaceObjType::ConstantPool => 2,
            MetaspaceObjType::TypeArrayU1 => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacities_follow_shares_and_stay_within_budget() {
        let budget = MetaspaceBudget::parse("12M").unwrap();
        let arena = MetaspaceArena::new(budget, RegionShares::default()).unwrap();
        let total: u64 = arena.regions().iter().map(|r| r.capacity).sum();
        assert!(total <= budget.bytes());
        assert_eq!(
            arena.region(MetaspaceObjType::Class).capacity,
            12 * 1024 * 1024 * 30 / 100 & !7
        );
        assert!(arena.regions().iter().all(|r| r.capacity % 8 == 0));
    }

    #[test]
    fn allocation_is_monotonic_and_aligned() {
        let mut arena =
            MetaspaceArena::new(MetaspaceBudget::from_bytes(1000), RegionShares::default())
                .unwrap();
        let a = arena.allocate(MetaspaceObjType::Class, 13).unwrap();
        let b = arena.allocate(MetaspaceObjType::Class, 8).unwrap();
        assert_eq!((a.offset, a.size), (0, 16));
        assert_eq!((b.offset, b.size), (16, 8));
        assert_eq!(arena.region(MetaspaceObjType::Class).used, 24);
    }

    #[test]
    fn exhaustion_names_the_category_and_leaves_region_untouched() {
        let mut arena =
            MetaspaceArena::new(MetaspaceBudget::from_bytes(1000), RegionShares::default())
                .unwrap();
        // Symbol region holds 96 bytes.
        arena.allocate(MetaspaceObjType::Symbol, 96).unwrap();
        let err = arena.allocate(MetaspaceObjType::Symbol, 8).unwrap_err();
        match err {
            BuildError::MetaspaceExhausted { kind, size, .. } => {
                assert_eq!(kind, MetaspaceObjType::Symbol);
                assert_eq!(size, 8);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(arena.region(MetaspaceObjType::Symbol).used, 96);
    }

    #[test]
    fn shares_must_sum_to_one_hundred() {
        let shares = RegionShares {
            symbol: 50,
            ..RegionShares::default()
        };
        assert!(matches!(
            MetaspaceArena::new(MetaspaceBudget::from_bytes(1), shares),
            Err(BuildError::InvalidRegionShares { total: 140 })
        ));
    }

    #[test]
    fn tags_round_trip() {
        for kind in MetaspaceObjType::ALL {
            assert_eq!(MetaspaceObjType::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(MetaspaceObjType::from_tag(0), None);
    }
}
