//! Named feature bits and the masks built from them.

use crate::error::{FlagError, FlagResult};
use std::collections::HashSet;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of flags a [`FlagSet`] can allocate.
pub const MAX_FLAGS: usize = 64;

/// Name of the synthetic member covering every declared flag.
pub const ALL: &str = "ALL";

/// Name of the synthetic empty member.
pub const NONE: &str = "NONE";

// Older callers spelled the empty member this way.
const NONE_ALIAS: &str = "None";

/// A set of feature bits.
///
/// A single flag is a mask with exactly one bit set. Requests, dependency
/// declarations and executed state are all masks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlagMask(u64);

impl FlagMask {
    /// The empty mask.
    pub const NONE: Self = Self(0);

    /// Wrap raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits of the mask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True when no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when the masks share at least one bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when every bit of `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bits of `self` that are not set in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Number of set bits.
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Single-bit components of the mask, lowest bit first.
    pub fn iter(self) -> impl Iterator<Item = FlagMask> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let lowest = rest & rest.wrapping_neg();
            rest &= !lowest;
            Some(FlagMask(lowest))
        })
    }
}

impl From<u64> for FlagMask {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl BitOr for FlagMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FlagMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FlagMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for FlagMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for FlagMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Display for FlagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Binary for FlagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for FlagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Named flags allocated one bit each, in declaration order.
///
/// # Example
///
/// ```
/// use convenient_flags::FlagSet;
///
/// let flags = FlagSet::allocate(["BASE", "FEATURE_ONE", "FEATURE_TWO"]).unwrap();
/// assert_eq!(flags.get("FEATURE_TWO").unwrap().bits(), 4);
/// assert_eq!(flags.all().bits(), 7);
/// assert!(flags.get("FEATURE_THREE").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet {
    names: Vec<(String, FlagMask)>,
    all: FlagMask,
}

impl FlagSet {
    /// Assign bit `2^i` to the i-th name.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::Configuration` if more than [`MAX_FLAGS`] names are
    /// given, or a name is empty, repeated or reserved (`ALL`, `NONE`).
    pub fn allocate<I, S>(names: I) -> FlagResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut allocated = Vec::new();

        for (index, name) in names.into_iter().enumerate() {
            let name = name.into();
            if index >= MAX_FLAGS {
                return Err(FlagError::Configuration(format!(
                    "cannot allocate more than {MAX_FLAGS} flags (got '{name}' at position {index})"
                )));
            }
            if name.is_empty() {
                return Err(FlagError::Configuration(format!(
                    "flag name at position {index} is empty"
                )));
            }
            if name == ALL || name == NONE || name == NONE_ALIAS {
                return Err(FlagError::Configuration(format!(
                    "flag name '{name}' is reserved"
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(FlagError::Configuration(format!(
                    "flag name '{name}' declared twice"
                )));
            }
            allocated.push((name, FlagMask(1 << index)));
        }

        let all = allocated
            .iter()
            .fold(FlagMask::NONE, |acc, &(_, flag)| acc | flag);

        Ok(Self {
            names: allocated,
            all,
        })
    }

    /// Look up a flag by name, including the synthetic `ALL` and `NONE`.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::UnknownFlag` if the name was never declared.
    pub fn get(&self, name: &str) -> FlagResult<FlagMask> {
        match name {
            ALL => Ok(self.all),
            NONE | NONE_ALIAS => Ok(FlagMask::NONE),
            _ => self
                .names
                .iter()
                .find(|(declared, _)| declared == name)
                .map(|&(_, flag)| flag)
                .ok_or_else(|| FlagError::UnknownFlag(name.to_string())),
        }
    }

    /// Union of every declared flag.
    #[must_use]
    pub fn all(&self) -> FlagMask {
        self.all
    }

    /// The empty mask.
    #[must_use]
    pub fn none(&self) -> FlagMask {
        FlagMask::NONE
    }

    /// Number of declared flags (synthetic members excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no flag was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Declared `(name, flag)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FlagMask)> {
        self.names.iter().map(|(name, flag)| (name.as_str(), *flag))
    }

    /// Union of the names in a `|` or `,` separated expression.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::UnknownFlag` for the first name not in the set.
    pub fn parse(&self, expr: &str) -> FlagResult<FlagMask> {
        expr.split(['|', ','])
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(FlagMask::NONE, |acc, name| Ok(acc | self.get(name)?))
    }

    /// Declared names whose bit is set in `mask`.
    #[must_use]
    pub fn names_of(&self, mask: FlagMask) -> Vec<&str> {
        self.names
            .iter()
            .filter(|(_, flag)| mask.intersects(*flag))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (name, flag) in &self.names {
            write!(f, "{name}: {}, ", flag.bits())?;
        }
        write!(f, "{ALL}: {}, {NONE}: 0}}", self.all.bits())
    }
}
