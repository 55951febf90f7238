// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! CPU core ids, cpu lists and core masks.
//!
//! The kernel reports the cores local to a device in the sysfs "list format", e.g. `0-3,8-11`.
//! A [`CpuList`] keeps that text next to the parsed core ids, because some consumers (the
//! `isolated_cores` kernel tuning variable) want the text and others (core masks) want the ids.
//!
//! # Examples
//!
//! ```
//! # use dpdk_setup_hardware::cpu::{CoreMask, CpuList};
//! #
//! let list: CpuList = "0-7".parse().unwrap();
//! let stripped = list.without_zero_core().unwrap();
//! assert_eq!(stripped.as_str(), "1-7");
//!
//! let mask: CoreMask = stripped.cores().iter().copied().collect();
//! assert_eq!(mask.to_string(), "0xfe");
//! ```

use std::collections::BTreeSet;
use std::str::FromStr;

/// The id of a (logical) CPU core as the kernel numbers it.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
#[repr(transparent)]
pub struct CoreId(u32);

impl CoreId {
    /// Creates a new core id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw core number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for CoreId {
    fn from(value: u32) -> Self {
        CoreId(value)
    }
}

impl From<CoreId> for u32 {
    fn from(value: CoreId) -> Self {
        value.0
    }
}

impl std::fmt::Display for CoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors which may occur when parsing a cpu list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuListError {
    /// The cpu list contains no cores at all.
    #[error("cpu list is empty")]
    Empty,
    /// An element of the list is neither a core id nor a `lo-hi` range.
    #[error("invalid element {item:?} in cpu list {list:?}")]
    InvalidItem {
        /// The full list being parsed.
        list: String,
        /// The offending element.
        item: String,
    },
    /// A range whose lower bound exceeds its upper bound.
    #[error("inverted range {lo}-{hi} in cpu list {list:?}")]
    InvertedRange {
        /// The full list being parsed.
        list: String,
        /// Lower bound of the range.
        lo: u32,
        /// Upper bound of the range.
        hi: u32,
    },
    /// A core id beyond [`MAX_CORE_ID`].
    #[error("core {core} in cpu list {list:?} exceeds the largest supported core id {MAX_CORE_ID}")]
    CoreOutOfRange {
        /// The full list being parsed.
        list: String,
        /// The offending core id.
        core: u32,
    },
}

/// The largest core id a [`CpuList`] accepts (the kernel supports at most 8192 CPUs).
pub const MAX_CORE_ID: u32 = 8191;

/// A sysfs style cpu list (e.g. `local_cpulist`) in both textual and parsed form.
///
/// Accepted syntax is a comma separated sequence of items, each either a core id (`5`) or an
/// inclusive range (`8-11`).
/// Core ids are plain decimal without sign, leading zeros or whitespace, as the kernel writes them.
/// A lone core id without any separator is accepted as a one element list.
///
/// The parsed cores are kept in order of appearance.
/// An empty [`CpuList`] can not be parsed, but it can result from [`CpuList::without_zero_core`].
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CpuList {
    text: String,
    cores: Vec<CoreId>,
}

fn parse_core(list: &str, item: &str) -> Result<u32, CpuListError> {
    let invalid = || CpuListError::InvalidItem {
        list: list.to_string(),
        item: item.to_string(),
    };
    let canonical = !item.is_empty()
        && item.bytes().all(|b| b.is_ascii_digit())
        && (item == "0" || !item.starts_with('0'));
    if !canonical {
        return Err(invalid());
    }
    let core = item.parse::<u32>().map_err(|_| invalid())?;
    if core > MAX_CORE_ID {
        return Err(CpuListError::CoreOutOfRange {
            list: list.to_string(),
            core,
        });
    }
    Ok(core)
}

impl FromStr for CpuList {
    type Err = CpuListError;

    /// Parses a cpu list, ignoring surrounding whitespace (the text usually comes straight out of a
    /// sysfs file, trailing newline included).
    ///
    /// # Errors
    ///
    /// Returns [`CpuListError`] if the list is empty or any element is malformed.
    fn from_str(s: &str) -> Result<Self, CpuListError> {
        let text = s.trim();
        if text.is_empty() {
            return Err(CpuListError::Empty);
        }
        let mut cores = Vec::new();
        for item in text.split(',') {
            if let Some((lo, hi)) = item.split_once('-') {
                let lo = parse_core(text, lo)?;
                let hi = parse_core(text, hi)?;
                if lo > hi {
                    return Err(CpuListError::InvertedRange {
                        list: text.to_string(),
                        lo,
                        hi,
                    });
                }
                cores.extend((lo..=hi).map(CoreId));
            } else {
                cores.push(CoreId(parse_core(text, item)?));
            }
        }
        Ok(CpuList {
            text: text.to_string(),
            cores,
        })
    }
}

impl TryFrom<&str> for CpuList {
    type Error = CpuListError;

    fn try_from(value: &str) -> Result<Self, CpuListError> {
        value.parse()
    }
}

impl CpuList {
    /// The list in its textual (sysfs) form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The listed cores, in order of appearance.
    #[must_use]
    pub fn cores(&self) -> &[CoreId] {
        &self.cores
    }

    /// The listed cores as a set.
    #[must_use]
    pub fn core_set(&self) -> CoreSet {
        self.cores.iter().copied().collect()
    }

    /// Returns true if the list names no cores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Returns a copy of this list with core 0 removed, see [`strip_zero_core`].
    ///
    /// # Errors
    ///
    /// Returns [`CpuListError`] if the stripped text does not parse.
    /// Lists obtained by parsing always strip to a valid (possibly empty) list.
    pub fn without_zero_core(&self) -> Result<CpuList, CpuListError> {
        let text = strip_zero_core(&self.text);
        if text.is_empty() {
            return Ok(CpuList::default());
        }
        text.parse()
    }

    /// Merge several lists into one.
    ///
    /// Distinct non-empty texts are joined with commas in order of first appearance, and the cores
    /// of each distinct text are appended in the same order.
    #[must_use]
    pub fn merge<'a>(lists: impl IntoIterator<Item = &'a CpuList>) -> CpuList {
        let mut seen: Vec<&CpuList> = Vec::new();
        for list in lists {
            if !list.is_empty() && !seen.iter().any(|s| s.text == list.text) {
                seen.push(list);
            }
        }
        CpuList {
            text: seen
                .iter()
                .map(|list| list.text.as_str())
                .collect::<Vec<_>>()
                .join(","),
            cores: seen
                .iter()
                .flat_map(|list| list.cores.iter().copied())
                .collect(),
        }
    }
}

impl std::fmt::Display for CpuList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Remove core 0 from a raw cpu list string.
///
/// Core 0 is left to the rest of the system.
/// Only the first character is inspected: if it is `0`
///
/// - `0-7` becomes `1-7` (the lower bound of the leading range is advanced),
/// - `0,2,4` becomes `2,4` (the leading element is dropped),
/// - anything else (e.g. exactly `0`) becomes the empty string.
///
/// A leading range which empties out (`0-0`) is dropped entirely.
/// Lists which do not start with `0` are returned unchanged (whitespace trimmed).
///
/// ```
/// # use dpdk_setup_hardware::cpu::strip_zero_core;
/// assert_eq!(strip_zero_core("0-3"), "1-3");
/// assert_eq!(strip_zero_core("0,2,5"), "2,5");
/// assert_eq!(strip_zero_core("0"), "");
/// assert_eq!(strip_zero_core("4-7\n"), "4-7");
/// ```
#[must_use]
pub fn strip_zero_core(raw: &str) -> String {
    let raw = raw.trim();
    let mut chars = raw.chars();
    if chars.next() != Some('0') {
        return raw.to_string();
    }
    match chars.next() {
        Some('-') => {
            let rest = &raw[1..];
            let (leading, tail) = match rest.split_once(',') {
                Some((leading, tail)) => (leading, Some(tail)),
                None => (rest, None),
            };
            if leading.trim_start_matches('-').trim() == "0" {
                tail.unwrap_or_default().to_string()
            } else {
                format!("1{rest}")
            }
        }
        Some(',') => raw[2..].to_string(),
        _ => String::new(),
    }
}

/// An ordered set of core ids.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CoreSet(BTreeSet<CoreId>);

impl CoreSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a core, returning false if it was already present.
    pub fn insert(&mut self, core: CoreId) -> bool {
        self.0.insert(core)
    }

    /// Returns true if the core is a member of this set.
    #[must_use]
    pub fn contains(&self, core: CoreId) -> bool {
        self.0.contains(&core)
    }

    /// Number of cores in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no cores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The smallest core in the set, if any.
    #[must_use]
    pub fn min(&self) -> Option<CoreId> {
        self.0.first().copied()
    }

    /// Removes and returns the smallest core in the set.
    pub fn pop_min(&mut self) -> Option<CoreId> {
        self.0.pop_first()
    }

    /// Iterate the cores in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = CoreId> + '_ {
        self.0.iter().copied()
    }

    /// Cores which are members of either set.
    #[must_use]
    pub fn union(&self, other: &CoreSet) -> CoreSet {
        CoreSet(self.0.union(&other.0).copied().collect())
    }

    /// Cores which are members of this set but not of `other`.
    #[must_use]
    pub fn difference(&self, other: &CoreSet) -> CoreSet {
        CoreSet(self.0.difference(&other.0).copied().collect())
    }
}

impl FromIterator<CoreId> for CoreSet {
    fn from_iter<T: IntoIterator<Item = CoreId>>(iter: T) -> Self {
        CoreSet(iter.into_iter().collect())
    }
}

impl IntoIterator for CoreSet {
    type Item = CoreId;
    type IntoIter = std::collections::btree_set::IntoIter<CoreId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A bitmask with bit `i` set iff core `i` is selected.
///
/// The mask has no fixed width, so core ids of any size are representable.
/// It displays as lowercase hex with a `0x` prefix and no zero padding (`{0, 2, 3}` is `0xd`,
/// the empty mask is `0x0`), which is the form both the DPDK EAL and Open vSwitch accept.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CoreMask {
    // little endian: words[0] holds cores 0..64; never ends with a zero word
    words: Vec<u64>,
}

impl CoreMask {
    const WORD_BITS: u32 = u64::BITS;

    /// Creates an empty mask.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)] // word index of a u32 core id always fits
    fn position(core: CoreId) -> (usize, u32) {
        ((core.0 / Self::WORD_BITS) as usize, core.0 % Self::WORD_BITS)
    }

    /// Sets the bit for `core`.
    pub fn set(&mut self, core: CoreId) {
        let (word, bit) = Self::position(core);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    /// Returns true if the bit for `core` is set.
    #[must_use]
    pub fn contains(&self, core: CoreId) -> bool {
        let (word, bit) = Self::position(core);
        self.words.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterate the selected cores in ascending order.
    pub fn cores(&self) -> impl Iterator<Item = CoreId> + '_ {
        (0u32..)
            .zip(self.words.iter())
            .flat_map(|(index, &word)| {
                (0..Self::WORD_BITS)
                    .filter(move |bit| word & (1 << bit) != 0)
                    .map(move |bit| CoreId(index * Self::WORD_BITS + bit))
            })
    }
}

impl FromIterator<CoreId> for CoreMask {
    fn from_iter<T: IntoIterator<Item = CoreId>>(iter: T) -> Self {
        let mut mask = CoreMask::new();
        for core in iter {
            mask.set(core);
        }
        mask
    }
}

impl<'a> FromIterator<&'a CoreId> for CoreMask {
    fn from_iter<T: IntoIterator<Item = &'a CoreId>>(iter: T) -> Self {
        iter.into_iter().copied().collect()
    }
}

impl std::fmt::LowerHex for CoreMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut words = self.words.iter().rev();
        match words.next() {
            None => write!(f, "0")?,
            Some(most_significant) => write!(f, "{most_significant:x}")?,
        }
        for word in words {
            write!(f, "{word:016x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for CoreMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{self:x}")
    }
}
