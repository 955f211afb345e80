//! Sets of encodings that agree on a known collection of bits.
//!
//! Every split produces fresh sets; [`SharedBits`] is a `Copy` value, so extending it for one
//! branch can never leak into a sibling.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::bit::{Bit, BitValue};
use super::encoding::{Encoding, EncodingId, WORD_BITS, position_mask};
use super::error::IsaError;
use super::ranges::{RangeExpr, compact};

/// Positions every member of a set is known to share, with their values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SharedBits {
    mask: u32,
    value: u32,
}

impl SharedBits {
    pub const EMPTY: SharedBits = SharedBits { mask: 0, value: 0 };

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u8, Bit)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::EMPTY, |shared, (position, bit)| shared.with(position, bit))
    }

    pub fn get(self, position: u8) -> Option<Bit> {
        let mask = position_mask(position);
        (self.mask & mask != 0).then(|| Bit::from_u32((self.value & mask != 0) as u32))
    }

    pub fn contains(self, position: u8) -> bool {
        self.get(position).is_some()
    }

    /// Returns a copy with `position` fixed to `bit`. Positions outside the word are ignored;
    /// [`EncodingsSet::split_on`] rejects them with [`IsaError::Index`].
    pub fn with(self, position: u8, bit: Bit) -> Self {
        let mask = position_mask(position);
        Self {
            mask: self.mask | mask,
            value: (self.value & !mask) | (bit.as_u32() * mask),
        }
    }

    /// Drops every position selected by `mask`.
    pub fn without(self, mask: u32) -> Self {
        Self {
            mask: self.mask & !mask,
            value: self.value & !mask,
        }
    }

    pub fn len(self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.mask == 0
    }

    /// Shared positions in ascending order.
    pub fn iter(self) -> impl Iterator<Item = (u8, Bit)> {
        (0..WORD_BITS as u8).filter_map(move |position| self.get(position).map(|bit| (position, bit)))
    }

    /// Mask in machine numbering.
    pub fn mask(self) -> u32 {
        self.mask
    }

    /// Expected value under [`SharedBits::mask`].
    pub fn value(self) -> u32 {
        self.value
    }
}

impl fmt::Display for SharedBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for position in 0..WORD_BITS as u8 {
            match self.get(position) {
                Some(bit) => write!(f, "{bit}")?,
                None => f.write_str("x")?,
            }
        }
        Ok(())
    }
}

/// A set of encodings plus the bits all of them are known to share.
///
/// Members never contradict a shared bit: each member either lists the shared value at that
/// position (bound or unpredictably bound) or leaves the position unbound.
#[derive(Debug, Clone)]
pub struct EncodingsSet<'a> {
    members: BTreeMap<EncodingId, &'a Encoding>,
    shared: SharedBits,
}

impl<'a> EncodingsSet<'a> {
    pub fn new(
        encodings: impl IntoIterator<Item = &'a Encoding>,
        shared: SharedBits,
    ) -> Result<Self, IsaError> {
        let mut set = Self::empty(shared);
        for encoding in encodings {
            set.insert(encoding)?;
        }
        Ok(set)
    }

    /// A memberless set; used as a split accumulator.
    pub fn empty(shared: SharedBits) -> Self {
        Self {
            members: BTreeMap::new(),
            shared,
        }
    }

    /// Adds `encoding`, leaving the set untouched if it contradicts a shared bit.
    pub fn insert(&mut self, encoding: &'a Encoding) -> Result<(), IsaError> {
        check_shared(encoding, self.shared)?;
        self.members.insert(encoding.id(), encoding);
        Ok(())
    }

    /// The tightest set isolating `encoding`: exactly its strictly bound bits are shared.
    pub fn make_singleton_tightened(encoding: &'a Encoding) -> Self {
        let shared = SharedBits::from_pairs(
            encoding
                .bits()
                .iter()
                .enumerate()
                .filter_map(|(position, value)| match value {
                    BitValue::Bound(bit) => Some((position as u8, *bit)),
                    _ => None,
                }),
        );
        Self {
            members: BTreeMap::from([(encoding.id(), encoding)]),
            shared,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    pub fn singleton(&self) -> Option<&'a Encoding> {
        match self.members.values().next() {
            Some(encoding) if self.is_singleton() => Some(*encoding),
            _ => None,
        }
    }

    pub fn contains(&self, id: EncodingId) -> bool {
        self.members.contains_key(&id)
    }

    /// Members in ascending id order.
    pub fn encodings(&self) -> impl Iterator<Item = &'a Encoding> + '_ {
        self.members.values().copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = EncodingId> + '_ {
        self.members.keys().copied()
    }

    pub fn shared_bits(&self) -> SharedBits {
        self.shared
    }

    pub fn ordered_shared_bits(&self) -> impl Iterator<Item = (u8, Bit)> {
        self.shared.iter()
    }

    fn unshared_positions(&self) -> impl Iterator<Item = u8> + '_ {
        (0..WORD_BITS as u8).filter(|position| !self.shared.contains(*position))
    }

    /// Unshared positions no member leaves unbound. Unpredictable bits count as bound here:
    /// a split only needs some listed value, not an architecturally reliable one.
    pub fn find_commonly_bound_positions(&self) -> BTreeSet<u8> {
        self.unshared_positions()
            .filter(|position| {
                self.members
                    .values()
                    .all(|encoding| !encoding.bit_at(*position).is_unbound())
            })
            .collect()
    }

    /// Unshared positions strictly bound in at least one member.
    pub fn find_uncommonly_bound_positions(&self) -> BTreeSet<u8> {
        self.unshared_positions()
            .filter(|position| {
                self.members
                    .values()
                    .any(|encoding| encoding.bit_at(*position).is_bound())
            })
            .collect()
    }

    /// Splits into `(zeros, ones)` on a position not yet shared. Members unbound at `position`
    /// land on both sides.
    pub fn split_on(&self, position: u8) -> Result<(Self, Self), IsaError> {
        if position as usize >= WORD_BITS {
            return Err(IsaError::Index {
                position: position as usize,
                width: WORD_BITS,
            });
        }
        if self.shared.contains(position) {
            return Err(IsaError::AlreadyShared(position));
        }
        let mut zeros = Self::empty(self.shared.with(position, Bit::Zero));
        let mut ones = Self::empty(self.shared.with(position, Bit::One));
        for encoding in self.members.values().copied() {
            let value = encoding.bit_at(position);
            if value.admits(Bit::Zero) {
                zeros.insert(encoding)?;
            }
            if value.admits(Bit::One) {
                ones.insert(encoding)?;
            }
        }
        Ok((zeros, ones))
    }

    /// Applies [`EncodingsSet::split_on`] for every position. Empty subsets are dropped as they
    /// appear, so the result holds at most `2^n` non-empty sets, sorted.
    pub fn split_on_many(
        &self,
        positions: impl IntoIterator<Item = u8>,
    ) -> Result<Vec<Self>, IsaError> {
        let mut sets = vec![self.clone()];
        for position in positions {
            let mut next = Vec::with_capacity(sets.len() * 2);
            for set in &sets {
                let (zeros, ones) = set.split_on(position)?;
                next.extend([zeros, ones].into_iter().filter(|subset| !subset.is_empty()));
            }
            sets = next;
        }
        sets.sort();
        Ok(sets)
    }

    /// One split on every commonly bound position. A single resulting set means nothing more
    /// can be learnt from this set's members.
    pub fn split_on_commonly_bound(&self) -> Result<Vec<Self>, IsaError> {
        self.split_on_many(self.find_commonly_bound_positions())
    }

    /// Shared bits compacted into contiguous masked-compare tests.
    pub fn shared_bits_as_ranges(&self) -> RangeExpr {
        compact(self.shared)
    }

    /// Members ordered from most to least specific, ties broken by id.
    pub fn encodings_by_increasing_unbound(&self) -> Vec<&'a Encoding> {
        let mut ordered: Vec<&'a Encoding> = self.encodings().collect();
        ordered.sort_by_key(|encoding| (encoding.unbound_count(), encoding.id()));
        ordered
    }
}

fn check_shared(encoding: &Encoding, shared: SharedBits) -> Result<(), IsaError> {
    for (position, bit) in shared.iter() {
        let value = encoding.bit_at(position);
        if !value.admits(bit) {
            return Err(IsaError::InvariantViolation {
                encoding: encoding.name().to_string(),
                position,
                expected: bit,
                found: value.to_string(),
            });
        }
    }
    Ok(())
}

impl PartialEq for EncodingsSet<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EncodingsSet<'_> {}

impl PartialOrd for EncodingsSet<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EncodingsSet<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.shared
            .cmp(&other.shared)
            .then_with(|| self.members.keys().cmp(other.members.keys()))
    }
}

impl fmt::Display for EncodingsSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} encodings share the bits: {}",
            self.len(),
            self.shared
        )?;
        for encoding in self.encodings_by_increasing_unbound() {
            let operands: Vec<&str> = encoding
                .named_fields()
                .map(|field| field.name.as_str())
                .collect();
            writeln!(
                f,
                "- {encoding} [{}] {}",
                encoding.name(),
                operands.join(",")
            )?;
        }
        Ok(())
    }
}
