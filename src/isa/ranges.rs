//! Compaction of shared bits into contiguous masked-compare tests.
//!
//! A run of shared bits becomes one [`RangeTest`]. A single unshared bit with shared
//! neighbours on both sides stays inside the run and forks it into two alternatives, so a run
//! with `k` such holes yields `2^k` tests over the same span. Everything else separates runs.

use smallvec::SmallVec;

use super::bit::Bit;
use super::encoding::WORD_BITS;
use super::set::SharedBits;

/// Compare of `value` against machine bits `high_bit..=low_bit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RangeTest {
    pub value: u32,
    pub high_bit: u8,
    pub low_bit: u8,
}

impl RangeTest {
    pub fn width(&self) -> u32 {
        (self.high_bit - self.low_bit) as u32 + 1
    }

    pub fn mask(&self) -> u32 {
        let ones = if self.width() >= WORD_BITS as u32 {
            u32::MAX
        } else {
            (1u32 << self.width()) - 1
        };
        ones << self.low_bit
    }

    /// `value` shifted into place under [`RangeTest::mask`].
    pub fn expected(&self) -> u32 {
        self.value << self.low_bit
    }

    pub fn matches(&self, word: u32) -> bool {
        word & self.mask() == self.expected()
    }

    /// Left-numbered position of the first bit in the span.
    pub fn first_position(&self) -> u8 {
        WORD_BITS as u8 - 1 - self.high_bit
    }

    pub fn last_position(&self) -> u8 {
        WORD_BITS as u8 - 1 - self.low_bit
    }
}

/// Alternatives over one span; any of them matching satisfies the clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeClause {
    alternatives: SmallVec<[RangeTest; 2]>,
}

impl RangeClause {
    pub fn alternatives(&self) -> &[RangeTest] {
        &self.alternatives
    }

    /// Span shared by every alternative, as `(high_bit, low_bit)`.
    pub fn span(&self) -> (u8, u8) {
        self.alternatives
            .first()
            .map(|test| (test.high_bit, test.low_bit))
            .unwrap_or((0, 0))
    }

    pub fn mask(&self) -> u32 {
        self.alternatives.first().map(RangeTest::mask).unwrap_or(0)
    }

    pub fn matches(&self, word: u32) -> bool {
        self.alternatives.iter().any(|test| test.matches(word))
    }
}

/// Conjunction of clauses; every clause must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RangeExpr {
    clauses: Vec<RangeClause>,
}

impl RangeExpr {
    pub fn clauses(&self) -> &[RangeClause] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, word: u32) -> bool {
        self.clauses.iter().all(|clause| clause.matches(word))
    }
}

struct Run {
    values: SmallVec<[u32; 2]>,
    first: u8,
    last: u8,
}

impl Run {
    fn start(position: u8) -> Self {
        Self {
            values: SmallVec::from_elem(0, 1),
            first: position,
            last: position,
        }
    }

    fn push_bit(&mut self, position: u8, bit: Bit) {
        for value in &mut self.values {
            *value = (*value << 1) | bit.as_u32();
        }
        self.last = position;
    }

    fn push_hole(&mut self, position: u8) {
        self.values = self
            .values
            .iter()
            .flat_map(|value| [value << 1, (value << 1) | 1])
            .collect();
        self.last = position;
    }

    fn finish(self) -> RangeClause {
        let high_bit = WORD_BITS as u8 - 1 - self.first;
        let low_bit = WORD_BITS as u8 - 1 - self.last;
        RangeClause {
            alternatives: self
                .values
                .into_iter()
                .map(|value| RangeTest {
                    value,
                    high_bit,
                    low_bit,
                })
                .collect(),
        }
    }
}

/// Compacts `shared` into the fewest contiguous tests.
pub fn compact(shared: SharedBits) -> RangeExpr {
    let last = WORD_BITS as u8 - 1;
    let mut clauses = Vec::new();
    let mut run: Option<Run> = None;
    for position in 0..=last {
        if let Some(bit) = shared.get(position) {
            run.get_or_insert_with(|| Run::start(position))
                .push_bit(position, bit);
            continue;
        }
        let interior = position > 0
            && position < last
            && shared.contains(position - 1)
            && shared.contains(position + 1);
        if interior && let Some(current) = run.as_mut() {
            current.push_hole(position);
        } else if let Some(done) = run.take() {
            clauses.push(done.finish());
        }
    }
    if let Some(done) = run {
        clauses.push(done.finish());
    }
    RangeExpr { clauses }
}
