//! Recursive partitioning of an encoding universe into uniquely identifying leaves.
//!
//! Each level splits simultaneously on every position all current members bind. A subset that
//! holds one encoding is re-tightened to that encoding's own bound bits and never split again;
//! a subset that cannot be split further, or that reaches the depth cap, is reported as
//! ambiguous rather than failing the build.

use std::fmt;

use log::{debug, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::encoding::EncodingId;
use super::error::IsaError;
use super::ranges::RangeExpr;
use super::set::{EncodingsSet, SharedBits};

/// Recursion levels explored before a multi-member set is given up on.
pub const DEFAULT_DEPTH_CAP: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeafKind {
    /// Exactly one encoding, with tightened shared bits.
    Singleton,
    /// Several encodings that share every bit any of them binds.
    Irreducible,
    /// Several encodings left over when the depth cap was reached.
    DepthExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Leaf<'a> {
    pub set: EncodingsSet<'a>,
    pub kind: LeafKind,
}

impl<'a> Leaf<'a> {
    fn singleton(set: &EncodingsSet<'a>) -> Option<Self> {
        set.singleton().map(|encoding| Leaf {
            set: EncodingsSet::make_singleton_tightened(encoding),
            kind: LeafKind::Singleton,
        })
    }

    pub fn is_ambiguous(&self) -> bool {
        self.kind != LeafKind::Singleton
    }

    pub fn ranges(&self) -> RangeExpr {
        self.set.shared_bits_as_ranges()
    }
}

/// A leaf the builder could not narrow to one encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub encodings: Vec<EncodingId>,
    pub names: Vec<String>,
    pub shared_bits: SharedBits,
    pub depth_exhausted: bool,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}} share {}", self.names.join(", "), self.shared_bits)?;
        if self.depth_exhausted {
            f.write_str(" (depth cap reached)")?;
        }
        Ok(())
    }
}

/// The leaves of one build, sorted and free of duplicates.
#[derive(Debug, Clone, Default)]
pub struct DecodeForest<'a> {
    leaves: Vec<Leaf<'a>>,
}

impl<'a> DecodeForest<'a> {
    pub fn leaves(&self) -> &[Leaf<'a>] {
        &self.leaves
    }

    pub fn into_leaves(self) -> Vec<Leaf<'a>> {
        self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The singleton leaf isolating `id`, if the build produced one.
    pub fn singleton_for(&self, id: EncodingId) -> Option<&Leaf<'a>> {
        self.leaves
            .iter()
            .find(|leaf| leaf.kind == LeafKind::Singleton && leaf.set.contains(id))
    }

    pub fn ambiguities(&self) -> Vec<Ambiguity> {
        self.leaves
            .iter()
            .filter(|leaf| leaf.is_ambiguous())
            .map(|leaf| Ambiguity {
                encodings: leaf.set.ids().collect(),
                names: leaf.set.encodings().map(|enc| enc.name().to_string()).collect(),
                shared_bits: leaf.set.shared_bits(),
                depth_exhausted: leaf.kind == LeafKind::DepthExhausted,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    depth_cap: usize,
    /// Fan sibling subtrees out over rayon; only honoured with the `parallel` feature.
    parallel: bool,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_CAP)
    }
}

impl TreeBuilder {
    pub fn new(depth_cap: usize) -> Self {
        Self {
            depth_cap,
            parallel: cfg!(feature = "parallel"),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Whether sibling subtrees are actually built concurrently.
    pub fn is_parallel(&self) -> bool {
        self.parallel && cfg!(feature = "parallel")
    }

    pub fn depth_cap(&self) -> usize {
        self.depth_cap
    }

    pub fn build<'a>(&self, root: EncodingsSet<'a>) -> Result<DecodeForest<'a>, IsaError> {
        let mut leaves = self.build_at(root, 0)?;
        leaves.sort();
        leaves.dedup();
        let forest = DecodeForest { leaves };
        for ambiguity in forest.ambiguities() {
            warn!("ambiguous leaf: {ambiguity}");
        }
        debug!(
            "built {} leaves ({} ambiguous, parallel: {})",
            forest.len(),
            forest.leaves.iter().filter(|leaf| leaf.is_ambiguous()).count(),
            self.is_parallel()
        );
        Ok(forest)
    }

    fn build_at<'a>(&self, root: EncodingsSet<'a>, depth: usize) -> Result<Vec<Leaf<'a>>, IsaError> {
        if root.is_empty() {
            return Ok(Vec::new());
        }
        if depth > self.depth_cap {
            let leaf = Leaf::singleton(&root).unwrap_or(Leaf {
                set: root,
                kind: LeafKind::DepthExhausted,
            });
            return Ok(vec![leaf]);
        }

        let subsets: Vec<EncodingsSet<'a>> = root
            .split_on_commonly_bound()?
            .into_iter()
            .filter(|subset| !subset.is_empty())
            .collect();
        let terminal = subsets.len() == 1;
        debug!(
            "depth {depth}: {} encodings split into {} subsets",
            root.len(),
            subsets.len()
        );

        let expand = |subset: EncodingsSet<'a>| -> Result<Vec<Leaf<'a>>, IsaError> {
            if let Some(leaf) = Leaf::singleton(&subset) {
                Ok(vec![leaf])
            } else if terminal {
                Ok(vec![Leaf {
                    set: subset,
                    kind: LeafKind::Irreducible,
                }])
            } else {
                self.build_at(subset, depth + 1)
            }
        };

        #[cfg(feature = "parallel")]
        let nested: Vec<Result<Vec<Leaf<'a>>, IsaError>> = if self.parallel {
            subsets.into_par_iter().map(expand).collect()
        } else {
            subsets.into_iter().map(expand).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let nested: Vec<Result<Vec<Leaf<'a>>, IsaError>> = subsets.into_iter().map(expand).collect();

        let mut leaves = Vec::new();
        for result in nested {
            leaves.extend(result?);
        }
        Ok(leaves)
    }
}

/// Builds the forest for `root` with an explicit depth cap.
pub fn build<'a>(root: EncodingsSet<'a>, depth_cap: usize) -> Result<DecodeForest<'a>, IsaError> {
    TreeBuilder::new(depth_cap).build(root)
}
