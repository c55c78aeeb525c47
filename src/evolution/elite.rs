//! Bounded best-N retention of evaluated variants.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::schema::Variant;

/// Heap entry. The heap's top is the member that would be evicted first:
/// the lowest fitness, and among equal fitness the most recently inserted.
#[derive(Debug, Clone)]
struct Entry {
    fitness: f64,
    seq: u64,
    variant: Variant,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fitness
            .total_cmp(&self.fitness)
            .then(self.seq.cmp(&other.seq))
    }
}

/// The best `max_size` variants seen across a run.
///
/// Backed by a min-heap on fitness so an update costs O(log n). Members are
/// exposed in descending fitness order; ties keep insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ElitePoolDocument", into = "ElitePoolDocument")]
pub struct ElitePool {
    max_size: usize,
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl ElitePool {
    /// Create an empty pool. `max_size` must be non-zero.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            heap: BinaryHeap::with_capacity(max_size),
            next_seq: 0,
        }
    }

    /// Offer a candidate to the pool.
    ///
    /// Unevaluated candidates are rejected. When the pool is full the
    /// candidate must be strictly better than the current worst member to
    /// displace it; on a tie the incumbent stays.
    pub fn update(&mut self, candidate: Variant) -> bool {
        let Some(fitness) = candidate.fitness else {
            return false;
        };
        if fitness.is_nan() {
            return false;
        }

        if self.heap.len() < self.max_size {
            self.insert(fitness, candidate);
            return true;
        }

        match self.heap.peek() {
            Some(worst) if fitness > worst.fitness => {
                self.heap.pop();
                self.insert(fitness, candidate);
                true
            }
            _ => false,
        }
    }

    fn insert(&mut self, fitness: f64, variant: Variant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            fitness,
            seq,
            variant,
        });
    }

    /// Highest-fitness member.
    pub fn get_best(&self) -> Option<&Variant> {
        self.heap.iter().min().map(|e| &e.variant)
    }

    /// Lowest-fitness member, the next to be evicted.
    pub fn get_worst(&self) -> Option<&Variant> {
        self.heap.peek().map(|e| &e.variant)
    }

    /// Owned copy of the members, best first. Later pool updates do not
    /// affect the returned list.
    pub fn get_parents_for_next_gen(&self) -> Vec<Variant> {
        self.variants().into_iter().cloned().collect()
    }

    /// Members in descending fitness order.
    pub fn variants(&self) -> Vec<&Variant> {
        let mut entries: Vec<&Entry> = self.heap.iter().collect();
        entries.sort();
        entries.into_iter().map(|e| &e.variant).collect()
    }

    /// Whether a variant with this id is a member.
    pub fn contains(&self, id: &str) -> bool {
        self.heap.iter().any(|e| e.variant.id == id)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl PartialEq for ElitePool {
    fn eq(&self, other: &Self) -> bool {
        self.max_size == other.max_size && self.variants() == other.variants()
    }
}

/// Serialized form: capacity plus the ordered member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElitePoolDocument {
    pub max_size: usize,
    pub variants: Vec<Variant>,
}

/// Errors rebuilding a pool from its document.
#[derive(Debug, thiserror::Error)]
pub enum ElitePoolError {
    #[error("Elite pool max_size must be at least 1")]
    ZeroCapacity,
    #[error("Elite pool holds {len} variants but max_size is {max_size}")]
    OverCapacity { len: usize, max_size: usize },
    #[error("Elite pool member {0} has no fitness")]
    Unevaluated(String),
}

impl From<ElitePool> for ElitePoolDocument {
    fn from(pool: ElitePool) -> Self {
        Self {
            max_size: pool.max_size,
            variants: pool.get_parents_for_next_gen(),
        }
    }
}

impl TryFrom<ElitePoolDocument> for ElitePool {
    type Error = ElitePoolError;

    fn try_from(doc: ElitePoolDocument) -> Result<Self, Self::Error> {
        if doc.max_size == 0 {
            return Err(ElitePoolError::ZeroCapacity);
        }
        if doc.variants.len() > doc.max_size {
            return Err(ElitePoolError::OverCapacity {
                len: doc.variants.len(),
                max_size: doc.max_size,
            });
        }

        let mut pool = Self::new(doc.max_size);
        for variant in doc.variants {
            let fitness = variant
                .fitness
                .ok_or_else(|| ElitePoolError::Unevaluated(variant.id.clone()))?;
            pool.insert(fitness, variant);
        }
        Ok(pool)
    }
}
