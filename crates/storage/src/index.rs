//! Per-key value indexes
//!
//! Every key owns a [`KeyIndex<T>`]: a hash map for O(1) equality lookup and
//! an ordered map for O(log n) range lookup, both from the column value to
//! the records holding it.
//!
//! # Design
//!
//! - Buckets are `SmallVec`s: most values are held by one record.
//! - Within a bucket, records keep insertion order.
//! - [`ErasedKeyIndex`] hides `T` behind a trait object so the store can
//!   hold columns of unrelated types in one map. The typed view is
//!   recovered with a checked downcast.

use crate::record::VaultRecord;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use vault_core::{KeyValue, RecordId, TypeTag, TypedCell};

/// Records holding one value
pub type Bucket = SmallVec<[Arc<VaultRecord>; 1]>;

/// Hash + ordered index for one key of type `T`
pub struct KeyIndex<T: KeyValue> {
    hashed: FxHashMap<T, Bucket>,
    ordered: BTreeMap<T, Bucket>,
    entries: usize,
}

impl<T: KeyValue> KeyIndex<T> {
    /// Create an empty index
    pub fn new() -> Self {
        KeyIndex {
            hashed: FxHashMap::default(),
            ordered: BTreeMap::new(),
            entries: 0,
        }
    }

    /// Index `record` under `value`
    pub fn insert(&mut self, value: T, record: Arc<VaultRecord>) {
        self.hashed
            .entry(value.clone())
            .or_default()
            .push(Arc::clone(&record));
        self.ordered.entry(value).or_default().push(record);
        self.entries += 1;
    }

    /// Remove the entry of record `id` under `value`
    ///
    /// Returns false if no such entry exists.
    pub fn remove(&mut self, value: &T, id: RecordId) -> bool {
        let removed = Self::remove_from(&mut self.hashed, value, id);
        if removed {
            Self::remove_from(&mut self.ordered, value, id);
            self.entries -= 1;
        }
        removed
    }

    fn remove_from<M>(map: &mut M, value: &T, id: RecordId) -> bool
    where
        M: BucketMap<T>,
    {
        let Some(bucket) = map.bucket_mut(value) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|r| r.id() == id) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            map.remove_bucket(value);
        }
        true
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.hashed.clear();
        self.ordered.clear();
        self.entries = 0;
    }

    /// Records holding exactly `value`
    pub fn get(&self, value: &T) -> &[Arc<VaultRecord>] {
        self.hashed.get(value).map_or(&[][..], |b| b.as_slice())
    }

    /// Whether any record holds `value`
    pub fn contains(&self, value: &T) -> bool {
        self.hashed.contains_key(value)
    }

    /// Records whose value lies within the bounds, in ascending order
    ///
    /// Inverted or empty bounds yield nothing.
    pub fn range<'a>(
        &'a self,
        lower: Bound<&'a T>,
        upper: Bound<&'a T>,
    ) -> impl Iterator<Item = &'a Arc<VaultRecord>> + 'a {
        let valid = match (lower, upper) {
            (Bound::Included(a), Bound::Included(b)) => a <= b,
            (Bound::Included(a), Bound::Excluded(b)) | (Bound::Excluded(a), Bound::Included(b)) => {
                a <= b
            }
            (Bound::Excluded(a), Bound::Excluded(b)) => a < b,
            _ => true,
        };
        valid
            .then(|| self.ordered.range::<T, _>((lower, upper)))
            .into_iter()
            .flatten()
            .flat_map(|(_, bucket)| bucket.iter())
    }

    /// Visit records in value order until `visitor` returns false
    pub fn visit_sorted(&self, reverse: bool, visitor: &mut dyn FnMut(&Arc<VaultRecord>) -> bool) {
        let buckets: Box<dyn Iterator<Item = &Bucket>> = if reverse {
            Box::new(self.ordered.values().rev())
        } else {
            Box::new(self.ordered.values())
        };
        for bucket in buckets {
            for record in bucket {
                if !visitor(record) {
                    return;
                }
            }
        }
    }

    /// Number of (value, record) entries
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of distinct values
    pub fn distinct_values(&self) -> usize {
        self.hashed.len()
    }
}

impl<T: KeyValue> Default for KeyIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: KeyValue> fmt::Debug for KeyIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyIndex")
            .field("type", &TypeTag::of::<T>())
            .field("entries", &self.entries)
            .field("distinct_values", &self.hashed.len())
            .finish()
    }
}

/// Common bucket access for the hash and ordered maps
trait BucketMap<T> {
    fn bucket_mut(&mut self, value: &T) -> Option<&mut Bucket>;
    fn remove_bucket(&mut self, value: &T);
}

impl<T: KeyValue> BucketMap<T> for FxHashMap<T, Bucket> {
    fn bucket_mut(&mut self, value: &T) -> Option<&mut Bucket> {
        self.get_mut(value)
    }

    fn remove_bucket(&mut self, value: &T) {
        self.remove(value);
    }
}

impl<T: KeyValue> BucketMap<T> for BTreeMap<T, Bucket> {
    fn bucket_mut(&mut self, value: &T) -> Option<&mut Bucket> {
        self.get_mut(value)
    }

    fn remove_bucket(&mut self, value: &T) {
        self.remove(value);
    }
}

// ============================================================================
// Type-erased view
// ============================================================================

/// A [`KeyIndex`] with its value type erased
///
/// Each method takes or yields [`TypedCell`]s; cells of the wrong type are
/// rejected rather than indexed.
pub trait ErasedKeyIndex: Send + Sync {
    /// Type of the indexed values
    fn type_tag(&self) -> TypeTag;

    /// Index `record` under the value in `cell`
    fn add(&mut self, cell: &TypedCell, record: &Arc<VaultRecord>) -> bool;

    /// Remove the entry of record `id` under the value in `cell`
    fn erase(&mut self, cell: &TypedCell, id: RecordId) -> bool;

    /// Drop every entry
    fn clear(&mut self);

    /// Visit records in value order until `visitor` returns false
    fn visit_sorted(&self, reverse: bool, visitor: &mut dyn FnMut(&Arc<VaultRecord>) -> bool);

    /// A new, empty index of the same type
    fn copy_empty(&self) -> Box<dyn ErasedKeyIndex>;

    /// Records holding the value in `cell`
    fn holders(&self, cell: &TypedCell) -> Vec<Arc<VaultRecord>>;

    /// Parse a cell of this index's type from text
    fn parse_cell(&self, text: &str) -> Option<TypedCell>;

    /// Number of (value, record) entries
    fn len(&self) -> usize;

    /// Whether the index holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

impl<T: KeyValue> ErasedKeyIndex for KeyIndex<T> {
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn add(&mut self, cell: &TypedCell, record: &Arc<VaultRecord>) -> bool {
        match cell.get_ref::<T>() {
            Some(value) => {
                self.insert(value.clone(), Arc::clone(record));
                true
            }
            None => false,
        }
    }

    fn erase(&mut self, cell: &TypedCell, id: RecordId) -> bool {
        cell.get_ref::<T>()
            .map_or(false, |value| self.remove(value, id))
    }

    fn clear(&mut self) {
        KeyIndex::clear(self);
    }

    fn visit_sorted(&self, reverse: bool, visitor: &mut dyn FnMut(&Arc<VaultRecord>) -> bool) {
        KeyIndex::visit_sorted(self, reverse, visitor);
    }

    fn copy_empty(&self) -> Box<dyn ErasedKeyIndex> {
        Box::new(KeyIndex::<T>::new())
    }

    fn holders(&self, cell: &TypedCell) -> Vec<Arc<VaultRecord>> {
        cell.get_ref::<T>()
            .map(|value| self.get(value).to_vec())
            .unwrap_or_default()
    }

    fn parse_cell(&self, text: &str) -> Option<TypedCell> {
        T::parse_cell_string(text).map(TypedCell::of)
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
