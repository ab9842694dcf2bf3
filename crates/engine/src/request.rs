//! Request trees
//!
//! A [`Request`] is an immutable tree of leaf comparisons combined with
//! And (`&`) and Or (`|`). Leaves carry a key, a value (or two for an
//! interval), an optional post-filter and an optional result cap.
//!
//! # Evaluation
//!
//! Evaluation runs in two phases. First every leaf is resolved against the
//! target's indexes while the target's store is locked; the first failing
//! leaf aborts the whole tree. Then, with the store released, post-filters
//! run and children are combined by intersection (And) or union (Or).
//!
//! A lower-bound leaf And an upper-bound leaf on the same key are fused into
//! a single interval scan when the tree is built.

use crate::record_ref::VaultRecordRef;
use crate::vault::VaultShared;
use rustc_hash::FxHashSet;
use std::any::Any;
use std::fmt;
use std::ops::{BitAnd, BitOr, Bound};
use std::sync::{Arc, Weak};
use vault_core::{KeyValue, VaultResult};
use vault_storage::{IndexedStore, VaultRecord};

/// Post-filter applied to each candidate record
pub type Predicate = Arc<dyn Fn(&VaultRecordRef) -> bool + Send + Sync>;

pub(crate) type Candidates = Vec<Arc<VaultRecord>>;

/// One comparison over one key, with its value type erased
pub(crate) trait LeafRequest: Send + Sync {
    fn candidates(&self, store: &IndexedStore) -> VaultResult<Candidates>;
    fn predicate(&self) -> Option<&Predicate>;
    fn limit(&self) -> Option<usize>;
    fn with_filter(&self, predicate: Predicate) -> Arc<dyn LeafRequest>;
    fn with_limit(&self, limit: usize) -> Arc<dyn LeafRequest>;
    fn fuse(&self, other: &dyn LeafRequest) -> Option<Arc<dyn LeafRequest>>;
    fn as_any(&self) -> &dyn Any;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
enum Selector<T> {
    Equal(T),
    Range(Bound<T>, Bound<T>),
}

#[derive(Clone)]
struct Leaf<T: KeyValue> {
    key: String,
    selector: Selector<T>,
    predicate: Option<Predicate>,
    limit: Option<usize>,
}

fn conjoin(a: Option<Predicate>, b: Option<Predicate>) -> Option<Predicate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Arc::new(move |r: &VaultRecordRef| a(r) && b(r))),
        (a, b) => a.or(b),
    }
}

impl<T: KeyValue> LeafRequest for Leaf<T> {
    fn candidates(&self, store: &IndexedStore) -> VaultResult<Candidates> {
        let index = store.typed_index::<T>(&self.key)?;
        // The cap applies after filtering, so a filtered leaf scans everything.
        let cap = match (&self.predicate, self.limit) {
            (None, Some(limit)) => limit,
            _ => usize::MAX,
        };
        let out = match &self.selector {
            Selector::Equal(value) => index.get(value).iter().take(cap).cloned().collect(),
            Selector::Range(lower, upper) => index
                .range(lower.as_ref(), upper.as_ref())
                .take(cap)
                .cloned()
                .collect(),
        };
        Ok(out)
    }

    fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn with_filter(&self, predicate: Predicate) -> Arc<dyn LeafRequest> {
        let mut leaf = self.clone();
        leaf.predicate = conjoin(leaf.predicate.take(), Some(predicate));
        Arc::new(leaf)
    }

    fn with_limit(&self, limit: usize) -> Arc<dyn LeafRequest> {
        let mut leaf = self.clone();
        leaf.limit = Some(limit);
        Arc::new(leaf)
    }

    fn fuse(&self, other: &dyn LeafRequest) -> Option<Arc<dyn LeafRequest>> {
        let other = other.as_any().downcast_ref::<Leaf<T>>()?;
        if other.key != self.key || self.limit.is_some() || other.limit.is_some() {
            return None;
        }
        let (lower, upper) = match (&self.selector, &other.selector) {
            (Selector::Range(lo, Bound::Unbounded), Selector::Range(Bound::Unbounded, hi))
            | (Selector::Range(Bound::Unbounded, hi), Selector::Range(lo, Bound::Unbounded))
                if !matches!(lo, Bound::Unbounded) && !matches!(hi, Bound::Unbounded) =>
            {
                (lo.clone(), hi.clone())
            }
            _ => return None,
        };
        Some(Arc::new(Leaf {
            key: self.key.clone(),
            selector: Selector::Range(lower, upper),
            predicate: conjoin(self.predicate.clone(), other.predicate.clone()),
            limit: None,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        let cmp = match &self.selector {
            Selector::Equal(v) => format!("{} == {:?}", self.key, v),
            Selector::Range(lo, hi) => {
                let lo = match lo {
                    Bound::Included(v) => format!("{:?} <= ", v),
                    Bound::Excluded(v) => format!("{:?} < ", v),
                    Bound::Unbounded => String::new(),
                };
                let hi = match hi {
                    Bound::Included(v) => format!(" <= {:?}", v),
                    Bound::Excluded(v) => format!(" < {:?}", v),
                    Bound::Unbounded => String::new(),
                };
                format!("{}{}{}", lo, self.key, hi)
            }
        };
        let mut out = cmp;
        if self.predicate.is_some() {
            out.push_str(" [filtered]");
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!(" [limit {}]", limit));
        }
        out
    }
}

#[derive(Clone)]
enum Node {
    Leaf(Arc<dyn LeafRequest>),
    And {
        left: Arc<Node>,
        right: Arc<Node>,
        limit: Option<usize>,
    },
    Or {
        left: Arc<Node>,
        right: Arc<Node>,
        limit: Option<usize>,
    },
}

/// Predicate tree evaluated against a vault or record set
///
/// # Example
///
/// ```ignore
/// let req = (Request::greater("A", 3) & Request::less("A", 8)) | Request::equal("B", true);
/// vault.request(&req, &out)?;
/// ```
#[derive(Clone)]
pub struct Request {
    node: Node,
}

impl Request {
    fn leaf<T: KeyValue>(key: impl Into<String>, selector: Selector<T>) -> Self {
        Request {
            node: Node::Leaf(Arc::new(Leaf {
                key: key.into(),
                selector,
                predicate: None,
                limit: None,
            })),
        }
    }

    /// Records whose `key` equals `value`
    pub fn equal<T: KeyValue>(key: impl Into<String>, value: T) -> Self {
        Self::leaf(key, Selector::Equal(value))
    }

    /// Records whose `key` is less than `value`
    pub fn less<T: KeyValue>(key: impl Into<String>, value: T) -> Self {
        Self::leaf(key, Selector::Range(Bound::Unbounded, Bound::Excluded(value)))
    }

    /// Records whose `key` is less than or equal to `value`
    pub fn less_or_equal<T: KeyValue>(key: impl Into<String>, value: T) -> Self {
        Self::leaf(key, Selector::Range(Bound::Unbounded, Bound::Included(value)))
    }

    /// Records whose `key` is greater than `value`
    pub fn greater<T: KeyValue>(key: impl Into<String>, value: T) -> Self {
        Self::leaf(key, Selector::Range(Bound::Excluded(value), Bound::Unbounded))
    }

    /// Records whose `key` is greater than or equal to `value`
    pub fn greater_or_equal<T: KeyValue>(key: impl Into<String>, value: T) -> Self {
        Self::leaf(key, Selector::Range(Bound::Included(value), Bound::Unbounded))
    }

    /// Records whose `key` lies between `begin` and `end`
    ///
    /// Each side is inclusive or exclusive independently. `begin > end`
    /// matches nothing.
    pub fn interval<T: KeyValue>(
        key: impl Into<String>,
        begin: T,
        end: T,
        include_begin: bool,
        include_end: bool,
    ) -> Self {
        let lower = if include_begin {
            Bound::Included(begin)
        } else {
            Bound::Excluded(begin)
        };
        let upper = if include_end {
            Bound::Included(end)
        } else {
            Bound::Excluded(end)
        };
        Self::leaf(key, Selector::Range(lower, upper))
    }

    /// Keep only records for which `predicate` returns true
    ///
    /// On a composite request the filter is applied to every leaf.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&VaultRecordRef) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        Request {
            node: Self::map_leaves(&self.node, &|leaf: &dyn LeafRequest| {
                leaf.with_filter(Arc::clone(&predicate))
            }),
        }
    }

    /// Cap the number of records this request yields
    pub fn limit(self, limit: usize) -> Self {
        let node = match self.node {
            Node::Leaf(leaf) => Node::Leaf(leaf.with_limit(limit)),
            Node::And { left, right, .. } => Node::And {
                left,
                right,
                limit: Some(limit),
            },
            Node::Or { left, right, .. } => Node::Or {
                left,
                right,
                limit: Some(limit),
            },
        };
        Request { node }
    }

    /// Intersection of two requests
    pub fn and(self, other: Request) -> Self {
        if let (Node::Leaf(a), Node::Leaf(b)) = (&self.node, &other.node) {
            if let Some(fused) = a.fuse(b.as_ref()) {
                return Request {
                    node: Node::Leaf(fused),
                };
            }
        }
        Request {
            node: Node::And {
                left: Arc::new(self.node),
                right: Arc::new(other.node),
                limit: None,
            },
        }
    }

    /// Union of two requests
    pub fn or(self, other: Request) -> Self {
        Request {
            node: Node::Or {
                left: Arc::new(self.node),
                right: Arc::new(other.node),
                limit: None,
            },
        }
    }

    /// Number of leaf comparisons in the tree
    pub fn leaf_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 1,
                Node::And { left, right, .. } | Node::Or { left, right, .. } => {
                    count(left) + count(right)
                }
            }
        }
        count(&self.node)
    }

    fn map_leaves(node: &Node, f: &dyn Fn(&dyn LeafRequest) -> Arc<dyn LeafRequest>) -> Node {
        match node {
            Node::Leaf(leaf) => Node::Leaf(f(leaf.as_ref())),
            Node::And { left, right, limit } => Node::And {
                left: Arc::new(Self::map_leaves(left, f)),
                right: Arc::new(Self::map_leaves(right, f)),
                limit: *limit,
            },
            Node::Or { left, right, limit } => Node::Or {
                left: Arc::new(Self::map_leaves(left, f)),
                right: Arc::new(Self::map_leaves(right, f)),
                limit: *limit,
            },
        }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Resolve every leaf against `store`, depth first
    ///
    /// Stops at the first failing leaf.
    pub(crate) fn collect(&self, store: &IndexedStore) -> VaultResult<Vec<Candidates>> {
        fn walk(node: &Node, store: &IndexedStore, out: &mut Vec<Candidates>) -> VaultResult<()> {
            match node {
                Node::Leaf(leaf) => out.push(leaf.candidates(store)?),
                Node::And { left, right, .. } | Node::Or { left, right, .. } => {
                    walk(left, store, out)?;
                    walk(right, store, out)?;
                }
            }
            Ok(())
        }
        let mut out = Vec::with_capacity(self.leaf_count());
        walk(&self.node, store, &mut out)?;
        Ok(out)
    }

    /// Filter and combine leaf results produced by [`collect`](Self::collect)
    pub(crate) fn combine(&self, leaves: Vec<Candidates>, vault: &Weak<VaultShared>) -> Candidates {
        let mut leaves = leaves.into_iter();
        Self::combine_node(&self.node, &mut leaves, vault)
    }

    fn combine_node(
        node: &Node,
        leaves: &mut std::vec::IntoIter<Candidates>,
        vault: &Weak<VaultShared>,
    ) -> Candidates {
        match node {
            Node::Leaf(leaf) => {
                let candidates = leaves.next().unwrap_or_default();
                match leaf.predicate() {
                    Some(predicate) => candidates
                        .into_iter()
                        .filter(|record| {
                            predicate(&VaultRecordRef::from_parts(vault.clone(), Arc::clone(record)))
                        })
                        .take(leaf.limit().unwrap_or(usize::MAX))
                        .collect(),
                    None => candidates,
                }
            }
            Node::And { left, right, limit } => {
                let l = Self::combine_node(left, leaves, vault);
                let r = Self::combine_node(right, leaves, vault);
                let (small, large) = if l.len() <= r.len() { (l, r) } else { (r, l) };
                let lookup: FxHashSet<_> = large.iter().map(|rec| rec.id()).collect();
                small
                    .into_iter()
                    .filter(|rec| lookup.contains(&rec.id()))
                    .take(limit.unwrap_or(usize::MAX))
                    .collect()
            }
            Node::Or { left, right, limit } => {
                let mut l = Self::combine_node(left, leaves, vault);
                let r = Self::combine_node(right, leaves, vault);
                let mut seen: FxHashSet<_> = l.iter().map(|rec| rec.id()).collect();
                l.extend(r.into_iter().filter(|rec| seen.insert(rec.id())));
                l.truncate(limit.unwrap_or(usize::MAX));
                l
            }
        }
    }
}

impl BitAnd for Request {
    type Output = Request;

    fn bitand(self, rhs: Request) -> Request {
        self.and(rhs)
    }
}

impl BitOr for Request {
    type Output = Request;

    fn bitor(self, rhs: Request) -> Request {
        self.or(rhs)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match node {
                Node::Leaf(leaf) => write!(f, "({})", leaf.describe()),
                Node::And { left, right, limit } | Node::Or { left, right, limit } => {
                    let op = if matches!(node, Node::And { .. }) { "&" } else { "|" };
                    f.write_str("(")?;
                    write_node(left, f)?;
                    write!(f, " {} ", op)?;
                    write_node(right, f)?;
                    f.write_str(")")?;
                    if let Some(limit) = limit {
                        write!(f, "[limit {}]", limit)?;
                    }
                    Ok(())
                }
            }
        }
        f.write_str("Request")?;
        write_node(&self.node, f)
    }
}
