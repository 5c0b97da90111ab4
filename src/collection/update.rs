//! Update nodes and the persistent update log.

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::collection::SymbolicCollection;
use crate::expr::{ExprManager, ExprRef};
use crate::key_info::KeyInfo;

/// How a key of the collection being read maps to a key of a merge source.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum KeyMapping {
    Identity,
    /// Every occurrence of reference `from` is replaced by `to`.
    SubstituteRef { from: ExprRef, to: ExprRef },
}

impl KeyMapping {
    pub fn apply<KI: KeyInfo>(&self, key_info: &KI, key: &KI::Key) -> KI::Key {
        match *self {
            KeyMapping::Identity => key.clone(),
            KeyMapping::SubstituteRef { from, to } => key_info.substitute_ref(key, from, to),
        }
    }

    /// Formula restricting the keys the mapping applies to.
    pub fn domain<KI: KeyInfo>(&self, ctx: &ExprManager, key_info: &KI, key: &KI::Key) -> ExprRef {
        match *self {
            KeyMapping::Identity => ctx.mk_true(),
            KeyMapping::SubstituteRef { from, .. } => key_info.ref_matches(ctx, key, from),
        }
    }
}

/// Keys of a merge source that a merge node may defer to.
#[derive(Debug, Clone)]
pub enum KeySet<KI: KeyInfo> {
    /// Every key is present.
    All,
    /// Boolean collection: a key is present iff the collection reads `true` at it.
    Collection(SymbolicCollection<KI>),
}

/// Merge adapter: source collection seen through a key mapping, restricted to a key set.
#[derive(Debug, Clone)]
pub struct MergeAdapter<KI: KeyInfo> {
    pub mapping: KeyMapping,
    pub key_set: KeySet<KI>,
    pub source: SymbolicCollection<KI>,
}

/// One write into a symbolic collection.
#[derive(Debug, Clone)]
pub enum UpdateNode<KI: KeyInfo> {
    /// `key <- value` when `guard` holds.
    Pinpoint {
        key: KI::Key,
        value: ExprRef,
        guard: ExprRef,
    },
    /// Every key in `[from, to]` is set to `value` when `guard` holds.
    Ranged {
        from: KI::Key,
        to: KI::Key,
        value: ExprRef,
        guard: ExprRef,
    },
    /// Keys present in the adapter's key set read from the adapter's source when `guard` holds.
    Merge {
        adapter: MergeAdapter<KI>,
        guard: ExprRef,
    },
}

impl<KI: KeyInfo> UpdateNode<KI> {
    pub fn guard(&self) -> ExprRef {
        match self {
            UpdateNode::Pinpoint { guard, .. }
            | UpdateNode::Ranged { guard, .. }
            | UpdateNode::Merge { guard, .. } => *guard,
        }
    }

    /// Over-approximation of the keys this node may write.
    pub fn region(&self, ctx: &ExprManager, key_info: &KI) -> KI::Region {
        match self {
            UpdateNode::Pinpoint { key, .. } => key_info.key_to_region(ctx, key),
            UpdateNode::Ranged { from, to, .. } => key_info.key_range_region(ctx, from, to),
            UpdateNode::Merge { .. } => key_info.top_region(),
        }
    }

    /// Whether this node certainly overwrites `key`.
    pub fn includes_concretely(&self, ctx: &ExprManager, key_info: &KI, key: &KI::Key) -> bool {
        if !ctx.is_true(self.guard()) {
            return false;
        }
        match self {
            UpdateNode::Pinpoint { key: k, .. } => key_info.eq_concrete(k, key),
            UpdateNode::Ranged { from, to, .. } => {
                key_info.cmp_concrete_le(ctx, from, key) && key_info.cmp_concrete_le(ctx, key, to)
            }
            UpdateNode::Merge { .. } => {
                ctx.is_true(self.includes_symbolically(ctx, key_info, key))
            }
        }
    }

    /// Formula under which this node overwrites `key`.
    pub fn includes_symbolically(&self, ctx: &ExprManager, key_info: &KI, key: &KI::Key) -> ExprRef {
        let hit = match self {
            UpdateNode::Pinpoint { key: k, .. } => key_info.eq_symbolic(ctx, k, key),
            UpdateNode::Ranged { from, to, .. } => ctx.mk_and2(
                key_info.cmp_symbolic_le(ctx, from, key),
                key_info.cmp_symbolic_le(ctx, key, to),
            ),
            UpdateNode::Merge { adapter, .. } => {
                let present = match &adapter.key_set {
                    KeySet::All => ctx.mk_true(),
                    KeySet::Collection(keys) => {
                        let src_key = adapter.mapping.apply(key_info, key);
                        keys.read(ctx, &src_key)
                    }
                };
                ctx.mk_and2(adapter.mapping.domain(ctx, key_info, key), present)
            }
        };
        ctx.mk_and2(hit, self.guard())
    }

    /// Value this node provides for `key`, assuming it overwrites it.
    pub fn value(&self, ctx: &ExprManager, key_info: &KI, key: &KI::Key) -> ExprRef {
        match self {
            UpdateNode::Pinpoint { value, .. } | UpdateNode::Ranged { value, .. } => *value,
            UpdateNode::Merge { adapter, .. } => {
                let src_key = adapter.mapping.apply(key_info, key);
                adapter.source.read(ctx, &src_key)
            }
        }
    }
}

struct LogCell<KI: KeyInfo> {
    node: UpdateNode<KI>,
    next: Option<Rc<LogCell<KI>>>,
}

/// Persistent list of update nodes, newest first.
///
/// Pushing shares the whole existing log with the new one, so keeping old versions is free.
pub struct UpdateLog<KI: KeyInfo> {
    head: Option<Rc<LogCell<KI>>>,
    len: usize,
}

impl<KI: KeyInfo> Clone for UpdateLog<KI> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<KI: KeyInfo> Default for UpdateLog<KI> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<KI: KeyInfo> Debug for UpdateLog<KI> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<KI: KeyInfo> UpdateLog<KI> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// New log with `node` as the newest entry.
    pub fn push(&self, node: UpdateNode<KI>) -> Self {
        Self {
            head: Some(Rc::new(LogCell {
                node,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Whether both logs are the same physical list.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Iterate from the newest node to the oldest.
    pub fn iter(&self) -> UpdateLogIter<'_, KI> {
        UpdateLogIter {
            cur: self.head.as_deref(),
        }
    }
}

pub struct UpdateLogIter<'a, KI: KeyInfo> {
    cur: Option<&'a LogCell<KI>>,
}

impl<'a, KI: KeyInfo> Iterator for UpdateLogIter<'a, KI> {
    type Item = &'a UpdateNode<KI>;

    fn next(&mut self) -> Option<Self::Item> {
        let cell = self.cur?;
        self.cur = cell.next.as_deref();
        Some(&cell.node)
    }
}
