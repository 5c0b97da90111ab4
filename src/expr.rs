//! Hash-consed symbolic expressions.
//!
//! Every term lives inside an [`ExprManager`] and is addressed by a lightweight [`ExprRef`] handle.
//! The manager interns structurally equal terms into the same handle, so comparing two handles is
//! the same as comparing the terms they denote.
//!
//! Smart constructors (`mk_*`) simplify eagerly: constants are folded, trivial equalities collapse,
//! and if-then-else terms with a decided condition or equal branches disappear. The memory layer
//! relies on this: a read whose guard simplifies to `true` terminates early, and a write whose guard
//! simplifies to `false` is dropped.
//!
//! ```
//! use symex_rs::expr::{ExprManager, Sort};
//!
//! let ctx = ExprManager::new();
//! let x = ctx.mk_const("x", Sort::Int);
//! let one = ctx.mk_int(1);
//!
//! let c = ctx.mk_le(one, x);
//! let t = ctx.mk_ite(c, x, one);
//! assert_eq!(ctx.mk_ite(ctx.mk_true(), t, one), t);
//! assert!(ctx.is_true(ctx.mk_eq(t, t)));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Debug, Display, Formatter};
use std::rc::Rc;

use log::trace;

use crate::collection::CollectionId;
use crate::model::{Model, Value};

/// Handle to an interned expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExprRef(u32);

impl ExprRef {
    /// Return the index of the expression inside its manager.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ExprRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Sort (type) of an expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Sort {
    Bool,
    Int,
    Addr,
}

impl Display for Sort {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
            Sort::Addr => write!(f, "Addr"),
        }
    }
}

/// Concrete heap address of `null`.
pub const NULL_ADDRESS: u64 = 0;

/// Expression node. Operands are handles into the same manager.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Expr {
    True,
    False,
    Int(i64),
    Addr(u64),
    Const { name: String, sort: Sort },
    Not(ExprRef),
    And(Vec<ExprRef>),
    Or(Vec<ExprRef>),
    Eq(ExprRef, ExprRef),
    Le(ExprRef, ExprRef),
    Add(ExprRef, ExprRef),
    Ite(ExprRef, ExprRef, ExprRef),
    /// Value of a key that was never written into an input collection.
    InputRead {
        collection: CollectionId,
        sort: Sort,
        key: Vec<ExprRef>,
    },
}

#[derive(Debug, Clone)]
struct Node {
    expr: Rc<Expr>,
    sort: Sort,
}

#[derive(Debug, Clone)]
struct CollectionInfo {
    name: String,
    sort: Sort,
}

/// Expression manager: owns every term and every collection identifier.
pub struct ExprManager {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Rc<Expr>, ExprRef>>,
    collections: RefCell<Vec<CollectionInfo>>,
    collection_names: RefCell<HashMap<String, CollectionId>>,
    fresh_counter: Cell<u64>,
    t: ExprRef,
    f: ExprRef,
}

impl Default for ExprManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ExprManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprManager")
            .field("size", &self.nodes.borrow().len())
            .field("collections", &self.collections.borrow().len())
            .finish()
    }
}

impl ExprManager {
    pub fn new() -> Self {
        let mut mgr = Self {
            nodes: RefCell::new(Vec::new()),
            unique: RefCell::new(HashMap::new()),
            collections: RefCell::new(Vec::new()),
            collection_names: RefCell::new(HashMap::new()),
            fresh_counter: Cell::new(0),
            t: ExprRef(0),
            f: ExprRef(0),
        };
        mgr.t = mgr.intern(Expr::True, Sort::Bool);
        mgr.f = mgr.intern(Expr::False, Sort::Bool);
        mgr
    }

    /// Number of interned expressions.
    pub fn size(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn intern(&self, expr: Expr, sort: Sort) -> ExprRef {
        if let Some(&r) = self.unique.borrow().get(&expr) {
            return r;
        }
        let mut nodes = self.nodes.borrow_mut();
        let r = ExprRef(nodes.len() as u32);
        trace!("intern {} : {} = {:?}", r, sort, expr);
        let expr = Rc::new(expr);
        nodes.push(Node {
            expr: Rc::clone(&expr),
            sort,
        });
        self.unique.borrow_mut().insert(expr, r);
        r
    }

    /// Return the node behind a handle.
    ///
    /// The node is shared with the manager, so matching on it never copies operand lists.
    pub fn expr(&self, e: ExprRef) -> Rc<Expr> {
        Rc::clone(&self.nodes.borrow()[e.index()].expr)
    }

    pub fn sort(&self, e: ExprRef) -> Sort {
        self.nodes.borrow()[e.index()].sort
    }

    fn check_sort(&self, e: ExprRef, expected: Sort, op: &str) {
        let actual = self.sort(e);
        assert_eq!(
            actual, expected,
            "Operand {} of '{}' has sort {}, expected {}",
            e, op, actual, expected
        );
    }

    fn check_same_sort(&self, a: ExprRef, b: ExprRef, op: &str) -> Sort {
        let sa = self.sort(a);
        let sb = self.sort(b);
        assert_eq!(sa, sb, "Operands of '{}' have different sorts: {} and {}", op, sa, sb);
        sa
    }
}

// Collection identifiers.
impl ExprManager {
    /// Collection identifier for `name`, registering it on first use.
    ///
    /// Identifiers are interned by name, so independently built states agree on them.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered with another sort.
    pub fn new_collection(&self, name: &str, sort: Sort) -> CollectionId {
        if let Some(&id) = self.collection_names.borrow().get(name) {
            let known = self.collection_sort(id);
            assert_eq!(known, sort, "Collection {} is already registered with sort {}", name, known);
            return id;
        }
        let mut collections = self.collections.borrow_mut();
        let id = CollectionId::new(collections.len() as u32);
        trace!("new collection {} = {} : {}", id, name, sort);
        collections.push(CollectionInfo {
            name: name.to_string(),
            sort,
        });
        self.collection_names.borrow_mut().insert(name.to_string(), id);
        id
    }

    pub fn find_collection(&self, name: &str) -> Option<CollectionId> {
        self.collection_names.borrow().get(name).copied()
    }

    pub fn collection_name(&self, id: CollectionId) -> String {
        self.collections.borrow()[id.index()].name.clone()
    }

    pub fn collection_sort(&self, id: CollectionId) -> Sort {
        self.collections.borrow()[id.index()].sort
    }
}

// Leaves.
impl ExprManager {
    pub fn mk_true(&self) -> ExprRef {
        self.t
    }

    pub fn mk_false(&self) -> ExprRef {
        self.f
    }

    pub fn mk_bool(&self, value: bool) -> ExprRef {
        if value {
            self.t
        } else {
            self.f
        }
    }

    pub fn mk_int(&self, value: i64) -> ExprRef {
        self.intern(Expr::Int(value), Sort::Int)
    }

    pub fn mk_addr(&self, address: u64) -> ExprRef {
        self.intern(Expr::Addr(address), Sort::Addr)
    }

    pub fn null(&self) -> ExprRef {
        self.mk_addr(NULL_ADDRESS)
    }

    /// Named symbolic constant. The same name and sort always yield the same handle.
    pub fn mk_const(&self, name: &str, sort: Sort) -> ExprRef {
        self.intern(
            Expr::Const {
                name: name.to_string(),
                sort,
            },
            sort,
        )
    }

    /// Symbolic constant with a name that was never handed out before.
    pub fn mk_fresh(&self, prefix: &str, sort: Sort) -> ExprRef {
        let n = self.fresh_counter.get();
        self.fresh_counter.set(n + 1);
        self.mk_const(&format!("{}!{}", prefix, n), sort)
    }

    /// Zero value of a sort: `false`, `0` or `null`.
    pub fn mk_default(&self, sort: Sort) -> ExprRef {
        match sort {
            Sort::Bool => self.f,
            Sort::Int => self.mk_int(0),
            Sort::Addr => self.null(),
        }
    }

    pub fn mk_input_read(&self, collection: CollectionId, key: Vec<ExprRef>) -> ExprRef {
        let sort = self.collection_sort(collection);
        self.intern(Expr::InputRead { collection, sort, key }, sort)
    }
}

// Queries.
impl ExprManager {
    pub fn is_true(&self, e: ExprRef) -> bool {
        e == self.t
    }

    pub fn is_false(&self, e: ExprRef) -> bool {
        e == self.f
    }

    pub fn as_int(&self, e: ExprRef) -> Option<i64> {
        match *self.expr(e) {
            Expr::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_addr(&self, e: ExprRef) -> Option<u64> {
        match *self.expr(e) {
            Expr::Addr(a) => Some(a),
            _ => None,
        }
    }

    /// Whether the expression is a literal (boolean, integer or concrete address).
    pub fn is_literal(&self, e: ExprRef) -> bool {
        matches!(
            *self.expr(e),
            Expr::True | Expr::False | Expr::Int(_) | Expr::Addr(_)
        )
    }

    /// Concrete addresses an address-sorted term may evaluate to.
    ///
    /// Returns `None` when the term may be an arbitrary (symbolic) address. Nested `ite` terms whose
    /// leaves are all concrete addresses yield the set of those leaves.
    pub fn addr_candidates(&self, e: ExprRef) -> Option<BTreeSet<u64>> {
        self.check_sort(e, Sort::Addr, "addr_candidates");
        self.literal_leaves(e, &|expr: &Expr| match expr {
            Expr::Addr(a) => Some(*a),
            _ => None,
        })
    }

    /// Integer values an int-sorted term may evaluate to, see [`ExprManager::addr_candidates`].
    pub fn int_candidates(&self, e: ExprRef) -> Option<BTreeSet<i64>> {
        self.check_sort(e, Sort::Int, "int_candidates");
        self.literal_leaves(e, &|expr: &Expr| match expr {
            Expr::Int(v) => Some(*v),
            _ => None,
        })
    }

    fn literal_leaves<T: Ord>(
        &self,
        e: ExprRef,
        leaf: &dyn Fn(&Expr) -> Option<T>,
    ) -> Option<BTreeSet<T>> {
        let mut result = BTreeSet::new();
        let mut stack = vec![e];
        while let Some(cur) = stack.pop() {
            let expr = self.expr(cur);
            if let Expr::Ite(_, t, f) = *expr {
                stack.push(t);
                stack.push(f);
            } else {
                result.insert(leaf(&*expr)?);
            }
        }
        Some(result)
    }
}

// Boolean connectives.
impl ExprManager {
    pub fn mk_not(&self, e: ExprRef) -> ExprRef {
        self.check_sort(e, Sort::Bool, "not");
        match *self.expr(e) {
            Expr::True => self.f,
            Expr::False => self.t,
            Expr::Not(inner) => inner,
            _ => self.intern(Expr::Not(e), Sort::Bool),
        }
    }

    pub fn mk_and(&self, args: impl IntoIterator<Item = ExprRef>) -> ExprRef {
        let mut ops = Vec::new();
        for a in args {
            self.check_sort(a, Sort::Bool, "and");
            match &*self.expr(a) {
                Expr::True => {}
                Expr::False => return self.f,
                Expr::And(inner) => ops.extend(inner.iter().copied()),
                _ => ops.push(a),
            }
        }
        ops.sort();
        ops.dedup();
        if self.has_complementary(&ops) {
            return self.f;
        }
        match ops.len() {
            0 => self.t,
            1 => ops[0],
            _ => self.intern(Expr::And(ops), Sort::Bool),
        }
    }

    pub fn mk_or(&self, args: impl IntoIterator<Item = ExprRef>) -> ExprRef {
        let mut ops = Vec::new();
        for a in args {
            self.check_sort(a, Sort::Bool, "or");
            match &*self.expr(a) {
                Expr::False => {}
                Expr::True => return self.t,
                Expr::Or(inner) => ops.extend(inner.iter().copied()),
                _ => ops.push(a),
            }
        }
        ops.sort();
        ops.dedup();
        if self.has_complementary(&ops) {
            return self.t;
        }
        match ops.len() {
            0 => self.f,
            1 => ops[0],
            _ => self.intern(Expr::Or(ops), Sort::Bool),
        }
    }

    fn has_complementary(&self, sorted: &[ExprRef]) -> bool {
        sorted.iter().any(|&a| match *self.expr(a) {
            Expr::Not(x) => sorted.binary_search(&x).is_ok(),
            _ => false,
        })
    }

    pub fn mk_and2(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.mk_and([a, b])
    }

    pub fn mk_or2(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.mk_or([a, b])
    }

    pub fn mk_implies(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.mk_or([self.mk_not(a), b])
    }
}

// Atoms and terms.
impl ExprManager {
    pub fn mk_eq(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        let sort = self.check_same_sort(a, b, "eq");
        if a == b {
            return self.t;
        }
        if self.is_literal(a) && self.is_literal(b) {
            // Interning makes equal literals share a handle.
            return self.f;
        }
        if sort == Sort::Bool {
            if self.is_true(a) {
                return b;
            }
            if self.is_true(b) {
                return a;
            }
            if self.is_false(a) {
                return self.mk_not(b);
            }
            if self.is_false(b) {
                return self.mk_not(a);
            }
        }
        let (lhs, rhs) = if a < b { (a, b) } else { (b, a) };
        self.intern(Expr::Eq(lhs, rhs), Sort::Bool)
    }

    /// Signed `a <= b` over integers.
    pub fn mk_le(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.check_sort(a, Sort::Int, "le");
        self.check_sort(b, Sort::Int, "le");
        if a == b {
            return self.t;
        }
        if let (Some(x), Some(y)) = (self.as_int(a), self.as_int(b)) {
            return self.mk_bool(x <= y);
        }
        self.intern(Expr::Le(a, b), Sort::Bool)
    }

    /// Signed `a < b` over integers.
    pub fn mk_lt(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.mk_not(self.mk_le(b, a))
    }

    pub fn mk_add(&self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.check_sort(a, Sort::Int, "add");
        self.check_sort(b, Sort::Int, "add");
        match (self.as_int(a), self.as_int(b)) {
            (Some(x), Some(y)) => self.mk_int(x.wrapping_add(y)),
            (Some(0), None) => b,
            (None, Some(0)) => a,
            _ => {
                let (lhs, rhs) = if a < b { (a, b) } else { (b, a) };
                self.intern(Expr::Add(lhs, rhs), Sort::Int)
            }
        }
    }

    /// If-then-else.
    pub fn mk_ite(&self, cond: ExprRef, then: ExprRef, other: ExprRef) -> ExprRef {
        self.check_sort(cond, Sort::Bool, "ite");
        let sort = self.check_same_sort(then, other, "ite");

        if self.is_true(cond) || then == other {
            return then;
        }
        if self.is_false(cond) {
            return other;
        }
        if let Expr::Not(inner) = *self.expr(cond) {
            return self.mk_ite(inner, other, then);
        }

        // ite(c, ite(c, a, _), e) = ite(c, a, e), and symmetrically for the else branch.
        let then = match *self.expr(then) {
            Expr::Ite(c, a, _) if c == cond => a,
            _ => then,
        };
        let other = match *self.expr(other) {
            Expr::Ite(c, _, b) if c == cond => b,
            _ => other,
        };
        if then == other {
            return then;
        }

        if sort == Sort::Bool {
            return match (&*self.expr(then), &*self.expr(other)) {
                (Expr::True, Expr::False) => cond,
                (Expr::False, Expr::True) => self.mk_not(cond),
                (Expr::True, _) => self.mk_or2(cond, other),
                (Expr::False, _) => self.mk_and2(self.mk_not(cond), other),
                (_, Expr::True) => self.mk_or2(self.mk_not(cond), then),
                (_, Expr::False) => self.mk_and2(cond, then),
                _ => self.intern(Expr::Ite(cond, then, other), Sort::Bool),
            };
        }

        self.intern(Expr::Ite(cond, then, other), sort)
    }
}

// Evaluation.
impl ExprManager {
    /// Evaluate an expression under a model.
    ///
    /// Constants missing from the model evaluate to the default value of their sort.
    pub fn eval(&self, e: ExprRef, model: &Model) -> Value {
        let mut memo = HashMap::new();
        self.eval_memo(e, model, &mut memo)
    }

    fn eval_memo(&self, e: ExprRef, model: &Model, memo: &mut HashMap<ExprRef, Value>) -> Value {
        if let Some(v) = memo.get(&e) {
            return *v;
        }
        let value = match &*self.expr(e) {
            Expr::True => Value::Bool(true),
            Expr::False => Value::Bool(false),
            Expr::Int(v) => Value::Int(*v),
            Expr::Addr(a) => Value::Addr(*a),
            Expr::Const { sort, .. } => model.constant(e).unwrap_or_else(|| Value::default_of(*sort)),
            Expr::Not(x) => Value::Bool(!self.eval_memo(*x, model, memo).as_bool()),
            Expr::And(xs) => Value::Bool(xs.iter().all(|&x| self.eval_memo(x, model, memo).as_bool())),
            Expr::Or(xs) => Value::Bool(xs.iter().any(|&x| self.eval_memo(x, model, memo).as_bool())),
            Expr::Eq(a, b) => {
                let va = self.eval_memo(*a, model, memo);
                let vb = self.eval_memo(*b, model, memo);
                Value::Bool(va == vb)
            }
            Expr::Le(a, b) => {
                let va = self.eval_memo(*a, model, memo).as_int();
                let vb = self.eval_memo(*b, model, memo).as_int();
                Value::Bool(va <= vb)
            }
            Expr::Add(a, b) => {
                let va = self.eval_memo(*a, model, memo).as_int();
                let vb = self.eval_memo(*b, model, memo).as_int();
                Value::Int(va.wrapping_add(vb))
            }
            Expr::Ite(c, t, f) => {
                if self.eval_memo(*c, model, memo).as_bool() {
                    self.eval_memo(*t, model, memo)
                } else {
                    self.eval_memo(*f, model, memo)
                }
            }
            Expr::InputRead {
                collection,
                sort,
                key,
            } => {
                let key = key
                    .iter()
                    .map(|&k| self.eval_memo(k, model, memo))
                    .collect::<Vec<_>>();
                model
                    .input_read(*collection, &key)
                    .unwrap_or_else(|| Value::default_of(*sort))
            }
        };
        memo.insert(e, value);
        value
    }
}

// Printing.
impl ExprManager {
    /// Render an expression as an S-expression.
    pub fn display(&self, e: ExprRef) -> ExprDisplay<'_> {
        ExprDisplay { mgr: self, expr: e }
    }

    fn write_expr(&self, f: &mut Formatter<'_>, e: ExprRef) -> fmt::Result {
        match &*self.expr(e) {
            Expr::True => write!(f, "true"),
            Expr::False => write!(f, "false"),
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Addr(NULL_ADDRESS) => write!(f, "null"),
            Expr::Addr(a) => write!(f, "0x{:x}", a),
            Expr::Const { name, .. } => write!(f, "{}", name),
            Expr::Not(x) => {
                write!(f, "(not ")?;
                self.write_expr(f, *x)?;
                write!(f, ")")
            }
            Expr::And(xs) => self.write_app(f, "and", xs),
            Expr::Or(xs) => self.write_app(f, "or", xs),
            Expr::Eq(a, b) => self.write_app(f, "=", &[*a, *b]),
            Expr::Le(a, b) => self.write_app(f, "<=", &[*a, *b]),
            Expr::Add(a, b) => self.write_app(f, "+", &[*a, *b]),
            Expr::Ite(c, t, e) => self.write_app(f, "ite", &[*c, *t, *e]),
            Expr::InputRead {
                collection, key, ..
            } => {
                let name = self.collection_name(*collection);
                self.write_app(f, &format!("read:{}", name), key)
            }
        }
    }

    fn write_app(&self, f: &mut Formatter<'_>, op: &str, args: &[ExprRef]) -> fmt::Result {
        write!(f, "({}", op)?;
        for &a in args {
            write!(f, " ")?;
            self.write_expr(f, a)?;
        }
        write!(f, ")")
    }
}

pub struct ExprDisplay<'a> {
    mgr: &'a ExprManager,
    expr: ExprRef,
}

impl Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.mgr.write_expr(f, self.expr)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_hash_consing() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let y = ctx.mk_const("x", Sort::Int);
        assert_eq!(x, y);
        assert_eq!(ctx.mk_add(x, ctx.mk_int(2)), ctx.mk_add(ctx.mk_int(2), x));
    }

    #[test]
    fn test_nodes_are_shared() {
        let ctx = ExprManager::new();
        let a = ctx.mk_const("a", Sort::Bool);
        let b = ctx.mk_const("b", Sort::Bool);
        let and = ctx.mk_and([a, b]);
        let node = ctx.expr(and);
        assert!(Rc::ptr_eq(&node, &ctx.expr(and)));
        // Holding a node does not block building new terms.
        let or = match &*node {
            Expr::And(args) => ctx.mk_or(args.iter().copied()),
            other => panic!("expected a conjunction, got {:?}", other),
        };
        assert_eq!(or, ctx.mk_or2(a, b));
    }

    #[test]
    fn test_and_or_simplification() {
        let ctx = ExprManager::new();
        let a = ctx.mk_const("a", Sort::Bool);
        let b = ctx.mk_const("b", Sort::Bool);

        assert_eq!(ctx.mk_and([a, ctx.mk_true()]), a);
        assert!(ctx.is_false(ctx.mk_and([a, ctx.mk_false(), b])));
        assert!(ctx.is_false(ctx.mk_and([a, ctx.mk_not(a)])));
        assert!(ctx.is_true(ctx.mk_or([a, ctx.mk_not(a)])));
        assert_eq!(ctx.mk_and([a, b, a]), ctx.mk_and([b, a]));
        assert_eq!(ctx.mk_and([ctx.mk_and([a, b]), a]), ctx.mk_and([a, b]));
        assert!(ctx.is_true(ctx.mk_and(std::iter::empty())));
    }

    #[test]
    fn test_eq_literals() {
        let ctx = ExprManager::new();
        assert!(ctx.is_false(ctx.mk_eq(ctx.mk_int(1), ctx.mk_int(2))));
        assert!(ctx.is_true(ctx.mk_eq(ctx.mk_addr(5), ctx.mk_addr(5))));
        assert!(ctx.is_false(ctx.mk_eq(ctx.mk_addr(5), ctx.null())));
        let p = ctx.mk_const("p", Sort::Addr);
        assert!(!ctx.is_literal(ctx.mk_eq(p, ctx.null())));
    }

    #[test]
    fn test_ite_simplification() {
        let ctx = ExprManager::new();
        let c = ctx.mk_const("c", Sort::Bool);
        let x = ctx.mk_const("x", Sort::Int);
        let y = ctx.mk_const("y", Sort::Int);

        assert_eq!(ctx.mk_ite(ctx.mk_true(), x, y), x);
        assert_eq!(ctx.mk_ite(ctx.mk_false(), x, y), y);
        assert_eq!(ctx.mk_ite(c, x, x), x);
        assert_eq!(ctx.mk_ite(c, ctx.mk_true(), ctx.mk_false()), c);
        assert_eq!(ctx.mk_ite(ctx.mk_not(c), x, y), ctx.mk_ite(c, y, x));

        let inner = ctx.mk_ite(c, x, y);
        assert_eq!(ctx.mk_ite(c, inner, y), inner);
    }

    #[test]
    fn test_candidates() {
        let ctx = ExprManager::new();
        let c = ctx.mk_const("c", Sort::Bool);
        let r = ctx.mk_ite(c, ctx.mk_addr(1), ctx.mk_addr(2));
        assert_eq!(ctx.addr_candidates(r), Some(BTreeSet::from([1, 2])));
        let p = ctx.mk_const("p", Sort::Addr);
        assert_eq!(ctx.addr_candidates(ctx.mk_ite(c, r, p)), None);
    }

    #[test]
    fn test_eval() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let c = ctx.mk_le(ctx.mk_int(0), x);
        let e = ctx.mk_ite(c, ctx.mk_add(x, ctx.mk_int(1)), ctx.mk_int(-1));

        let mut model = Model::new();
        model.assign(x, Value::Int(4));
        assert_eq!(ctx.eval(e, &model), Value::Int(5));

        model.assign(x, Value::Int(-4));
        assert_eq!(ctx.eval(e, &model), Value::Int(-1));
    }

    #[test]
    fn test_display() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let e = ctx.mk_le(x, ctx.mk_int(3));
        assert_eq!(ctx.display(e).to_string(), "(<= x 3)");
    }

    #[test]
    #[should_panic(expected = "has sort Int, expected Bool")]
    fn test_sort_mismatch_panics() {
        let ctx = ExprManager::new();
        ctx.mk_not(ctx.mk_int(1));
    }

    #[test]
    fn test_collections_interned_by_name() {
        let ctx = ExprManager::new();
        let a = ctx.new_collection("Node.next", Sort::Addr);
        let b = ctx.new_collection("Node.val", Sort::Int);
        assert_ne!(a, b);
        assert_eq!(ctx.new_collection("Node.next", Sort::Addr), a);
        assert_eq!(ctx.find_collection("Node.val"), Some(b));
        assert_eq!(ctx.collection_name(b), "Node.val");
    }

    #[test]
    #[should_panic(expected = "is already registered with sort Addr")]
    fn test_collection_sort_conflict() {
        let ctx = ExprManager::new();
        ctx.new_collection("f", Sort::Addr);
        ctx.new_collection("f", Sort::Int);
    }
}
