//! Concrete models: assignments of values to symbolic constants.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::collection::CollectionId;
use crate::expr::{ExprRef, Sort, NULL_ADDRESS};

/// Concrete value of an expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Addr(u64),
}

impl Value {
    pub fn default_of(sort: Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
            Sort::Addr => Value::Addr(NULL_ADDRESS),
        }
    }

    /// # Panics
    ///
    /// Panics if the value is not a boolean.
    pub fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            other => panic!("Expected a boolean value, got {}", other),
        }
    }

    /// # Panics
    ///
    /// Panics if the value is not an integer.
    pub fn as_int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            other => panic!("Expected an integer value, got {}", other),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Addr(NULL_ADDRESS) => write!(f, "null"),
            Value::Addr(a) => write!(f, "0x{:x}", a),
        }
    }
}

/// Assignment of symbolic constants (and unwritten input-collection cells) to values.
#[derive(Debug, Clone, Default)]
pub struct Model {
    constants: HashMap<ExprRef, Value>,
    input_reads: HashMap<(CollectionId, Vec<Value>), Value>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a value to a symbolic constant.
    pub fn assign(&mut self, constant: ExprRef, value: Value) {
        self.constants.insert(constant, value);
    }

    pub fn with(mut self, constant: ExprRef, value: Value) -> Self {
        self.assign(constant, value);
        self
    }

    /// Fix the value of an unwritten cell of an input collection.
    pub fn assign_input(&mut self, collection: CollectionId, key: Vec<Value>, value: Value) {
        self.input_reads.insert((collection, key), value);
    }

    pub fn constant(&self, constant: ExprRef) -> Option<Value> {
        self.constants.get(&constant).copied()
    }

    pub fn input_read(&self, collection: CollectionId, key: &[Value]) -> Option<Value> {
        self.input_reads.get(&(collection, key.to_vec())).copied()
    }

    pub fn len(&self) -> usize {
        self.constants.len() + self.input_reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
