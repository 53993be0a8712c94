//! Column storage strategies.
//!
//! A field does not own a plain vector; it owns a [`Provider`], one of four
//! interchangeable storage strategies. Dense data lives in `Column`;
//! synthetic fields use `Constant` and `RowIndex` without materializing
//! anything; row permutations (sorts, filters) wrap the original provider in
//! a `Reordered` view instead of copying values.
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::{self, Value};

/// Polymorphic storage behind a field.
#[derive(Debug, Clone)]
pub enum Provider {
    /// Dense array of values. The array is behind a shared mutable cell
    /// because the selection column is updated in place; nothing else
    /// writes through it.
    Column(Rc<RefCell<Vec<Option<Value>>>>),
    /// The same value for every row
    Constant {
        /// the repeated value
        value: Option<Value>,
        /// number of rows
        len: usize,
    },
    /// 1-based row index
    RowIndex {
        /// number of rows
        len: usize,
    },
    /// An index-permuted view over another provider
    Reordered {
        /// provider being viewed
        base: Box<Provider>,
        /// row index into `base` for each view row
        order: Rc<Vec<usize>>,
    },
}

impl Provider {
    /// Dense column over the given values, pooling repeated values so
    /// duplicates share one allocation
    pub fn column(values: Vec<Option<Value>>) -> Provider {
        let mut common: HashMap<Value, Value> = HashMap::new();
        let pooled = values
            .into_iter()
            .map(|v| {
                v.map(|v| match common.get(&v) {
                    Some(shared) => shared.clone(),
                    None => {
                        common.insert(v.clone(), v.clone());
                        v
                    }
                })
            })
            .collect();
        Provider::Column(Rc::new(RefCell::new(pooled)))
    }

    /// A view of `base` where view row `i` reads `base` row `order[i]`.
    /// Reordering a reordered view flattens the index chain.
    pub fn reordered(base: &Provider, order: Vec<usize>) -> Provider {
        match base {
            Provider::Reordered { base: inner, order: inner_order } => {
                let composed = order.iter().map(|&i| inner_order[i]).collect();
                Provider::Reordered { base: inner.clone(), order: Rc::new(composed) }
            }
            _ => Provider::Reordered { base: Box::new(base.clone()), order: Rc::new(order) },
        }
    }

    /// Number of rows
    pub fn count(&self) -> usize {
        match self {
            Provider::Column(col) => col.borrow().len(),
            Provider::Constant { len, .. } => *len,
            Provider::RowIndex { len } => *len,
            Provider::Reordered { order, .. } => order.len(),
        }
    }

    /// The value at a row
    pub fn value(&self, index: usize) -> Option<Value> {
        match self {
            Provider::Column(col) => col.borrow().get(index).cloned().flatten(),
            Provider::Constant { value, .. } => value.clone(),
            Provider::RowIndex { .. } => Some(Value::Num(index as f64 + 1.0)),
            Provider::Reordered { base, order } => base.value(order[index]),
        }
    }

    /// Compare two rows. When a non-empty category rank map is given,
    /// values present in it compare by rank; otherwise by natural order
    /// (nulls last).
    pub fn compare_rows(
        &self,
        a: usize,
        b: usize,
        category_rank: &HashMap<Value, usize>,
    ) -> Ordering {
        match self {
            Provider::Column(col) => {
                let col = col.borrow();
                let p = col[a].as_ref();
                let q = col[b].as_ref();
                match (p, q) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(p), Some(q)) => {
                        if category_rank.is_empty() {
                            value::compare(Some(p), Some(q))
                        } else {
                            match (category_rank.get(p), category_rank.get(q)) {
                                (Some(x), Some(y)) => x.cmp(y),
                                _ => value::compare(Some(p), Some(q)),
                            }
                        }
                    }
                }
            }
            Provider::Constant { .. } => Ordering::Equal,
            Provider::RowIndex { .. } => a.cmp(&b),
            Provider::Reordered { base, order } => {
                base.compare_rows(order[a], order[b], category_rank)
            }
        }
    }

    /// Set the value at a row. A dense column is updated in place (this is
    /// the path used by selection); any other provider is materialized into
    /// a dense column first, copy-on-write style.
    pub fn with_value_set(&self, value: Option<Value>, index: usize) -> Provider {
        match self {
            Provider::Column(col) => {
                col.borrow_mut()[index] = value;
                self.clone()
            }
            _ => {
                let copy = Provider::Column(Rc::new(RefCell::new(self.materialize())));
                copy.with_value_set(value, index)
            }
        }
    }

    /// Copy all rows out into a plain vector
    pub fn materialize(&self) -> Vec<Option<Value>> {
        (0..self.count()).map(|i| self.value(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_and_constant() {
        let col = Provider::column(vec![Some(Value::Num(1.0)), None, Some(Value::str("x"))]);
        assert_eq!(col.count(), 3);
        assert_eq!(col.value(0), Some(Value::Num(1.0)));
        assert_eq!(col.value(1), None);

        let c = Provider::Constant { value: Some(Value::Num(7.0)), len: 4 };
        assert_eq!(c.count(), 4);
        assert_eq!(c.value(3), Some(Value::Num(7.0)));
        assert_eq!(c.compare_rows(0, 3, &HashMap::new()), Ordering::Equal);
    }

    #[test]
    fn test_row_index() {
        let r = Provider::RowIndex { len: 3 };
        assert_eq!(r.value(0), Some(Value::Num(1.0)));
        assert_eq!(r.value(2), Some(Value::Num(3.0)));
        assert_eq!(r.compare_rows(2, 1, &HashMap::new()), Ordering::Greater);
    }

    #[test]
    fn test_reordered_flattens() {
        let col = Provider::column(
            (0..4).map(|i| Some(Value::Num(i as f64 * 10.0))).collect(),
        );
        let once = Provider::reordered(&col, vec![3, 2, 1, 0]);
        let twice = Provider::reordered(&once, vec![1, 3]);
        // flattened straight onto the column
        match &twice {
            Provider::Reordered { base, order } => {
                assert!(matches!(base.as_ref(), Provider::Column(_)));
                assert_eq!(order.as_ref(), &vec![2, 0]);
            }
            _ => panic!("expected reordered provider"),
        }
        assert_eq!(twice.value(0), Some(Value::Num(20.0)));
        assert_eq!(twice.value(1), Some(Value::Num(0.0)));
    }

    #[test]
    fn test_set_value_copy_on_write() {
        let c = Provider::Constant { value: Some(Value::str("\u{2717}")), len: 3 };
        let set = c.with_value_set(Some(Value::str("\u{2713}")), 1);
        assert!(matches!(set, Provider::Column(_)));
        assert_eq!(set.value(1), Some(Value::str("\u{2713}")));
        assert_eq!(set.value(0), Some(Value::str("\u{2717}")));
        // the original constant is untouched
        assert_eq!(c.value(1), Some(Value::str("\u{2717}")));
    }

    #[test]
    fn test_compare_with_category_rank() {
        let col = Provider::column(vec![
            Some(Value::str("mid")),
            Some(Value::str("low")),
            Some(Value::str("high")),
        ]);
        let mut rank = HashMap::new();
        rank.insert(Value::str("low"), 0);
        rank.insert(Value::str("mid"), 1);
        rank.insert(Value::str("high"), 2);
        assert_eq!(col.compare_rows(0, 1, &rank), Ordering::Greater);
        assert_eq!(col.compare_rows(0, 2, &rank), Ordering::Less);
    }
}
