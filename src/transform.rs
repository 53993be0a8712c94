//! The transform pipeline: command strings, parsed at the boundary into
//! typed operations, each producing a new dataset.
//!
//! Shared machinery lives here: clause splitting for the semicolon/comma
//! command mini-language, the composite row comparator every sorting and
//! grouping transform relies on, and tie-averaged ranking.
use std::cmp::Ordering;
use std::rc::Rc;

use crate::field::Field;

pub mod bin;
pub mod constants;
pub mod each;
pub mod filter;
pub mod rows;
pub mod series;
pub mod sort;
pub mod stack;
pub mod summarize;

/// Split a command into semicolon-separated clauses, trimmed. A trailing
/// semicolon is tolerated; an empty command gives no clauses.
pub fn clauses(command: &str) -> Vec<&str> {
    let command = command.strip_suffix(';').unwrap_or(command);
    let parts: Vec<&str> = command.split(';').map(str::trim).collect();
    if parts.len() == 1 && parts[0].is_empty() {
        Vec::new()
    } else {
        parts
    }
}

/// Split a clause into comma-separated items, trimmed; empty gives none
pub fn items(clause: &str) -> Vec<&str> {
    let parts: Vec<&str> = clause.split(',').map(str::trim).collect();
    if parts.len() == 1 && parts[0].is_empty() {
        Vec::new()
    } else {
        parts
    }
}

/// Compares row indices through an ordered list of fields, each with its own
/// direction. Ties optionally break on the raw row index, which makes the
/// order total and the sort stable; without the tie-break, equal keys
/// compare equal (used for grouping).
#[derive(Debug)]
pub struct RowComparator {
    fields: Vec<Rc<Field>>,
    ascending: Option<Vec<bool>>,
    rows_break_ties: bool,
}

impl RowComparator {
    /// Build a comparator; `ascending` of `None` means all fields ascending
    pub fn new(
        fields: Vec<Rc<Field>>,
        ascending: Option<Vec<bool>>,
        rows_break_ties: bool,
    ) -> RowComparator {
        RowComparator { fields, ascending, rows_break_ties }
    }

    /// Compare two row indices
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        for (i, f) in self.fields.iter().enumerate() {
            let mut c = f.compare_rows(a, b);
            if let Some(asc) = &self.ascending {
                if !asc[i] {
                    c = c.reverse();
                }
            }
            if c != Ordering::Equal {
                return c;
            }
        }
        if self.rows_break_ties { a.cmp(&b) } else { Ordering::Equal }
    }

    /// Row indices `0..n` sorted by this comparator
    pub fn sorted_order(&self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.compare(a, b));
        order
    }
}

/// Convert a sorted order (possibly with ties) into a 1-based rank per
/// original row; tied rows share the averaged rank of their run
pub fn tied_ranks(order: &[usize], comparison: &RowComparator) -> Vec<f64> {
    let mut ranks = vec![0.0; order.len()];
    let mut run_start = 0;
    while run_start < order.len() {
        let mut run_end = run_start + 1;
        while run_end < order.len()
            && comparison.compare(order[run_start], order[run_end]) == Ordering::Equal
        {
            run_end += 1;
        }
        let rank = (run_end + run_start + 1) as f64 / 2.0;
        for &row in &order[run_start..run_end] {
            ranks[row] = rank;
        }
        run_start = run_end;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_clauses_and_items() {
        assert_eq!(clauses("a; b ;c;"), vec!["a", "b", "c"]);
        assert!(clauses("").is_empty());
        assert!(clauses(" ").is_empty());
        assert_eq!(items("x, y"), vec!["x", "y"]);
        assert!(items("").is_empty());
    }

    #[test]
    fn test_comparator_directions_and_ties() {
        let f = Rc::new(Field::column(
            "a",
            None,
            [2.0, 1.0, 2.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        ));
        f.set_numeric();

        let asc = RowComparator::new(vec![f.clone()], Some(vec![true]), true);
        assert_eq!(asc.sorted_order(3), vec![1, 0, 2]);

        let desc = RowComparator::new(vec![f.clone()], Some(vec![false]), true);
        assert_eq!(desc.sorted_order(3), vec![0, 2, 1]);

        let grouping = RowComparator::new(vec![f], None, false);
        assert_eq!(grouping.compare(0, 2), Ordering::Equal);
    }

    #[test]
    fn test_tied_ranks() {
        let f = Rc::new(Field::column(
            "a",
            None,
            [10.0, 20.0, 10.0, 30.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        ));
        f.set_numeric();
        let cmp = RowComparator::new(vec![f], Some(vec![true]), true);
        let order = cmp.sorted_order(4);
        // ranks computed without the tie-break so equal values share a rank
        let group = RowComparator::new(
            vec![cmp.fields[0].clone()],
            Some(vec![true]),
            false,
        );
        let ranks = tied_ranks(&order, &group);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
    }
}
