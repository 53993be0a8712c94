//! Sorting rows, and re-deriving category display orders to follow the data.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::Field;
use crate::transform::{self, RowComparator};
use crate::value::Value;

/// Apply a sort command. Dimensions take an optional `:ascending` or
/// `:descending` suffix; dates and categoricals default to ascending, plain
/// numerics to descending. With `sort_categories`, categorical fields
/// without an inherent order get their category order recomputed from the
/// mean rank of their rows under the new sort.
pub fn apply(base: &Dataset, command: &str, sort_categories: bool) -> Result<Dataset, Error> {
    let names = transform::clauses(command);
    if names.is_empty() {
        return Ok(base.clone());
    }

    let mut dimensions = Vec::with_capacity(names.len());
    let mut ascending = Vec::with_capacity(names.len());
    for name in &names {
        let (field_name, direction) = match name.split_once(':') {
            Some((f, d)) => (f.trim(), Some(d.trim())),
            None => (name.trim(), None),
        };
        let field = base.field_required(field_name)?;
        let asc = match direction {
            Some(d) if d.eq_ignore_ascii_case("ascending") => true,
            Some(d) if d.eq_ignore_ascii_case("descending") => false,
            Some(d) => {
                return Err(Error::BadCommand(format!(
                    "sort direction must be 'ascending' or 'descending', not '{d}'"
                )));
            }
            None => field.is_date() || !field.is_numeric(),
        };
        dimensions.push(field);
        ascending.push(asc);
    }

    let comparator = RowComparator::new(dimensions.clone(), Some(ascending.clone()), true);
    let mut row_order = comparator.sorted_order(base.row_count());

    // Rows binned into the catch-all category belong at the end no matter
    // what the sort said
    for f in base.fields().iter().rev() {
        if f.is_binned() && f.prefer_categorical() {
            row_order = move_catch_all_to_end(&row_order, f);
        }
    }

    // Ranks under the sort dimensions alone (no row tie-break), for the
    // category ordering pass
    let grouping = RowComparator::new(dimensions, Some(ascending), false);
    let ranks = transform::tied_ranks(&row_order, &grouping);

    let mut fields = Vec::with_capacity(base.fields().len());
    for f in base.fields() {
        let permuted = Field::permute(f, &row_order, true);
        if sort_categories && !f.ordered() {
            if let Some(order) = categories_by_mean_rank(f, &ranks) {
                permuted.set_categories(order);
            }
        }
        fields.push(Rc::new(permuted));
    }
    Ok(base.replace_fields(fields))
}

fn move_catch_all_to_end(order: &[usize], f: &Field) -> Vec<usize> {
    let overflow = Value::str("\u{2026}");
    let mut result = Vec::with_capacity(order.len());
    let mut at_end = Vec::new();
    for &row in order {
        if f.value(row).as_ref() == Some(&overflow) {
            at_end.push(row);
        } else {
            result.push(row);
        }
    }
    result.extend(at_end);
    result
}

// Order categories by the mean row rank of their members, with a small bias
// towards the incumbent order so empty categories stay put
fn categories_by_mean_rank(f: &Field, ranks: &[f64]) -> Option<Vec<Value>> {
    let categories = f.categories()?;
    let counts = f.category_counts()?;
    let n_cats = categories.len();
    if n_cats == 0 {
        return None;
    }

    let index: HashMap<&Value, usize> =
        categories.iter().enumerate().map(|(i, c)| (c, i)).collect();
    let mut means: Vec<f64> = (0..n_cats).map(|i| i as f64 / 100.0 / n_cats as f64).collect();

    for (row, rank) in ranks.iter().enumerate() {
        let Some(v) = f.value(row) else { continue };
        let Some(&idx) = index.get(&v) else { continue };
        if counts[idx] > 0 {
            means[idx] += rank / counts[idx] as f64;
        }
    }

    let mut order: Vec<usize> = (0..n_cats).collect();
    order.sort_by(|&a, &b| means[a].partial_cmp(&means[b]).unwrap_or(Ordering::Equal));
    Some(order.into_iter().map(|i| categories[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let region = Field::column(
            "region",
            None,
            ["West", "East", "West", "North"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let sales = Field::column(
            "sales",
            None,
            [10.0, 40.0, 20.0, 30.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        sales.set_numeric();
        Dataset::make(vec![region, sales], false)
    }

    #[test]
    fn test_numeric_defaults_descending() {
        let d = sample();
        let s = d.sort("sales").unwrap();
        let f = s.field("sales").unwrap();
        let got: Vec<f64> = (0..4).map(|i| f.value(i).unwrap().as_num().unwrap()).collect();
        assert_eq!(got, vec![40.0, 30.0, 20.0, 10.0]);
    }

    #[test]
    fn test_categorical_defaults_ascending() {
        let d = sample();
        let s = d.sort("region").unwrap();
        let f = s.field("region").unwrap();
        assert_eq!(f.value(0), Some(Value::str("East")));
        assert_eq!(f.value(1), Some(Value::str("North")));
    }

    #[test]
    fn test_explicit_direction_and_reversal() {
        let d = sample();
        let up = d.sort("sales:ascending").unwrap();
        let down = d.sort("sales:descending").unwrap();
        let n = d.row_count();
        for i in 0..n {
            assert_eq!(
                up.field("sales").unwrap().value(i),
                down.field("sales").unwrap().value(n - 1 - i)
            );
        }
    }

    #[test]
    fn test_sort_is_idempotent() {
        let d = sample();
        let once = d.sort("sales").unwrap();
        let twice = once.sort("sales").unwrap();
        for i in 0..d.row_count() {
            assert_eq!(
                once.field("#row").unwrap().value(i),
                twice.field("#row").unwrap().value(i)
            );
        }
    }

    #[test]
    fn test_original_unchanged() {
        let d = sample();
        let _ = d.sort("sales").unwrap();
        assert_eq!(d.field("sales").unwrap().value(0), Some(Value::Num(10.0)));
    }

    #[test]
    fn test_categories_follow_data_order() {
        let d = sample();
        // sorting by sales descending puts East (40) first, then North, West
        let s = d.sort("sales").unwrap();
        let cats = s.field("region").unwrap().categories().unwrap();
        assert_eq!(cats[0], Value::str("East"));
        assert_eq!(cats[1], Value::str("North"));
        assert_eq!(cats[2], Value::str("West"));
    }

    #[test]
    fn test_sort_rows_leaves_categories() {
        let d = sample();
        let s = d.sort_rows("sales").unwrap();
        let cats = s.field("region").unwrap().categories().unwrap();
        // natural (alphabetical) order preserved
        assert_eq!(cats[0], Value::str("East"));
        assert_eq!(cats[1], Value::str("North"));
        assert_eq!(cats[2], Value::str("West"));
    }

    #[test]
    fn test_bad_direction_keyword() {
        let d = sample();
        assert!(matches!(d.sort("sales:up"), Err(Error::BadCommand(_))));
    }
}
