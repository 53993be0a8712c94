//! Stacking: cumulative lower/upper bounds for values sharing an x key.
//!
//! The command is `"y; x,...; group,...; full"`. Rows are reordered so each
//! x key is contiguous with its series in reverse-declared category order,
//! then a sign-routed running sum walks the rows. With `full`, every
//! combination of x and group categories is materialized first so stacked
//! areas have no gaps.
use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::Field;
use crate::transform::{self, RowComparator};
use crate::value::{self, Value};

/// Apply a stack command, producing `y$lower` and `y$upper` fields
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    let parts = transform::clauses(command);
    if parts.is_empty() {
        return Ok(base.clone());
    }
    if parts.len() != 4 {
        return Err(Error::BadCommand(
            "stack needs 'y; x,...; group,...; full'".to_string(),
        ));
    }
    let y_name = parts[0];
    let x_names = transform::items(parts[1]);
    let group_names = transform::items(parts[2]);
    let full = parts[3].eq_ignore_ascii_case("true");

    // Key fields in stacking order: x, then groups, then y to break ties
    let mut key_fields: Vec<Rc<Field>> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for name in x_names.iter().chain(group_names.iter()).chain([y_name].iter()) {
        let f = base.field_required(name)?;
        if seen.insert(f.name().to_string()) {
            key_fields.push(f);
        }
    }

    // All fields, keys first, everything else in dataset order
    let mut all_fields = key_fields.clone();
    for f in base.fields() {
        if !seen.contains(f.name()) {
            all_fields.push(f.clone());
        }
    }

    // Rows with a null key cannot stack; drop them, then sort x ascending
    // and groups/y descending so series stack bottom-up
    let n = base.row_count();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        if key_fields.iter().all(|f| f.value(i).is_some()) {
            rows.push(i);
        }
    }
    let ascending: Vec<bool> = (0..key_fields.len()).map(|i| i < x_names.len()).collect();
    let comparison = RowComparator::new(key_fields.clone(), Some(ascending), true);
    rows.sort_by(|&a, &b| comparison.compare(a, b));

    let pure_reorder = rows.len() == n;
    let mut fields: Vec<Rc<Field>> = all_fields
        .iter()
        .map(|f| Rc::new(Field::permute(f, &rows, pure_reorder)))
        .collect();

    if full {
        fields = all_combinations(&fields, x_names.len(), group_names.len());
    }

    let stacked = make_stacked_values(&fields, y_name, x_names.len(), full)?;
    log::debug!("stacked {} rows over {} x fields", stacked.first().map_or(0, |f| f.row_count()), x_names.len());
    Ok(base.replace_fields(stacked))
}

fn make_stacked_values(
    fields: &[Rc<Field>],
    y_name: &str,
    x_count: usize,
    full: bool,
) -> Result<Vec<Rc<Field>>, Error> {
    let y = fields
        .iter()
        .find(|f| f.name() == y_name)
        .cloned()
        .ok_or_else(|| Error::FieldNotFound(y_name.to_string()))?;
    let x_fields: Vec<Rc<Field>> = fields[..x_count].to_vec();
    let x_key = RowComparator::new(x_fields, None, false);

    let n = y.row_count();
    let mut lower: Vec<Option<Value>> = vec![None; n];
    let mut upper: Vec<Option<Value>> = vec![None; n];

    // Separate running totals above and below zero, reset on each new x key
    let mut last_positive = 0.0;
    let mut last_negative = 0.0;
    for i in 0..n {
        let v = match y.value(i).and_then(|v| v.as_num()) {
            Some(v) => v,
            // full data fills gaps with zeroes so areas stay contiguous
            None if full => 0.0,
            None => continue,
        };
        if i > 0 && x_key.compare(i, i - 1) != Ordering::Equal {
            last_positive = 0.0;
            last_negative = 0.0;
        }
        if v < 0.0 {
            lower[i] = Some(Value::Num(last_negative));
            last_negative += v;
            upper[i] = Some(Value::Num(last_negative));
        } else {
            lower[i] = Some(Value::Num(last_positive));
            last_positive += v;
            upper[i] = Some(Value::Num(last_positive));
        }
    }

    let mut result: Vec<Rc<Field>> = fields.to_vec();
    for (suffix, data) in [("$lower", lower), ("$upper", upper)] {
        let f = Field::column(&format!("{y_name}{suffix}"), Some(y.label()), data);
        f.copy_base_properties(&y);
        result.push(Rc::new(f));
    }

    // Fields are ordered by name, synthetic fields after the rest
    result.sort_by(|a, b| match (a.is_synthetic(), b.is_synthetic()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.name().cmp(b.name()),
    });
    Ok(result)
}

// Expand the data so every combination of x and group categories has a row.
// Real rows merge in where their keys match; everything else becomes a
// key-only row with nulls elsewhere.
fn all_combinations(fields: &[Rc<Field>], x_count: usize, group_count: usize) -> Vec<Rc<Field>> {
    let key_len = x_count + group_count;
    let mut categories: Vec<Vec<Value>> = Vec::with_capacity(key_len);
    for (i, f) in fields[..key_len].iter().enumerate() {
        let cats = f.categories().map_or(Vec::new(), |c| c.to_vec());
        if cats.is_empty() {
            return fields.to_vec();
        }
        if i < x_count {
            categories.push(cats);
        } else {
            // groups iterate in reverse category order, matching the
            // descending sort of the data
            categories.push(cats.into_iter().rev().collect());
        }
    }

    // The rows are already sorted the way the combinations enumerate
    let n = fields[0].row_count();
    let mut rows: Vec<Vec<Option<Value>>> = Vec::new();
    let mut index = vec![0usize; key_len];
    let mut data_at = 0;
    loop {
        let key_row: Vec<Option<Value>> = (0..fields.len())
            .map(|i| (i < key_len).then(|| categories[i][index[i]].clone()))
            .collect();
        let mut matched = false;
        while matches_current(&key_row, fields, key_len, data_at, n) {
            matched = true;
            rows.push(fields.iter().map(|f| f.value(data_at)).collect());
            data_at += 1;
        }
        if !matched {
            rows.push(key_row);
        }
        if !next_index(&mut index, &categories) {
            break;
        }
    }

    fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let column = rows.iter().map(|r| r[i].clone()).collect();
            let built = Field::column(f.name(), Some(f.label()), column);
            built.copy_base_properties(f);
            Rc::new(built)
        })
        .collect()
}

fn matches_current(
    key_row: &[Option<Value>],
    fields: &[Rc<Field>],
    key_len: usize,
    data_at: usize,
    n: usize,
) -> bool {
    if data_at >= n {
        return false;
    }
    (0..key_len).all(|i| {
        value::compare(key_row[i].as_ref(), fields[i].value(data_at).as_ref()) == Ordering::Equal
    })
}

// Odometer increment over the category sizes, last dimension fastest
fn next_index(index: &mut [usize], categories: &[Vec<Value>]) -> bool {
    for p in (0..index.len()).rev() {
        index[p] += 1;
        if index[p] < categories[p].len() {
            return true;
        }
        index[p] = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{Near, assert_near};

    fn sample() -> Dataset {
        let year = Field::column(
            "year",
            None,
            ["2020", "2020", "2021", "2021"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let kind = Field::column(
            "kind",
            None,
            ["a", "b", "a", "b"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let amount = Field::column(
            "amount",
            None,
            [3.0, 5.0, 2.0, 4.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        amount.set_numeric();
        Dataset::make(vec![year, kind, amount], false)
    }

    fn num_at(d: &Dataset, name: &str, row: usize) -> f64 {
        d.field(name).unwrap().value(row).unwrap().as_num().unwrap()
    }

    #[test]
    fn test_stack_bounds_partition() {
        let d = sample();
        let s = d.stack("amount; year; kind; false").unwrap();
        assert_eq!(s.row_count(), 4);
        let value = s.field("amount").unwrap();
        let lower = s.field("amount$lower").unwrap();
        let upper = s.field("amount$upper").unwrap();
        for i in 0..4 {
            let v = value.value(i).unwrap().as_num().unwrap();
            assert_near!(
                upper.value(i).unwrap().as_num().unwrap()
                    - lower.value(i).unwrap().as_num().unwrap(),
                v
            );
        }
        // within each year the intervals abut from zero: b stacks first
        // (reverse category order), then a on top
        assert_near!(num_at(&s, "amount$lower", 0), 0.0);
        assert_near!(num_at(&s, "amount$upper", 0), 5.0);
        assert_near!(num_at(&s, "amount$lower", 1), 5.0);
        assert_near!(num_at(&s, "amount$upper", 1), 8.0);
        // next year resets the running sum
        assert_near!(num_at(&s, "amount$lower", 2), 0.0);
    }

    #[test]
    fn test_stack_routes_negatives_below_zero() {
        let x = Field::column(
            "x",
            None,
            ["p", "p"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let v = Field::column(
            "v",
            None,
            [3.0, -2.0].iter().map(|n| Some(Value::Num(*n))).collect(),
        );
        v.set_numeric();
        let d = Dataset::make(vec![x, v], false);
        let s = d.stack("v; x; ; false").unwrap();
        let mut seen_negative = false;
        for i in 0..s.row_count() {
            let val = num_at(&s, "v", i);
            if val < 0.0 {
                seen_negative = true;
                assert_near!(num_at(&s, "v$lower", i), 0.0);
                assert_near!(num_at(&s, "v$upper", i), -2.0);
            }
        }
        assert!(seen_negative);
    }

    #[test]
    fn test_full_fills_missing_combinations() {
        let year = Field::column(
            "year",
            None,
            ["2020", "2020", "2021"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let kind = Field::column(
            "kind",
            None,
            ["a", "b", "a"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let amount = Field::column(
            "amount",
            None,
            [3.0, 5.0, 2.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        amount.set_numeric();
        let d = Dataset::make(vec![year, kind, amount], false);
        let s = d.stack("amount; year; kind; true").unwrap();
        // 2021/b is synthesized, so all four combinations appear
        assert_eq!(s.row_count(), 4);
        for i in 0..4 {
            assert!(s.field("amount$lower").unwrap().value(i).is_some());
            assert!(s.field("amount$upper").unwrap().value(i).is_some());
        }
    }

    #[test]
    fn test_null_keys_dropped() {
        let x = Field::column(
            "x",
            None,
            vec![Some(Value::str("p")), None, Some(Value::str("q"))],
        );
        let v = Field::column(
            "v",
            None,
            [1.0, 2.0, 3.0].iter().map(|n| Some(Value::Num(*n))).collect(),
        );
        v.set_numeric();
        let d = Dataset::make(vec![x, v], false);
        let s = d.stack("v; x; ; false").unwrap();
        assert_eq!(s.row_count(), 2);
    }

    #[test]
    fn test_original_untouched() {
        let d = sample();
        let _ = d.stack("amount; year; kind; false").unwrap();
        assert_eq!(d.row_count(), 4);
        assert!(d.field("amount$lower").is_none());
    }

    #[test]
    fn test_unknown_y_field() {
        let d = sample();
        assert!(matches!(
            d.stack("nope; year; kind; false"),
            Err(Error::FieldNotFound(_))
        ));
    }
}
