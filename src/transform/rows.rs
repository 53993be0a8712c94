//! Growing a dataset to an exact row count by proportional replication.
use std::rc::Rc;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::Field;

/// Replicate rows in proportion to a numeric size field until the dataset
/// has exactly the requested count, like `"#count:100"`. Identity when the
/// dataset is empty or already big enough.
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    let command = command.trim();
    if base.row_count() == 0 || command.is_empty() {
        return Ok(base.clone());
    }
    let (name, count) = command
        .split_once(':')
        .ok_or_else(|| Error::BadCommand(format!("expected 'field:count' in '{command}'")))?;
    let target: usize = count
        .trim()
        .parse()
        .map_err(|_| Error::BadCommand(format!("bad row count '{}'", count.trim())))?;
    let size = base.field_required(name.trim())?;
    if !size.is_numeric() {
        return Err(Error::BadCommand(format!(
            "cannot set rows based on non-numeric field '{}'",
            size.name()
        )));
    }
    let n = base.row_count();
    if n >= target {
        return Ok(base.clone());
    }

    // Ideal fractional replication per row, proportional to the size value
    let total = size.num_property("mean").unwrap_or(0.0) * size.num_property("n").unwrap_or(0.0);
    if total <= 0.0 {
        return Ok(base.clone());
    }
    let fractional: Vec<f64> = (0..n)
        .map(|i| {
            size.value(i)
                .and_then(|v| v.as_num())
                .map_or(0.0, |v| v * target as f64 / total)
        })
        .collect();
    let mut replications: Vec<i64> = fractional.iter().map(|f| f.round() as i64).collect();
    let mut produced: i64 = replications.iter().sum();

    // Largest-remainder correction until the rounding error is gone
    while produced > target as i64 {
        let least = extreme(&fractional, &replications, |a, b| a < b);
        replications[least] -= 1;
        produced -= 1;
    }
    while produced < target as i64 {
        let most = extreme(&fractional, &replications, |a, b| a > b);
        replications[most] += 1;
        produced += 1;
    }

    let mut row_map = Vec::with_capacity(target);
    for (row, &reps) in replications.iter().enumerate() {
        for _ in 0..reps {
            row_map.push(row);
        }
    }
    log::debug!("set_row_count: {} rows grown to {}", n, target);

    let fields = base
        .fields()
        .iter()
        .map(|f| Rc::new(Field::permute(f, &row_map, false)))
        .collect();
    Ok(base.replace_fields(fields))
}

// The row whose rounding excess is most extreme under `better`
fn extreme(fractional: &[f64], replications: &[i64], better: fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for i in 1..fractional.len() {
        let a = fractional[i] - replications[i] as f64;
        let b = fractional[best] - replications[best] as f64;
        if better(a, b) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn weighted() -> Dataset {
        let kind = Field::column(
            "kind",
            None,
            ["a", "b", "c"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let weight = Field::column(
            "weight",
            None,
            [1.0, 2.0, 1.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        weight.set_numeric();
        Dataset::make(vec![kind, weight], false)
    }

    #[test]
    fn test_exact_count_proportional() {
        let d = weighted();
        let r = d.set_row_count("weight:8").unwrap();
        assert_eq!(r.row_count(), 8);
        // weights 1:2:1 over 8 rows give 2, 4, 2 replications
        let kind = r.field("kind").unwrap();
        let b_rows = (0..8)
            .filter(|&i| kind.value(i) == Some(Value::str("b")))
            .count();
        assert_eq!(b_rows, 4);
    }

    #[test]
    fn test_already_large_enough() {
        let d = weighted();
        let r = d.set_row_count("weight:2").unwrap();
        assert_eq!(r.row_count(), 3);
    }

    #[test]
    fn test_count_field() {
        let d = weighted();
        let r = d.set_row_count("#count:9").unwrap();
        assert_eq!(r.row_count(), 9);
    }

    #[test]
    fn test_non_numeric_size_fails() {
        let d = weighted();
        assert!(matches!(
            d.set_row_count("kind:10"),
            Err(Error::BadCommand(_))
        ));
    }
}
