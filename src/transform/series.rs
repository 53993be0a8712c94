//! Pivoting several y fields into `#series`/`#values` (wide to long).
//!
//! The command is `"y1,y2,...; keep1,keep2,..."`. Every y field contributes
//! one block of rows: `#series` names the source field, `#values` holds its
//! values, and each kept field is replicated once per block.
use std::rc::Rc;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::Field;
use crate::transform;
use crate::value::Value;

/// Apply a series-conversion command; identity with fewer than two y fields
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    let sections = transform::clauses(command);
    if sections.is_empty() {
        return Ok(base.clone());
    }
    let y_names = transform::items(sections[0]);
    if y_names.len() < 2 {
        return Ok(base.clone());
    }
    let y_fields: Vec<Rc<Field>> = y_names
        .iter()
        .map(|name| base.field_required(name))
        .collect::<Result<_, _>>()?;

    let mut keep = transform::items(sections.get(1).copied().unwrap_or(""));
    for required in ["#row", "#count", "#selection"] {
        if !keep.contains(&required) {
            keep.push(required);
        }
    }

    let n = base.row_count();
    let m = y_fields.len();
    log::debug!("series: pivoting {} fields over {} rows", m, n);

    // Block i of the output repeats the i-th y name n times
    let mut series_data = Vec::with_capacity(m * n);
    let mut values_data = Vec::with_capacity(m * n);
    for (name, y) in y_names.iter().zip(&y_fields) {
        let tag = Value::str(name);
        for row in 0..n {
            series_data.push(Some(tag.clone()));
            values_data.push(y.value(row));
        }
    }
    let series = Field::column("#series", Some("Series"), series_data);
    series.set_categories(y_names.iter().map(|n| Value::str(n)).collect());

    let values = Field::column("#values", Some(&y_names.join(", ")), values_data);
    values.copy_base_properties(&y_fields[0]);

    // Kept fields replicate by row index, once per block
    let indexing: Vec<usize> = (0..m).flat_map(|_| 0..n).collect();
    let mut fields = vec![Rc::new(series), Rc::new(values)];
    for name in keep {
        if name == "#series" || name == "#values" {
            continue;
        }
        let f = base.field_required(name)?;
        fields.push(Rc::new(Field::permute(&f, &indexing, false)));
    }
    Ok(base.replace_fields(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medals() -> Dataset {
        let country = Field::column(
            "country",
            None,
            ["FRA", "GER"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let gold = Field::column(
            "gold",
            None,
            [3.0, 5.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        gold.set_numeric();
        let silver = Field::column(
            "silver",
            None,
            [7.0, 2.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        silver.set_numeric();
        Dataset::make(vec![country, gold, silver], false)
    }

    #[test]
    fn test_pivot_shape() {
        let d = medals();
        let s = d.series("gold,silver; country").unwrap();
        assert_eq!(s.row_count(), 4);
        let series = s.field("#series").unwrap();
        let values = s.field("#values").unwrap();
        let country = s.field("country").unwrap();

        assert_eq!(series.value(0), Some(Value::str("gold")));
        assert_eq!(series.value(2), Some(Value::str("silver")));
        assert_eq!(values.value(1), Some(Value::Num(5.0)));
        assert_eq!(values.value(2), Some(Value::Num(7.0)));
        assert_eq!(country.value(0), Some(Value::str("FRA")));
        assert_eq!(country.value(3), Some(Value::str("GER")));
    }

    #[test]
    fn test_series_categories_follow_declaration() {
        let d = medals();
        let s = d.series("silver,gold; country").unwrap();
        let cats = s.field("#series").unwrap().categories().unwrap();
        assert_eq!(cats[0], Value::str("silver"));
        assert_eq!(cats[1], Value::str("gold"));
    }

    #[test]
    fn test_values_inherit_type_and_label() {
        let d = medals();
        let s = d.series("gold,silver; country").unwrap();
        let values = s.field("#values").unwrap();
        assert!(values.is_numeric());
        assert_eq!(values.label(), "gold, silver");
    }

    #[test]
    fn test_row_and_count_kept() {
        let d = medals();
        let s = d.series("gold,silver;").unwrap();
        assert!(s.field("#row").is_some());
        assert!(s.field("#count").is_some());
        assert_eq!(s.field("#row").unwrap().value(3), Some(Value::Num(2.0)));
        assert!(s.field("country").is_none());
    }

    #[test]
    fn test_single_y_is_identity() {
        let d = medals();
        let s = d.series("gold; country").unwrap();
        assert_eq!(s.row_count(), 2);
        assert!(s.field("gold").is_some());
    }
}
