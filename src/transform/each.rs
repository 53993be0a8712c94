//! Splitting list-valued fields into one row per item.
use std::rc::Rc;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::Field;
use crate::transform;
use crate::value::Value;

/// Split each named list-valued field so every list item gets its own row;
/// fields that are not list-valued are left alone
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    let mut result = base.clone();
    for name in transform::clauses(command) {
        let f = result.field_required(name)?;
        if f.is_list() {
            result = split_lists(&result, &f);
        }
    }
    Ok(result)
}

fn split_lists(base: &Dataset, target: &Field) -> Dataset {
    let n = target.row_count();
    let mut rows: Vec<usize> = Vec::with_capacity(n);
    let mut items: Vec<Option<Value>> = Vec::with_capacity(n);
    for i in 0..n {
        match target.value(i) {
            Some(Value::List(list)) => {
                for item in list.items() {
                    items.push(Some(item.clone()));
                    rows.push(i);
                }
            }
            // a missing or plain value keeps its single row
            other => {
                items.push(other);
                rows.push(i);
            }
        }
    }

    let fields = base
        .fields()
        .iter()
        .map(|f| {
            if f.name() == target.name() {
                Rc::new(Field::column(f.name(), Some(f.label()), std::mem::take(&mut items)))
            } else {
                Rc::new(Field::permute(f, &rows, false))
            }
        })
        .collect();
    base.replace_fields(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto;

    #[test]
    fn test_split_rows() {
        let tags = auto::to_list(&Field::column(
            "tags",
            None,
            ["a,b", "c", "a,c,d"].iter().map(|s| Some(Value::str(s))).collect(),
        ));
        let size = Field::column(
            "size",
            None,
            [1.0, 2.0, 3.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        size.set_numeric();
        let d = Dataset::make(vec![tags, size], false);

        let s = d.each("tags").unwrap();
        assert_eq!(s.row_count(), 6);
        let tags = s.field("tags").unwrap();
        assert_eq!(tags.value(0), Some(Value::str("a")));
        assert_eq!(tags.value(1), Some(Value::str("b")));
        assert_eq!(tags.value(2), Some(Value::str("c")));
        // the companion field replicates with its row
        let size = s.field("size").unwrap();
        assert_eq!(size.value(0), Some(Value::Num(1.0)));
        assert_eq!(size.value(1), Some(Value::Num(1.0)));
        assert_eq!(size.value(5), Some(Value::Num(3.0)));
    }

    #[test]
    fn test_null_rows_stay_single() {
        let tags = auto::to_list(&Field::column(
            "tags",
            None,
            vec![Some(Value::str("a,b")), None, Some(Value::str("c,d,e"))],
        ));
        let d = Dataset::make(vec![tags], false);
        let s = d.each("tags").unwrap();
        assert_eq!(s.row_count(), 6);
        assert_eq!(s.field("tags").unwrap().value(2), None);
    }

    #[test]
    fn test_non_list_field_untouched() {
        let plain = Field::column(
            "plain",
            None,
            ["x", "y"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let d = Dataset::make(vec![plain], false);
        let s = d.each("plain").unwrap();
        assert_eq!(s.row_count(), 2);
    }
}
