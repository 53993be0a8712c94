//! Adding constant fields from a command like `"4.3; 'label'"`.
use std::rc::Rc;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::Field;
use crate::transform;
use crate::value::{self, Value};

/// Prepend one constant field per clause. Quoted constants are text fields
/// (named with their quotes, labelled without); unquoted ones are numeric.
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    let parts = transform::clauses(command);
    if parts.is_empty() {
        return Ok(base.clone());
    }

    let n = base.row_count();
    let mut fields: Vec<Rc<Field>> = Vec::with_capacity(parts.len() + base.fields().len());
    for text in parts {
        let f = match dequote(text) {
            Some(plain) => {
                Field::constant(text, Some(plain), Some(Value::str(plain)), n)
            }
            None => {
                let value = value::parse_num(text).map(Value::Num);
                Field::constant(text, Some(text), value, n)
            }
        };
        fields.push(Rc::new(f));
    }
    fields.extend(base.fields().iter().cloned());
    Ok(base.replace_fields(fields))
}

fn dequote(text: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(&text[1..text.len() - 1]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple() -> Dataset {
        let a = Field::column(
            "a",
            None,
            [1.0, 2.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        a.set_numeric();
        Dataset::make(vec![a], false)
    }

    #[test]
    fn test_numeric_constant() {
        let d = simple();
        let c = d.add_constants("4.3").unwrap();
        let f = c.field("4.3").unwrap();
        assert!(f.is_numeric());
        assert_eq!(f.value(0), Some(Value::Num(4.3)));
        assert_eq!(f.value(1), Some(Value::Num(4.3)));
        // constants come first, existing fields after
        assert_eq!(c.fields()[0].name(), "4.3");
        assert_eq!(c.fields()[1].name(), "a");
    }

    #[test]
    fn test_quoted_constant_is_text() {
        let d = simple();
        let c = d.add_constants("'total'").unwrap();
        let f = c.field("'total'").unwrap();
        assert!(!f.is_numeric());
        assert_eq!(f.label(), "total");
        assert_eq!(f.value(0), Some(Value::str("total")));
    }

    #[test]
    fn test_multiple_constants() {
        let d = simple();
        let c = d.add_constants("1; 'x'").unwrap();
        assert!(c.field("1").is_some());
        assert!(c.field("'x'").is_some());
        assert_eq!(c.row_count(), 2);
    }

    #[test]
    fn test_empty_command_is_identity() {
        let d = simple();
        let c = d.add_constants("").unwrap();
        assert_eq!(c.fields().len(), d.fields().len());
    }
}
