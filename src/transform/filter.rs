//! Row filtering by a small command language.
//!
//! Each semicolon-separated clause is `FIELD <verb> <params>` with verb one
//! of `valid`, `is`, `in`, `ranked`, optionally negated with a leading `!`.
//! A row survives only when every clause passes; null values always fail.
use std::cmp::Ordering;
use std::rc::Rc;

use crate::dataset::Dataset;
use crate::field::Field;
use crate::time::Date;
use crate::transform;
use crate::value::{self, Value};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Valid,
    Is,
    In,
    Ranked,
}

#[derive(Debug)]
struct Clause {
    field: Rc<Field>,
    verb: Verb,
    negated: bool,
    params: Vec<Option<Value>>,
}

/// Apply filter commands; identity when nothing is removed
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    let parts = transform::clauses(command);
    if parts.is_empty() {
        return Ok(base.clone());
    }

    let clauses: Vec<Clause> = parts
        .into_iter()
        .map(|c| parse_clause(base, c))
        .collect::<Result<_, _>>()?;

    let n = base.row_count();
    let mut keep = Vec::new();
    for row in 0..n {
        if clauses.iter().all(|c| passes(c, row)) {
            keep.push(row);
        }
    }
    log::debug!("filter kept {} of {} rows", keep.len(), n);
    if keep.len() == n {
        return Ok(base.clone());
    }
    Ok(base.retain_rows(&keep))
}

fn parse_clause(base: &Dataset, text: &str) -> Result<Clause, Error> {
    let (name, rest) = text
        .split_once(' ')
        .ok_or_else(|| Error::BadCommand(format!("incomplete filter clause '{text}'")))?;
    let field = base.field_required(name.trim())?;
    let (verb_text, param_text) = match rest.trim().split_once(' ') {
        Some((v, p)) => (v.trim(), p.trim()),
        None => (rest.trim(), ""),
    };

    let (negated, verb_text) = match verb_text.strip_prefix('!') {
        Some(stripped) => (true, stripped.trim()),
        None => (false, verb_text),
    };
    let verb = match verb_text {
        "valid" => Verb::Valid,
        "is" => Verb::Is,
        "in" => Verb::In,
        "ranked" => Verb::Ranked,
        other => {
            return Err(Error::BadCommand(format!("unknown filter verb '{other}'")));
        }
    };

    let params = parse_params(param_text, field.prefer_categorical());

    let mut clause = Clause { field, verb, negated, params };
    if clause.verb == Verb::Ranked {
        // resolve rank positions into a value range, then filter as "in"
        clause = resolve_ranked(clause)?;
    }
    Ok(clause)
}

fn parse_params(text: &str, categorical: bool) -> Vec<Option<Value>> {
    transform::items(text)
        .into_iter()
        .map(|p| {
            if categorical {
                Some(Value::str(p))
            } else if let Some(v) = value::parse_num(p) {
                Some(Value::Num(v))
            } else {
                Date::parse(p).map(Value::Date)
            }
        })
        .collect()
}

// "ranked a,b" keeps rows whose value sits between the a-th and b-th highest
// distinct values (1-based from the top)
fn resolve_ranked(clause: Clause) -> Result<Clause, Error> {
    if clause.params.len() < 2 {
        return Err(Error::BadCommand(
            "'ranked' filter needs two rank positions".to_string(),
        ));
    }
    let p1 = rank_param(&clause.params[0])?;
    let p2 = rank_param(&clause.params[1])?;

    let mut distinct: Vec<Value> = Vec::new();
    for i in 0..clause.field.row_count() {
        if let Some(v) = clause.field.value(i) {
            distinct.push(v);
        }
    }
    value::sort(&mut distinct);
    distinct.dedup_by(|a, b| value::compare(Some(a), Some(b)) == Ordering::Equal);

    let n = distinct.len();
    if n == 0 {
        return Ok(Clause { verb: Verb::In, params: vec![None, None], ..clause });
    }
    let a = p1.clamp(1, n);
    let b = p2.clamp(1, n);
    let high = distinct[n - a].clone();
    let low = distinct[n - b].clone();
    Ok(Clause { verb: Verb::In, params: vec![Some(low), Some(high)], ..clause })
}

fn rank_param(p: &Option<Value>) -> Result<usize, Error> {
    p.as_ref()
        .and_then(Value::as_num)
        .filter(|v| *v >= 1.0)
        .map(|v| v as usize)
        .ok_or_else(|| Error::BadCommand("'ranked' positions must be numbers from 1".to_string()))
}

fn passes(clause: &Clause, row: usize) -> bool {
    let Some(v) = clause.field.value(row) else {
        // missing values always fail, negated or not
        return false;
    };
    let failed = match clause.verb {
        Verb::Valid => false,
        Verb::Is => !clause
            .params
            .iter()
            .any(|p| value::compare(Some(&v), p.as_ref()) == Ordering::Equal),
        Verb::In | Verb::Ranked => {
            clause.params.len() < 2
                || value::compare(Some(&v), clause.params[0].as_ref()) == Ordering::Less
                || value::compare(Some(&v), clause.params[1].as_ref()) == Ordering::Greater
        }
    };
    if clause.negated { failed } else { !failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn colors() -> Dataset {
        let color = Field::column(
            "color",
            None,
            ["red", "red", "blue", "green"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        let size = Field::column(
            "size",
            None,
            [3.0, 1.0, 4.0, 2.0].iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        size.set_numeric();
        Dataset::make(vec![color, size], false)
    }

    #[test]
    fn test_is_filter_keeps_relative_order() {
        let d = colors();
        let r = d.filter("color is red,blue").unwrap();
        assert_eq!(r.row_count(), 3);
        let f = r.field("color").unwrap();
        assert_eq!(f.value(0), Some(Value::str("red")));
        assert_eq!(f.value(1), Some(Value::str("red")));
        assert_eq!(f.value(2), Some(Value::str("blue")));
    }

    #[test]
    fn test_negated_filter() {
        let d = colors();
        let r = d.filter("color !is red").unwrap();
        assert_eq!(r.row_count(), 2);
    }

    #[test]
    fn test_in_filter() {
        let d = colors();
        let r = d.filter("size in 2,3").unwrap();
        assert_eq!(r.row_count(), 2);
    }

    #[test]
    fn test_ranked_filter() {
        let d = colors();
        // the two highest sizes are 4 and 3
        let r = d.filter("size ranked 1,2").unwrap();
        assert_eq!(r.row_count(), 2);
        let f = r.field("size").unwrap();
        assert_eq!(f.value(0), Some(Value::Num(3.0)));
        assert_eq!(f.value(1), Some(Value::Num(4.0)));
    }

    #[test]
    fn test_valid_filter() {
        let f = Field::column(
            "a",
            None,
            vec![Some(Value::Num(1.0)), None, Some(Value::Num(2.0))],
        );
        f.set_numeric();
        let d = Dataset::make(vec![f], false);
        let r = d.filter("a valid").unwrap();
        assert_eq!(r.row_count(), 2);
    }

    #[test]
    fn test_conjunction_shrinks() {
        let d = colors();
        let both = d.filter("color is red; size in 1,2").unwrap();
        let one = d.filter("color is red").unwrap();
        assert!(both.row_count() <= one.row_count());
        assert_eq!(both.row_count(), 1);
    }

    #[test]
    fn test_no_removal_returns_identity() {
        let d = colors();
        let r = d.filter("color valid").unwrap();
        assert_eq!(r.row_count(), d.row_count());
    }

    #[test]
    fn test_unknown_field_fails() {
        let d = colors();
        assert!(matches!(d.filter("nope is x"), Err(Error::FieldNotFound(_))));
    }

    #[test]
    fn test_unknown_verb_fails() {
        let d = colors();
        assert!(matches!(d.filter("color matches x"), Err(Error::BadCommand(_))));
    }
}
