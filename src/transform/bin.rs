//! Binning and ranking of individual fields.
//!
//! Commands look like `"salary=bin; age=bin:10; height=rank:ascending"`.
//! Binning replaces values with [`Range`] cells; ranking replaces them with
//! tie-averaged ranks. Neither aggregates rows.
use std::collections::HashMap;
use std::rc::Rc;

use crate::Error;
use crate::auto;
use crate::dataset::Dataset;
use crate::field::{Field, Prop};
use crate::transform::{self, RowComparator};
use crate::value::{Range, Value};

const DEFAULT_BIN_COUNT: usize = 7;

#[derive(Debug, Clone, Copy)]
enum Op {
    Bin { desired: Option<usize> },
    Rank { ascending: bool },
}

/// Apply bin/rank commands to the named fields
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    if base.row_count() == 0 {
        return Ok(base.clone());
    }
    let parts = transform::clauses(command);
    if parts.is_empty() {
        return Ok(base.clone());
    }

    let mut operations: HashMap<String, Op> = HashMap::new();
    for part in parts {
        let (name, op_text) = part
            .split_once('=')
            .ok_or_else(|| Error::BadCommand(format!("expected 'field=operation' in '{part}'")))?;
        let name = name.trim();
        base.field_required(name)?;
        operations.insert(name.to_string(), parse_op(op_text.trim())?);
    }

    let fields = base
        .fields()
        .iter()
        .map(|f| match operations.get(f.name()) {
            Some(Op::Bin { desired }) => Rc::new(bin(f, *desired)),
            Some(Op::Rank { ascending }) => Rc::new(rank(f, *ascending)),
            None => f.clone(),
        })
        .collect();
    Ok(base.replace_fields(fields))
}

fn parse_op(text: &str) -> Result<Op, Error> {
    let (name, option) = match text.split_once(':') {
        Some((n, o)) => (n.trim(), Some(o.trim())),
        None => (text, None),
    };
    match name {
        "bin" => {
            let desired = match option {
                Some(o) => Some(
                    o.parse::<usize>()
                        .map_err(|_| Error::BadCommand(format!("bad bin count '{o}'")))?,
                ),
                None => None,
            };
            Ok(Op::Bin { desired })
        }
        "rank" => Ok(Op::Rank { ascending: option == Some("ascending") }),
        other => Err(Error::BadCommand(format!("unknown field operation '{other}'"))),
    }
}

/// Rank the rows of a field, averaging ties; rank 1 is the largest value
/// unless `ascending` is set
pub fn rank(f: &Field, ascending: bool) -> Field {
    let n = f.row_count();
    let comparison =
        RowComparator::new(vec![Rc::new(f.clone())], Some(vec![ascending]), true);
    let order = comparison.sorted_order(n);

    let mut ranks: Vec<Option<Value>> = vec![None; n];
    let mut p = 0;
    while p < n {
        let row_p = order[p];
        let mut q = p + 1;
        while q < n && f.compare_rows(row_p, order[q]) == std::cmp::Ordering::Equal {
            q += 1;
        }
        let rank = (p + q + 1) as f64 / 2.0;
        for &row in &order[p..q] {
            ranks[row] = Some(Value::Num(rank));
        }
        p = q;
    }

    let result = Field::column(f.name(), Some(f.label()), ranks);
    result.set_numeric();
    result
}

/// Bin a field into about the desired number of bins (`None` for the default)
pub fn bin(f: &Field, desired: Option<usize>) -> Field {
    let result = if f.prefer_categorical() {
        bin_categorical(f, desired.unwrap_or(DEFAULT_BIN_COUNT))
    } else {
        bin_numeric(f, desired)
    };
    result.set("binned", Some(Prop::Bool(true)));
    result
}

// Keep the most frequent categories and collapse the rest into "…"
fn bin_categorical(f: &Field, desired: usize) -> Field {
    let categories = f.categories().unwrap_or_default();
    if categories.len() <= desired {
        return f.clone();
    }
    let counts = f.category_counts().unwrap_or_default();

    let mut order: Vec<usize> = (0..categories.len()).collect();
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]));

    let overflow = Value::str("\u{2026}");
    let mut new_names: HashMap<Value, Value> = HashMap::new();
    for (position, &cat_idx) in order.iter().enumerate() {
        let cat = categories[cat_idx].clone();
        let target = if position < desired.saturating_sub(1) {
            cat.clone()
        } else {
            overflow.clone()
        };
        new_names.insert(cat, target);
    }

    let data = (0..f.row_count())
        .map(|i| f.value(i).and_then(|v| new_names.get(&v).cloned()))
        .collect();
    Field::column(f.name(), Some(f.label()), data)
}

fn bin_numeric(f: &Field, desired: Option<usize>) -> Field {
    let desired_divisions = desired.map_or(0, |d| d + 1);
    let scale = auto::make_numeric_scale(f, true, [0.0, 0.0], 0.0, desired_divisions, true);
    let divisions = &scale.divisions;

    let date_format = if f.is_date() { f.date_format() } else { None };
    let ranges: Vec<Rc<Range>> = divisions
        .windows(2)
        .map(|pair| {
            let r = match date_format {
                Some(fmt) => Range::date(pair[0], pair[1], scale.granular, fmt),
                None => Range::numeric(pair[0], pair[1], scale.granular),
            };
            Rc::new(r)
        })
        .collect();
    if ranges.is_empty() {
        return f.clone();
    }

    let data = (0..f.row_count())
        .map(|i| {
            let d = f.value(i)?.as_num()?;
            let slot = index_of(d, divisions).min(ranges.len() - 1);
            Some(Value::Range(ranges[slot].clone()))
        })
        .collect();

    let result = Field::column(f.name(), Some(f.label()), data);
    if f.is_date() {
        result.set("date", Some(Prop::Bool(true)));
    }
    result.set_numeric();
    // every bin is a category, including empty ones
    result.set_categories(ranges.into_iter().map(Value::Range).collect());
    result
}

// Highest index whose division is <= v, by binary search; 0 when v sits
// below the first division
fn index_of(v: f64, divisions: &[f64]) -> usize {
    let mut low: isize = -1;
    let mut high = divisions.len() as isize;
    while high - low > 1 {
        let mid = (high + low) / 2;
        if divisions[mid as usize] <= v {
            low = mid;
        } else {
            high = mid;
        }
    }
    low.max(0) as usize
}
