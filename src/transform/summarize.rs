//! Aggregation into one row per group of dimension values.
//!
//! Commands are `out=in` pairs: a bare field is a dimension, `in:base` a
//! dimension that also serves as the percent denominator grouping, and
//! `in:func[:option]` a measure. Groups are formed by sorted comparison of
//! the dimension values, so the output rows come out in sorted group order.
use std::cmp::Ordering;
use std::rc::Rc;

use crate::Error;
use crate::auto;
use crate::dataset::Dataset;
use crate::field::{Field, Prop};
use crate::transform::{self, RowComparator};
use crate::value::{Range, Value, ValueList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agg {
    Count,
    Sum,
    Mean,
    Mode,
    Median,
    Q1,
    Q3,
    Range,
    Iqr,
    Variance,
    Stddev,
    Skew,
    Kurtosis,
    Valid,
    Unique,
    List,
    Percent,
    Fit,
    Smooth,
}

impl Agg {
    fn parse(text: &str) -> Result<Agg, Error> {
        Ok(match text {
            "count" => Agg::Count,
            "sum" => Agg::Sum,
            "mean" => Agg::Mean,
            "mode" => Agg::Mode,
            "median" => Agg::Median,
            "q1" => Agg::Q1,
            "q3" => Agg::Q3,
            "range" => Agg::Range,
            "iqr" => Agg::Iqr,
            "variance" => Agg::Variance,
            "stddev" => Agg::Stddev,
            "skew" => Agg::Skew,
            "kurtosis" => Agg::Kurtosis,
            "valid" => Agg::Valid,
            "unique" => Agg::Unique,
            "list" => Agg::List,
            "percent" => Agg::Percent,
            "fit" => Agg::Fit,
            "smooth" => Agg::Smooth,
            other => {
                return Err(Error::BadCommand(format!("unknown aggregator '{other}'")));
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            Agg::Count => "count",
            Agg::Sum => "sum",
            Agg::Mean => "mean",
            Agg::Mode => "mode",
            Agg::Median => "median",
            Agg::Q1 => "q1",
            Agg::Q3 => "q3",
            Agg::Range => "range",
            Agg::Iqr => "iqr",
            Agg::Variance => "variance",
            Agg::Stddev => "stddev",
            Agg::Skew => "skew",
            Agg::Kurtosis => "kurtosis",
            Agg::Valid => "valid",
            Agg::Unique => "unique",
            Agg::List => "list",
            Agg::Percent => "percent",
            Agg::Fit => "fit",
            Agg::Smooth => "smooth",
        }
    }
}

#[derive(Debug)]
struct Dimension {
    field: Rc<Field>,
    rename: String,
}

#[derive(Debug)]
struct Measure {
    field: Rc<Field>,
    rename: String,
    agg: Agg,
    option: Option<String>,
}

/// Apply a summarize command; identity on an empty dataset
pub fn apply(base: &Dataset, command: &str) -> Result<Dataset, Error> {
    if base.row_count() == 0 {
        return Ok(base.clone());
    }
    let parts = transform::clauses(command);
    if parts.is_empty() {
        return Ok(base.clone());
    }

    let mut dimensions: Vec<Dimension> = Vec::new();
    let mut measures: Vec<Measure> = Vec::new();
    let mut percent_base: Vec<Rc<Field>> = Vec::new();
    let mut has_count = false;
    let mut has_row = false;

    for part in parts {
        let (out, op) = part
            .split_once('=')
            .ok_or_else(|| Error::BadCommand(format!("expected 'out=in' in '{part}'")))?;
        let out = out.trim();
        if out == "#count" {
            has_count = true;
        }
        if out == "#row" {
            has_row = true;
        }

        let mut pieces = op.trim().splitn(3, ':');
        let in_name = pieces.next().unwrap_or("").trim();
        let func = pieces.next().map(str::trim);
        let option = pieces.next().map(|o| o.trim().to_string());

        // a measure with no source field counts rows
        let field = if in_name.is_empty() {
            base.field_required("#count")?
        } else {
            base.field_required(in_name)?
        };
        match func {
            None => dimensions.push(Dimension { field, rename: out.to_string() }),
            Some("base") => {
                percent_base.push(field.clone());
                dimensions.push(Dimension { field, rename: out.to_string() });
            }
            Some(func) => {
                let mut agg = Agg::parse(func)?;
                // the mean of a non-numeric field is read as its mode
                if agg == Agg::Mean && !field.is_numeric() {
                    agg = Agg::Mode;
                }
                measures.push(Measure { field, rename: out.to_string(), agg, option });
            }
        }
    }

    dimensions.sort_by(|a, b| a.rename.cmp(&b.rename));
    measures.sort_by(|a, b| a.rename.cmp(&b.rename));

    // the row count and original row list always ride along
    if !has_count {
        let field = base.field_required("#count")?;
        measures.push(Measure { field, rename: "#count".to_string(), agg: Agg::Sum, option: None });
    }
    if !has_row {
        let field = base.field_required("#row")?;
        measures.push(Measure { field, rename: "#row".to_string(), agg: Agg::List, option: None });
    }

    let result = summarize(base, &dimensions, &measures, &percent_base)?;
    result.set("summarized", Some(Prop::Bool(true)));
    Ok(result)
}

fn summarize(
    base: &Dataset,
    dimensions: &[Dimension],
    measures: &[Measure],
    percent_base: &[Rc<Field>],
) -> Result<Dataset, Error> {
    let n = base.row_count();
    let dim_fields: Vec<Rc<Field>> = dimensions.iter().map(|d| d.field.clone()).collect();
    let percent_needed = measures.iter().any(|m| m.agg == Agg::Percent);

    let (group_of, group_count) =
        make_groups(n, &RowComparator::new(dim_fields, None, false));
    log::debug!("summarize: {} rows into {} groups", n, group_count);

    let mut group_rows: Vec<Vec<usize>> = vec![Vec::new(); group_count];
    for (row, &g) in group_of.iter().enumerate() {
        group_rows[g].push(row);
    }

    // Percent groups nest around the summary groups: all rows of a summary
    // group share one percent group, so sums accumulate per base group
    let mut percent_sums: Vec<Vec<f64>> = Vec::new();
    let mut percent_of: Vec<usize> = Vec::new();
    if percent_needed {
        let (of, count) =
            make_groups(n, &RowComparator::new(percent_base.to_vec(), None, false));
        percent_sums = vec![vec![0.0; measures.len()]; count];
        for row in 0..n {
            for (mi, m) in measures.iter().enumerate() {
                if m.agg == Agg::Percent {
                    if let Some(v) = m.field.value(row).and_then(|v| v.as_num()) {
                        percent_sums[of[row]][mi] += v;
                    }
                }
            }
        }
        percent_of = of;
    }

    // One fitted model per fit/smooth measure, built on first use and
    // evaluated for every group
    let mut models: Vec<Option<FitModel>> = measures.iter().map(|_| None).collect();
    let x_field = dimensions.last().map(|d| d.field.clone());

    let mut dim_data: Vec<Vec<Option<Value>>> =
        dimensions.iter().map(|_| Vec::with_capacity(group_count)).collect();
    let mut measure_data: Vec<Vec<Option<Value>>> =
        measures.iter().map(|_| Vec::with_capacity(group_count)).collect();

    for rows in &group_rows {
        let first = rows[0];
        for (i, d) in dimensions.iter().enumerate() {
            dim_data[i].push(d.field.value(first));
        }
        for (mi, m) in measures.iter().enumerate() {
            let percent_sum = if m.agg == Agg::Percent && !percent_of.is_empty() {
                percent_sums[percent_of[first]][mi]
            } else {
                0.0
            };
            let v = aggregate(m, rows, x_field.as_ref(), &mut models[mi], percent_sum)?;
            measure_data[mi].push(v);
        }
    }

    let mut fields = Vec::with_capacity(dimensions.len() + measures.len());
    for (i, d) in dimensions.iter().enumerate() {
        let f = Field::column(&d.rename, Some(d.field.label()), std::mem::take(&mut dim_data[i]));
        f.copy_base_properties(&d.field);
        fields.push(Rc::new(f));
    }
    for (mi, m) in measures.iter().enumerate() {
        let f = Field::column(&m.rename, Some(&measure_label(m)), std::mem::take(&mut measure_data[mi]));
        match m.agg {
            Agg::List => {}
            Agg::Count | Agg::Percent | Agg::Valid | Agg::Unique => f.set_numeric(),
            _ => f.copy_base_properties(&m.field),
        }
        f.set("summary", Some(Prop::Str(Rc::from(m.agg.name()))));
        f.set("original_label", Some(Prop::Str(Rc::from(m.field.label()))));
        fields.push(Rc::new(f));
    }
    Ok(base.replace_fields(fields))
}

// Group ids are assigned walking the rows in sorted dimension order, so
// group 0 is the first group in that order
fn make_groups(n: usize, comparison: &RowComparator) -> (Vec<usize>, usize) {
    let order = comparison.sorted_order(n);
    let mut group = vec![0usize; n];
    let mut current = 0;
    for i in 0..order.len() {
        if i > 0 && comparison.compare(order[i], order[i - 1]) != Ordering::Equal {
            current += 1;
        }
        group[order[i]] = current;
    }
    (group, if n == 0 { 0 } else { current + 1 })
}

fn aggregate(
    m: &Measure,
    rows: &[usize],
    x_field: Option<&Rc<Field>>,
    model: &mut Option<FitModel>,
    percent_sum: f64,
) -> Result<Option<Value>, Error> {
    match m.agg {
        Agg::Count => return Ok(Some(Value::Num(rows.len() as f64))),
        Agg::Fit | Agg::Smooth => {
            let Some(x) = x_field else { return Ok(None) };
            if model.is_none() {
                *model = Some(match m.agg {
                    Agg::Fit => FitModel::regression(&m.field, x),
                    _ => FitModel::smooth(&m.field, x, m.option.as_deref())?,
                });
            }
            let at = x.value(rows[0]).and_then(|v| v.as_num());
            return Ok(model.as_ref().and_then(|f| f.eval(at)).map(Value::Num));
        }
        _ => {}
    }

    // Everything else reads statistics off a temporary field over the
    // group's values
    let data: Vec<Option<Value>> = rows.iter().map(|&r| m.field.value(r)).collect();
    let temp = Field::column("temp", None, data);
    let date_format = if m.field.is_date() { m.field.date_format() } else { None };

    let num = |key| temp.num_property(key).map(Value::Num);
    Ok(match m.agg {
        Agg::Sum => {
            let mean = temp.num_property("mean");
            mean.map(|mean| Value::Num(mean * temp.valid() as f64))
        }
        Agg::Percent => match temp.num_property("mean") {
            None => None,
            Some(mean) => {
                let denominator = if m.option.as_deref() == Some("overall") {
                    m.field.num_property("mean").unwrap_or(0.0) * m.field.valid() as f64
                } else {
                    percent_sum
                };
                (denominator > 0.0)
                    .then(|| Value::Num(100.0 * mean * temp.valid() as f64 / denominator))
            }
        },
        Agg::Range => make_range(&temp, "min", "max", date_format),
        Agg::Iqr => make_range(&temp, "q1", "q3", date_format),
        Agg::List => {
            let items = temp.categories().map_or(Vec::new(), |c| c.to_vec());
            let mut list = ValueList::new(items, date_format);
            if let Some(option) = &m.option {
                let count = option.parse::<usize>().map_err(|_| {
                    Error::BadCommand(format!("bad list display count '{option}'"))
                })?;
                list = list.with_display_count(count);
            }
            Some(Value::List(Rc::new(list)))
        }
        Agg::Mode => match temp.property("mode") {
            Some(Prop::Val(v)) => Some(v),
            _ => None,
        },
        Agg::Mean => num("mean"),
        Agg::Median => num("median"),
        Agg::Q1 => num("q1"),
        Agg::Q3 => num("q3"),
        Agg::Variance => num("variance"),
        Agg::Stddev => num("stddev"),
        Agg::Skew => num("skew"),
        Agg::Kurtosis => num("kurtosis"),
        Agg::Valid => num("valid"),
        Agg::Unique => num("unique"),
        Agg::Count | Agg::Fit | Agg::Smooth => unreachable!(),
    })
}

fn make_range(temp: &Field, low: &'static str, high: &'static str, fmt: Option<crate::time::DateFormat>) -> Option<Value> {
    temp.num_property("mean")?;
    let low = temp.num_property(low)?;
    let high = temp.num_property(high)?;
    Some(Value::Range(Rc::new(Range::summary(low, high, fmt))))
}

fn measure_label(m: &Measure) -> String {
    if m.agg == Agg::Sum && m.field.name() == "#count" {
        return m.field.label().to_string();
    }
    if m.agg == Agg::Percent && m.field.name() == "#count" {
        return "Percent".to_string();
    }
    let name = m.agg.name();
    let mut label = String::with_capacity(name.len() + m.field.label().len() + 2);
    label.extend(name.chars().next().map(|c| c.to_ascii_uppercase()));
    label.push_str(&name[1..]);
    label.push('(');
    label.push_str(m.field.label());
    label.push(')');
    label
}

/// Fitted models shared across the groups of one measure: a least-squares
/// line, or a local quadratic-kernel smoother over a fixed window
#[derive(Debug)]
enum FitModel {
    Regression { slope: Option<f64>, intercept: f64 },
    Smooth { window: f64, x: Vec<f64>, y: Vec<f64> },
}

impl FitModel {
    fn regression(y: &Field, x: &Field) -> FitModel {
        let (xs, ys) = pairs(y, x);
        let n = xs.len();
        if n == 0 {
            return FitModel::Regression { slope: None, intercept: 0.0 };
        }
        let mx = xs.iter().sum::<f64>() / n as f64;
        let my = ys.iter().sum::<f64>() / n as f64;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for i in 0..n {
            sxy += (xs[i] - mx) * (ys[i] - my);
            sxx += (xs[i] - mx) * (xs[i] - mx);
        }
        if sxx > 0.0 {
            let slope = sxy / sxx;
            FitModel::Regression { slope: Some(slope), intercept: my - slope * mx }
        } else {
            FitModel::Regression { slope: None, intercept: 0.0 }
        }
    }

    fn smooth(y: &Field, x: &Field, window_percent: Option<&str>) -> Result<FitModel, Error> {
        let extent = x.max().unwrap_or(0.0) - x.min().unwrap_or(0.0);
        let window = match window_percent {
            Some(p) => {
                let p: f64 = p.parse().map_err(|_| {
                    Error::BadCommand(format!("bad smooth window percent '{p}'"))
                })?;
                extent * p / 200.0
            }
            None => extent / auto::optimal_bin_count(x).max(1) as f64,
        };
        let (xs, ys) = pairs(y, x);
        Ok(FitModel::Smooth { window, x: xs, y: ys })
    }

    fn eval(&self, at: Option<f64>) -> Option<f64> {
        let at = at?;
        match self {
            FitModel::Regression { slope, intercept } => slope.map(|m| m * at + intercept),
            FitModel::Smooth { window, x, y } => {
                if x.is_empty() || *window <= 0.0 {
                    return None;
                }
                let low = search(at - window, x);
                let high = search(at + window, x);
                let mut sy = 0.0;
                let mut sw = 0.0;
                for i in low..=high {
                    let d = (x[i] - at) / window;
                    let w = 0.75 * (1.0 - d * d);
                    sw += w;
                    sy += w * y[i];
                }
                (sw > 0.0).then(|| sy / sw)
            }
        }
    }
}

// Valid numeric (x, y) pairs over the whole field, sorted by x
fn pairs(y: &Field, x: &Field) -> (Vec<f64>, Vec<f64>) {
    let mut both: Vec<(f64, f64)> = Vec::new();
    for i in 0..x.row_count() {
        let (Some(xv), Some(yv)) = (
            x.value(i).and_then(|v| v.as_num()),
            y.value(i).and_then(|v| v.as_num()),
        ) else {
            continue;
        };
        both.push((xv, yv));
    }
    both.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    both.into_iter().unzip()
}

// Index near `at` in sorted data: binary search, then centered on the run
// of equal values
fn search(at: f64, x: &[f64]) -> usize {
    let mut p = 0;
    let mut q = x.len() - 1;
    while q - p > 1 {
        let t = (p + q) / 2;
        if x[t] <= at {
            p = t;
        }
        if x[t] >= at {
            q = t;
        }
    }
    while p > 0 && x[p - 1] == at {
        p -= 1;
    }
    while q < x.len() - 1 && x[q + 1] == at {
        q += 1;
    }
    (p + q) / 2
}
