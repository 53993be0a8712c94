//! Automatic processing: scale transform inference, "nice" tick generation
//! for linear, logarithmic and calendar domains, and the type conversion
//! pass that runs when a dataset is assembled.
use std::rc::Rc;

use crate::field::{Field, Prop};
use crate::stats;
use crate::time::{Date, DateUnit};
use crate::value::{Value, ValueList};

/// The value transform assigned to a numeric field for scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    /// Untransformed values
    Linear,
    /// Square-root transform, for moderately skewed non-negative data
    Root,
    /// Log10 transform, for heavily skewed positive data
    Log,
}

/// A computed scale: domain extremes and tick/bin division points
#[derive(Debug, Clone)]
pub struct NumericScale {
    /// The transform the divisions are spaced for
    pub transform: ScaleKind,
    /// True when this is a calendar scale over day numbers
    pub date: bool,
    /// Domain minimum (after padding and nicing)
    pub min: f64,
    /// Domain maximum (after padding and nicing)
    pub max: f64,
    /// Tick or bin-edge positions, ascending
    pub divisions: Vec<f64>,
    /// True when the divisions came from the data's natural granularity
    pub granular: bool,
}

/// Choose a scale transform for the field from its skew, unless one is
/// already set explicitly
pub fn define_transform(f: &Field) {
    if f.property("transform").is_some() {
        return;
    }
    let kind = match f.num_property("skew") {
        None => ScaleKind::Linear,
        Some(skew) => {
            let min = f.min().unwrap_or(0.0);
            let max = f.max().unwrap_or(0.0);
            if skew > 2.0 && min > 0.0 && max > 75.0 * min {
                ScaleKind::Log
            } else if skew > 1.0 && min >= 0.0 {
                ScaleKind::Root
            } else {
                ScaleKind::Linear
            }
        }
    };
    f.set("transform", Some(Prop::Scale(kind)));
}

/// A good bin count for the field: the larger of the Freedman-Diaconis and
/// Scott reference widths for numeric data, the category count (capped at 7)
/// otherwise
pub fn optimal_bin_count(f: &Field) -> usize {
    if !f.is_numeric() {
        let cats = f.categories().map_or(0, |c| c.len());
        return cats.min(7);
    }
    let valid = f.valid() as f64;
    let cube = valid.powf(1.0 / 3.0);
    let q1 = f.num_property("q1").unwrap_or(0.0);
    let q3 = f.num_property("q3").unwrap_or(0.0);
    let stddev = f.num_property("stddev").unwrap_or(0.0);
    let h1 = 2.0 * (q3 - q1) / cube;
    let h2 = 3.5 * stddev / cube;
    let h = h1.max(h2);
    if h == 0.0 || !h.is_finite() {
        1
    } else {
        let span = f.max().unwrap_or(0.0) - f.min().unwrap_or(0.0);
        (span / h + 0.499).round() as usize
    }
}

/// Build a scale for the field.
///
/// `pad` is the fractional padding below and above the raw extent;
/// `include_zero_tolerance` snaps a bound to zero when doing so adds no more
/// than that fraction of white space; `desired_tick_count` of 0 asks for an
/// automatic count; `for_binning` prefers granularity-aligned divisions so
/// small-integer data bins onto its natural values.
pub fn make_numeric_scale(
    f: &Field,
    nice: bool,
    pad: [f64; 2],
    include_zero_tolerance: f64,
    desired_tick_count: usize,
    for_binning: bool,
) -> NumericScale {
    define_transform(f);

    let desired = if desired_tick_count < 1 {
        optimal_bin_count(f).min(20) + 1
    } else {
        desired_tick_count
    };

    if f.is_date() {
        return date_scale(f, nice, pad, desired);
    }
    let transform = f.scale().unwrap_or(ScaleKind::Linear);
    if transform == ScaleKind::Log {
        return log_scale(f, nice, pad, include_zero_tolerance, desired);
    }

    // A root transform compresses the space near zero, so shrink the lower
    // pad and zero tolerance to avoid showing more space than expected
    let mut pad = pad;
    let mut tolerance = include_zero_tolerance;
    if transform == ScaleKind::Root {
        if let (Some(min), Some(max)) = (f.min(), f.max()) {
            if min > 0.0 {
                let scaling = (min / max) / (min.sqrt() / max.sqrt());
                tolerance *= scaling;
                pad[0] *= scaling;
            }
        }
    }
    linear_scale(f, transform, nice, tolerance, pad, desired, for_binning)
}

fn default_scale(transform: ScaleKind) -> NumericScale {
    NumericScale {
        transform,
        date: false,
        min: 0.0,
        max: 1.0,
        divisions: vec![0.0, 1.0],
        granular: false,
    }
}

fn linear_scale(
    f: &Field,
    transform: ScaleKind,
    nice: bool,
    include_zero_tolerance: f64,
    pad: [f64; 2],
    desired_tick_count: usize,
    for_binning: bool,
) -> NumericScale {
    let (Some(a0), Some(b0)) = (f.min(), f.max()) else {
        return default_scale(transform);
    };

    let mut a = a0 - pad[0] * (b0 - a0);
    let mut b = b0 + pad[1] * (b0 - a0);

    // Include zero if it does not add too much white space
    if a > 0.0 && a / b <= include_zero_tolerance {
        a = 0.0;
    }
    if b < 0.0 && b / a <= include_zero_tolerance {
        b = 0.0;
    }

    // Ranges that are already very nice stay very nice
    if a == 0.0 {
        if b0 <= 1.0 + 1e-4 && b > 1.0 {
            b = 1.0;
        }
        if b0 < 100.0 + 1e-3 && b > 100.0 {
            b = 100.0;
        }
    }

    // Degenerate data expands out around itself
    if a + 1e-6 > b {
        b = (2.0 * a).max(0.0);
        a = (2.0 * a).min(0.0);
    }

    let desired = desired_tick_count as f64;
    let desired_divs = (desired - 1.0).max(1.0);

    // Fields whose values sit on a natural granularity bin onto those values
    // when the resulting count is anywhere close to what was asked for
    if let Some(granularity) = f.num_property("granularity") {
        if granularity > 0.0 && (for_binning || f.prefer_categorical()) {
            let granular_divs = (b - a) / granularity;
            if granular_divs > desired_divs / 2.0 && granular_divs < desired_divs * 2.0 {
                let divisions = granular_divisions(a, b, granularity, nice);
                return NumericScale {
                    transform,
                    date: false,
                    min: a,
                    max: b,
                    divisions,
                    granular: true,
                };
            }
        }
    }

    // A likely step from powers of ten, then the decimal-friendly multiples
    // around it; pick whichever gives a tick count closest to the request,
    // preferring slightly more ticks on a tie
    let raw_delta = (b - a) / desired_divs;
    let mut delta = 10f64.powf(raw_delta.log10().floor());
    let choices = [
        delta,
        delta * 10.0,
        delta / 10.0,
        delta * 5.0,
        delta / 2.0,
        delta * 2.0,
        delta / 5.0,
    ];
    let mut best_diff = 1e9;
    for d in choices {
        let low = d * (a / d).ceil();
        let high = d * (b / d).floor();
        let mut count = ((high - low) / d).round() + 1.0;
        if nice && a < low {
            count += 1.0;
        }
        if nice && b > high {
            count += 1.0;
        }
        let mut diff = (count - desired).abs();
        if count > desired {
            diff -= 0.001;
        }
        if diff < best_diff {
            best_diff = diff;
            delta = d;
        }
    }

    let mut x = delta * (a / delta).floor();
    if nice {
        a = x;
        b = delta * (b / delta).ceil();
    }
    if x < a - 1e-6 {
        x += delta;
    }
    let mut divisions = Vec::new();
    while x < b + 1e-6 {
        divisions.push(x);
        x += delta;
    }

    NumericScale { transform, date: false, min: a, max: b, divisions, granular: false }
}

fn granular_divisions(min: f64, max: f64, granularity: f64, nice: bool) -> Vec<f64> {
    let (mut lo, mut hi) = (min, max);
    if !nice {
        // stay inside the bounds
        lo += granularity;
        hi -= granularity;
    }
    let mut divisions = Vec::new();
    let mut at = lo - granularity / 2.0;
    while at < hi + granularity {
        divisions.push(at);
        at += granularity;
    }
    divisions
}

fn log_scale(
    f: &Field,
    nice: bool,
    pad: [f64; 2],
    include_zero_tolerance: f64,
    desired_tick_count: usize,
) -> NumericScale {
    let (Some(min), Some(max)) = (f.min(), f.max()) else {
        return default_scale(ScaleKind::Log);
    };
    let mut a = min.log10();
    let mut b = max.log10();

    a -= pad[0] * (b - a);
    b += pad[1] * (b - a);

    // Include one (zero in log space) if it does not expand too much
    if a > 0.0 && a / b <= include_zero_tolerance {
        a = 0.0;
    }
    if nice {
        a = a.floor();
        b = b.ceil();
    }

    let desired = desired_tick_count as f64;
    let decades = b - a;
    // too many decades: step by hundreds; too few: add half-decade ticks
    let step = if decades > 2.0 * desired { 2 } else { 1 };
    let half_decades = decades < desired / 2.0;

    let mut divisions = Vec::new();
    let mut i = a.ceil();
    while i <= b + 1e-6 {
        divisions.push(10f64.powf(i));
        if half_decades && i + 0.5 <= b + 1e-6 {
            divisions.push(10f64.powf(i + 0.5));
        }
        i += step as f64;
    }

    NumericScale {
        transform: ScaleKind::Log,
        date: false,
        min: 10f64.powf(a),
        max: 10f64.powf(b),
        divisions,
        granular: false,
    }
}

fn date_scale(f: &Field, nice: bool, pad: [f64; 2], desired_tick_count: usize) -> NumericScale {
    let (Some(mut a), Some(mut b)) = (f.min(), f.max()) else {
        return default_scale(ScaleKind::Linear);
    };

    if a == b {
        // degenerate range: step out one unit each way
        let unit = f.date_unit().unwrap_or(DateUnit::Day);
        if let Some(d) = Date::from_days(a) {
            a = unit.increment(d, -1).days();
            b = unit.increment(d, 1).days();
        }
    } else {
        let span = b - a;
        a -= pad[0] * span;
        b += pad[1] * span;
    }

    let desired_gap = (b - a) / (desired_tick_count.max(2) - 1) as f64;
    let unit = stats::date_unit_for_span(desired_gap * 4.0);
    let multiple = best_date_multiple(unit, desired_gap);

    let start = Date::from_days(a).unwrap_or(Date::from_days(0.0).unwrap());
    let mut x = unit.floor(start, multiple);
    if nice {
        a = x.days();
    }

    let mut divisions = Vec::new();
    loop {
        let v = x.days();
        if v >= b {
            // the end of the range; take it as a division when nicing
            if nice || v == b {
                b = v;
                divisions.push(v);
            }
            break;
        }
        if v >= a {
            divisions.push(v);
        }
        x = unit.increment(x, multiple as i32);
    }

    NumericScale {
        transform: ScaleKind::Linear,
        date: true,
        min: a,
        max: b,
        divisions,
        granular: false,
    }
}

// The divisor of the unit's base closest to the ideal spacing. Multiples of
// 4 read badly, as do multiples of 6 on base-60 units.
fn best_date_multiple(unit: DateUnit, desired_days_gap: f64) -> u32 {
    let target = desired_days_gap / unit.approx_days();
    let base = unit.base();
    let mut multiple = 1;
    for i in 2..=base / 2 {
        if base % i != 0 || i == 4 || (i == 6 && base == 60) {
            continue;
        }
        if (target - i as f64).abs() <= (target - multiple as f64).abs() {
            multiple = i;
        }
    }
    multiple
}

/// Convert a raw field to its best representation: a list field when the
/// text splits into variable-length lists, numeric when most values read as
/// numbers (with plausible year columns becoming dates), a date field when
/// most values parse as dates, otherwise unchanged.
///
/// Values are sampled in row order (up to 50 valid values) so conversion is
/// deterministic.
pub fn convert(base: Field) -> Field {
    if base.is_synthetic() || base.is_date() || base.is_list() {
        return base;
    }

    if !base.is_numeric() {
        let as_list = to_list(&base);
        if good_lists(&as_list) {
            return as_list;
        }
    }

    let sample_numeric = sample_fraction(&base, |v| {
        !matches!(v, Value::Date(_)) && v.as_num().is_some()
    });
    if base.is_numeric() || sample_numeric > 0.5 {
        let as_numeric = if base.is_numeric() { base } else { to_numeric(&base) };
        if is_yearly(&as_numeric) {
            return to_date_years(&as_numeric);
        }
        return as_numeric;
    }

    let sample_date = sample_fraction(&base, |v| date_value(v).is_some());
    if sample_date > 0.5 {
        return to_date(&base);
    }

    base
}

fn sample_fraction(f: &Field, test: impl Fn(&Value) -> bool) -> f64 {
    let mut sampled = 0;
    let mut hits = 0;
    for i in 0..f.row_count() {
        if sampled >= 50 {
            break;
        }
        let Some(v) = f.value(i) else { continue };
        sampled += 1;
        if test(&v) {
            hits += 1;
        }
    }
    if sampled == 0 { 0.0 } else { hits as f64 / sampled as f64 }
}

fn date_value(v: &Value) -> Option<Date> {
    match v {
        Value::Date(d) => Some(*d),
        Value::Str(s) => Date::parse(s),
        Value::Num(n) => Date::from_days(*n),
        _ => None,
    }
}

/// Reread every value as a number, keeping name and label
pub fn to_numeric(f: &Field) -> Field {
    if f.is_numeric() {
        return f.clone();
    }
    let data = (0..f.row_count())
        .map(|i| f.value(i).and_then(|v| v.as_num()).map(Value::Num))
        .collect();
    let result = Field::column(f.name(), Some(f.label()), data);
    result.set_numeric();
    result
}

/// Reread every value as a date, keeping name and label
pub fn to_date(f: &Field) -> Field {
    if f.is_date() {
        return f.clone();
    }
    let data = (0..f.row_count())
        .map(|i| f.value(i).and_then(|v| date_value(&v)).map(Value::Date))
        .collect();
    make_date_field(f, data)
}

/// Read integral values as calendar years
pub fn to_date_years(f: &Field) -> Field {
    let data = (0..f.row_count())
        .map(|i| {
            let v = f.value(i)?.as_num()?;
            if v > 0.0 && v.fract() == 0.0 {
                Date::from_ymd(v as i32, 1, 1).map(Value::Date)
            } else {
                None
            }
        })
        .collect();
    make_date_field(f, data)
}

fn make_date_field(f: &Field, data: Vec<Option<Value>>) -> Field {
    let result = Field::column(f.name(), Some(f.label()), data);
    result.set("date", Some(Prop::Bool(true)));
    result.set_numeric();
    result
}

// Plausible year columns: quartiles inside 1600-2100 and integral spacing
fn is_yearly(f: &Field) -> bool {
    let Some(q1) = f.num_property("q1") else { return false };
    let Some(q3) = f.num_property("q3") else { return false };
    if q1 < 1600.0 || q3 > 2100.0 {
        return false;
    }
    match f.num_property("granularity") {
        Some(g) => g - g.floor() < 1e-6,
        None => false,
    }
}

/// Split each value's text into a list on the best of the separators
/// `,` `;` `|` (the one appearing in the most categories)
pub fn to_list(base: &Field) -> Field {
    let categories = base.categories().unwrap_or_default();
    let mut sep = ',';
    let mut best = -1i64;
    for candidate in [',', ';', '|'] {
        let count = categories
            .iter()
            .filter(|c| c.to_string().contains(candidate))
            .count() as i64;
        if count > best {
            sep = candidate;
            best = count;
        }
    }

    let n = base.row_count();
    let mut items: Vec<Option<Value>> = Vec::with_capacity(n);
    let mut parts = stats::ValueCounts::new();
    for i in 0..n {
        match base.value(i) {
            None => items.push(None),
            Some(v) => {
                let pieces: Vec<Value> = v
                    .to_string()
                    .split(sep)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Value::str)
                    .collect();
                for p in &pieces {
                    parts.increment(p.clone());
                }
                items.push(Some(Value::List(Rc::new(ValueList::new(pieces, None)))));
            }
        }
    }

    let f = Field::column(base.name(), Some(base.label()), items);
    f.set("list", Some(Prop::Bool(true)));
    f.set(
        "list_categories",
        Some(Prop::Categories(Rc::new(parts.sorted_keys()))),
    );
    f
}

// Lists are convincing when there are at least a few of them and their
// lengths vary; for larger data the item vocabulary must also be small
// compared to the row count
fn good_lists(f: &Field) -> bool {
    let n_valid = f.valid();
    if n_valid < 3 {
        return false;
    }
    let mut first_len: Option<usize> = None;
    for i in 0..f.row_count() {
        let Some(v) = f.value(i) else { continue };
        let Some(list) = v.as_list().map(|l| l.len()) else { continue };
        match first_len {
            None => first_len = Some(list),
            Some(len) if list != len => {
                if n_valid < 20 {
                    return true;
                }
                let n_list = match f.property("list_categories") {
                    Some(Prop::Categories(c)) => c.len(),
                    _ => 0,
                };
                return n_list * n_list < n_valid * 2;
            }
            Some(_) => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{Near, assert_near};

    fn num_field(values: &[f64]) -> Field {
        let f = Field::column(
            "a",
            None,
            values.iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        f.set_numeric();
        f
    }

    fn str_field(values: &[&str]) -> Field {
        Field::column("a", None, values.iter().map(|s| Some(Value::str(s))).collect())
    }

    #[test]
    fn test_choose_transform() {
        let a = num_field(&[100.0, 200.0, 300.0, 400.0, 500.0, 600.0]);
        define_transform(&a);
        assert_eq!(a.scale(), Some(ScaleKind::Linear));

        let b = str_field(&["a", "b", "c"]);
        define_transform(&b);
        assert_eq!(b.scale(), Some(ScaleKind::Linear));

        let d = num_field(&[1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 5.0, 10.0]);
        define_transform(&d);
        assert_eq!(d.scale(), Some(ScaleKind::Root));

        let e = num_field(&[
            1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 5.0, 10.0, 100.0, 1000.0,
        ]);
        define_transform(&e);
        assert_eq!(e.scale(), Some(ScaleKind::Log));

        let g = num_field(&[
            -1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 5.0, 10.0, 100.0, 1000.0,
        ]);
        define_transform(&g);
        assert_eq!(g.scale(), Some(ScaleKind::Linear));
    }

    #[test]
    fn test_transform_not_overwritten() {
        let f = num_field(&[1.0, 2.0]);
        f.set("transform", Some(Prop::Scale(ScaleKind::Log)));
        define_transform(&f);
        assert_eq!(f.scale(), Some(ScaleKind::Log));
    }

    #[test]
    fn test_linear_ticks_nice() {
        let f = num_field(&[0.0, 97.0]);
        let scale = make_numeric_scale(&f, true, [0.0, 0.0], 0.0, 6, false);
        assert_near!(scale.min, 0.0);
        assert_near!(scale.max, 100.0);
        assert_eq!(scale.divisions.len(), 6);
        for (i, d) in scale.divisions.iter().enumerate() {
            assert_near!(*d, 20.0 * i as f64);
        }
    }

    #[test]
    fn test_linear_degenerate() {
        let f = num_field(&[5.0, 5.0]);
        let scale = make_numeric_scale(&f, true, [0.0, 0.0], 0.0, 5, false);
        assert!(scale.min <= 5.0 && scale.max >= 5.0);
        assert!(!scale.divisions.is_empty());
    }

    #[test]
    fn test_granular_divisions_for_binning() {
        let f = num_field(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let scale = make_numeric_scale(&f, true, [0.0, 0.0], 0.0, 8, true);
        assert!(scale.granular);
        // bin edges at half-integers bracketing the data
        assert_near!(scale.divisions[0], 0.5);
        assert_near!(scale.divisions[1], 1.5);
        assert_eq!(scale.divisions.len(), 6);
    }

    #[test]
    fn test_log_ticks() {
        let f = num_field(&[1.0, 10000.0]);
        f.set("transform", Some(Prop::Scale(ScaleKind::Log)));
        let scale = make_numeric_scale(&f, true, [0.0, 0.0], 0.0, 5, false);
        assert_eq!(scale.divisions.len(), 5);
        assert_near!(scale.divisions[0], 1.0);
        assert_near!(scale.divisions[4], 10000.0);
    }

    #[test]
    fn test_date_ticks_years() {
        let days: Vec<f64> = ["2010-01-01", "2014-01-01"]
            .iter()
            .map(|s| Date::parse(s).unwrap().days())
            .collect();
        let f = num_field(&days);
        f.set("date", Some(Prop::Bool(true)));
        let scale = make_numeric_scale(&f, true, [0.0, 0.0], 0.0, 5, false);
        assert!(scale.date);
        assert_eq!(scale.divisions.len(), 5);
        for (i, d) in scale.divisions.iter().enumerate() {
            let expected = Date::from_ymd(2010 + i as i32, 1, 1).unwrap().days();
            assert_near!(*d, expected);
        }
    }

    #[test]
    fn test_convert_numeric_strings() {
        let f = str_field(&["1", "2", "3", "4"]);
        let c = convert(f);
        assert!(c.is_numeric());
        assert!(!c.is_date());
        assert_near!(c.num_property("mean").unwrap(), 2.5);

        let f = str_field(&["a", "2", "c", "4"]);
        let c = convert(f);
        assert!(!c.is_numeric());
    }

    #[test]
    fn test_convert_years_to_dates() {
        let f = num_field(&[1970.0, 1972.0, 1978.0]);
        let c = convert(f);
        assert!(c.is_numeric());
        assert!(c.is_date());
        assert_near!(c.max().unwrap() - c.min().unwrap(), (8 * 365 + 2) as f64);
    }

    #[test]
    fn test_convert_date_strings() {
        let f = str_field(&["1971-01-03", "1971-01-12"]);
        let c = convert(f);
        assert!(c.is_date());
        assert_near!(c.max().unwrap() - c.min().unwrap(), 9.0);
    }

    #[test]
    fn test_convert_lists() {
        let f = str_field(&["a,b,c", "c,a", "a ,e", ""]);
        let c = convert(f);
        assert!(c.is_list());
        let first = c.value(0).unwrap();
        let list = first.as_list().unwrap();
        assert_eq!(list.len(), 3);
        let third = c.value(2).unwrap();
        assert_eq!(third.as_list().unwrap().items()[1], Value::str("e"));
    }
}
