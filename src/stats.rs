//! The three statistics passes behind a field's lazy properties.
//!
//! Order matters: nominal statistics run before numeric (so validity counts
//! agree), and date statistics need the numeric pass because dates are day
//! numbers underneath. [`Field::property`](crate::Field::property) enforces
//! that cascade; the code here only computes.
use std::collections::HashMap;
use std::rc::Rc;

use crate::field::{Field, Prop, VAL_SELECTED, VAL_UNSELECTED};
use crate::time::{DateFormat, DateUnit};
use crate::value::{self, Value};

/// True when the key belongs to the nominal statistics group
pub fn nominal_creates(key: &str) -> bool {
    matches!(
        key,
        "n" | "unique" | "valid" | "mode" | "categories" | "category_counts"
    )
}

/// True when the key belongs to the numeric statistics group
pub fn numeric_creates(key: &str) -> bool {
    matches!(
        key,
        "valid_numeric"
            | "mean"
            | "stddev"
            | "variance"
            | "skew"
            | "kurtosis"
            | "min"
            | "max"
            | "median"
            | "q1"
            | "q3"
            | "granularity"
    )
}

/// True when the key belongs to the date statistics group
pub fn date_creates(key: &str) -> bool {
    matches!(key, "date_unit" | "date_format")
}

/// Counts distinct values, remembering totals and the maximum count
#[derive(Debug, Default)]
pub struct ValueCounts {
    map: HashMap<Value, usize>,
    total: usize,
    max: usize,
}

impl ValueCounts {
    /// An empty counter
    pub fn new() -> ValueCounts {
        ValueCounts::default()
    }

    /// Count one occurrence
    pub fn increment(&mut self, v: Value) {
        let count = self.map.entry(v).or_insert(0);
        *count += 1;
        self.max = self.max.max(*count);
        self.total += 1;
    }

    /// Occurrences of a value
    pub fn get(&self, v: &Value) -> usize {
        self.map.get(v).copied().unwrap_or(0)
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing was counted
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total occurrences counted
    pub fn total(&self) -> usize {
        self.total
    }

    /// The most frequent value; ties go to the smallest value
    pub fn mode(&self) -> Option<Value> {
        let mut best: Option<&Value> = None;
        for (v, count) in &self.map {
            if *count == self.max {
                match best {
                    Some(b) if value::compare(Some(b), Some(v)).is_le() => {}
                    _ => best = Some(v),
                }
            }
        }
        best.cloned()
    }

    /// All distinct values, ascending
    pub fn sorted_keys(&self) -> Vec<Value> {
        let mut keys: Vec<Value> = self.map.keys().cloned().collect();
        value::sort(&mut keys);
        keys
    }
}

/// Compute counts, mode and category order for a field
pub fn populate_nominal(f: &Field) {
    let n = f.row_count();
    let mut counts = ValueCounts::new();
    for i in 0..n {
        if let Some(v) = f.value(i) {
            counts.increment(v);
        }
    }

    f.set("n", Some(Prop::Num(n as f64)));
    f.set("unique", Some(Prop::Num(counts.len() as f64)));
    f.set("valid", Some(Prop::Num(counts.total() as f64)));
    if let Some(mode) = counts.mode() {
        f.set("mode", Some(Prop::Val(mode)));
    }

    let natural: Rc<Vec<Value>> = if f.flag("categories_ordered") {
        // an explicit order was declared; keep it
        f.categories().unwrap_or_default()
    } else if f.name() == "#selection" {
        let cats = vec![Value::str(VAL_UNSELECTED), Value::str(VAL_SELECTED)];
        let cats = Rc::new(cats);
        f.set("categories", Some(Prop::Categories(cats.clone())));
        cats
    } else {
        let cats = Rc::new(counts.sorted_keys());
        f.set("categories", Some(Prop::Categories(cats.clone())));
        cats
    };

    let aligned: Vec<usize> = natural.iter().map(|c| counts.get(c)).collect();
    f.set("category_counts", Some(Prop::Counts(Rc::new(aligned))));
}

/// Compute moments, order statistics and granularity for a field.
/// A range-valued cell contributes both of its endpoints.
pub fn populate_numeric(f: &Field) {
    let rows = f.row_count();
    let mut data: Vec<f64> = Vec::new();
    for i in 0..rows {
        match f.value(i) {
            Some(Value::Range(r)) => {
                data.push(r.low);
                data.push(r.high);
            }
            Some(v) => {
                if let Some(d) = v.as_num() {
                    data.push(d);
                }
            }
            None => {}
        }
    }

    let n = data.len();
    f.set("valid_numeric", Some(Prop::Num(n as f64)));
    if n == 0 {
        return;
    }

    let m1 = moment(&data, 0.0, 1, n as f64);
    let m2 = moment(&data, m1, 2, n as f64 - 1.0);
    let m3 = moment(&data, m1, 3, n as f64 - 1.0);
    let m4 = moment(&data, m1, 4, n as f64 - 1.0);
    f.set("mean", Some(Prop::Num(m1)));
    f.set("stddev", Some(Prop::Num(m2.sqrt())));
    f.set("variance", Some(Prop::Num(m2)));
    f.set("skew", Some(Prop::Num(m3 / m2 / m2.sqrt())));
    f.set("kurtosis", Some(Prop::Num(m4 / m2 / m2 - 3.0)));

    data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let min = data[0];
    let max = data[n - 1];
    f.set("min", Some(Prop::Num(min)));
    f.set("max", Some(Prop::Num(max)));

    // Order statistics, Tukey hinge style. The parity split is deliberate:
    // for even n the median belongs to both halves, for odd n to neither.
    f.set("median", Some(Prop::Num(av(&data, (n - 1) as f64 * 0.5))));
    if n % 2 == 0 {
        let half = n / 2;
        f.set("q1", Some(Prop::Num(av(&data, (half - 1) as f64 * 0.5))));
        f.set(
            "q3",
            Some(Prop::Num(av(&data, half as f64 + (half - 1) as f64 * 0.5))),
        );
    } else {
        f.set("q1", Some(Prop::Num(av(&data, (n - 1) as f64 * 0.25))));
        f.set(
            "q3",
            Some(Prop::Num(av(&data, ((n - 1) / 2) as f64 + (n - 1) as f64 * 0.25))),
        );
    }

    // Granularity: smallest positive gap between distinct sorted values,
    // falling back to |max| when all values coincide
    let mut gran = max - min;
    if gran == 0.0 {
        gran = max.abs();
    }
    for pair in data.windows(2) {
        let d = pair[1] - pair[0];
        if d > 0.0 && d < gran {
            gran = d;
        }
    }
    f.set("granularity", Some(Prop::Num(gran)));
}

fn moment(data: &[f64], center: f64, power: i32, weight: f64) -> f64 {
    if weight <= 0.0 {
        return f64::NAN;
    }
    let sum: f64 = data.iter().map(|d| (d - center).powi(power)).sum();
    sum / weight
}

fn av(v: &[f64], index: f64) -> f64 {
    (v[index.floor() as usize] + v[index.ceil() as usize]) / 2.0
}

/// Choose the calendar unit and display format for a date field
pub fn populate_date(f: &Field) {
    let (Some(min), Some(max)) = (f.min(), f.max()) else {
        return;
    };

    // Degenerate ranges choose units as if the span ran from zero
    let mut days = max - min;
    if days == 0.0 {
        days = max;
    }
    let unit = date_unit_for_span(days);
    f.set("date_unit", Some(Prop::Unit(unit)));

    // With little data, coarsen the granularity before picking a format
    let gran = f.num_property("granularity").unwrap_or(0.0);
    let factor = ((f.valid() as f64).sqrt() / 7.0).min(1.0);
    f.set(
        "date_format",
        Some(Prop::Format(date_format_for(unit, gran * factor))),
    );
}

/// The calendar unit whose multiples best cover a span of days
pub fn date_unit_for_span(days: f64) -> DateUnit {
    for unit in DateUnit::ALL {
        if days > 3.5 * unit.approx_days() {
            return unit;
        }
        // days are particularly nice; prefer a few day ticks over many hours
        if unit == DateUnit::Day && days >= 2.5 * unit.approx_days() {
            return unit;
        }
    }
    DateUnit::Second
}

/// The display format for dates with the given day-granularity
pub fn date_format_for(unit: DateUnit, granularity: f64) -> DateFormat {
    if granularity > 360.0 {
        return DateFormat::Year;
    }
    if granularity > 13.0 {
        return DateFormat::YearMonth;
    }
    if granularity > 0.9 {
        return DateFormat::YearMonthDay;
    }
    // time matters; do the days matter too?
    if unit.coarser_than(DateUnit::Hour) {
        return DateFormat::DayHour;
    }
    if granularity > 0.9 / 24.0 / 60.0 {
        return DateFormat::HourMin;
    }
    DateFormat::HourMinSec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{Near, assert_near};
    use std::rc::Rc;

    fn num_field(values: &[f64]) -> Field {
        let f = Field::column(
            "a",
            None,
            values.iter().map(|v| Some(Value::Num(*v))).collect(),
        );
        f.set_numeric();
        f
    }

    #[test]
    fn test_known_numeric_stats() {
        let f = num_field(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_near!(f.num_property("mean").unwrap(), 3.0);
        assert_near!(f.min().unwrap(), 1.0);
        assert_near!(f.max().unwrap(), 5.0);
        assert_near!(f.num_property("median").unwrap(), 3.0);
        assert_near!(f.num_property("q1").unwrap(), 2.0);
        assert_near!(f.num_property("q3").unwrap(), 4.0);
        assert_near!(f.num_property("granularity").unwrap(), 1.0);
        assert_near!(f.num_property("variance").unwrap(), 2.5);
    }

    #[test]
    fn test_even_count_quartiles() {
        let f = num_field(&[1.0, 2.0, 3.0, 4.0]);
        assert_near!(f.num_property("median").unwrap(), 2.5);
        assert_near!(f.num_property("q1").unwrap(), 1.5);
        assert_near!(f.num_property("q3").unwrap(), 3.5);
    }

    #[test]
    fn test_granularity() {
        let f = num_field(&[0.0, 10.0, 30.0, 30.0, 100.0]);
        assert_near!(f.num_property("granularity").unwrap(), 10.0);

        let f = num_field(&[7.0, 7.0, 7.0]);
        assert_near!(f.num_property("granularity").unwrap(), 7.0);
    }

    #[test]
    fn test_range_values_contribute_both_ends() {
        let r = crate::value::Range::numeric(0.0, 10.0, false);
        let f = Field::column("a", None, vec![Some(Value::Range(Rc::new(r)))]);
        f.set_numeric();
        assert_near!(f.min().unwrap(), 0.0);
        assert_near!(f.max().unwrap(), 10.0);
        assert_eq!(f.num_property("valid_numeric").unwrap(), 2.0);
    }

    #[test]
    fn test_mode_ties_take_smallest() {
        let mut counts = ValueCounts::new();
        for v in ["b", "a", "b", "a", "c"] {
            counts.increment(Value::str(v));
        }
        assert_eq!(counts.mode(), Some(Value::str("a")));
    }

    #[test]
    fn test_nominal_counts_nulls() {
        let f = Field::column(
            "a",
            None,
            vec![Some(Value::str("x")), None, Some(Value::str("x")), Some(Value::str("y"))],
        );
        assert_eq!(f.num_property("n").unwrap(), 4.0);
        assert_eq!(f.valid(), 3);
        assert_eq!(f.unique_values_count(), 2);
    }

    #[test]
    fn test_selection_category_order() {
        let f = Field::column(
            "#selection",
            None,
            vec![Some(Value::str(VAL_SELECTED)), Some(Value::str(VAL_UNSELECTED))],
        );
        let cats = f.categories().unwrap();
        assert_eq!(cats[0], Value::str(VAL_UNSELECTED));
        assert_eq!(cats[1], Value::str(VAL_SELECTED));
    }

    #[test]
    fn test_date_unit_for_span() {
        assert_eq!(date_unit_for_span(200000.0), DateUnit::Century);
        assert_eq!(date_unit_for_span(4000.0), DateUnit::Year);
        assert_eq!(date_unit_for_span(400.0), DateUnit::Quarter);
        assert_eq!(date_unit_for_span(3.0), DateUnit::Day);
        assert_eq!(date_unit_for_span(0.5), DateUnit::Hour);
        assert_eq!(date_unit_for_span(1.0 / 24.0 / 2.0), DateUnit::Minute);
    }

    #[test]
    fn test_date_format_for() {
        assert_eq!(date_format_for(DateUnit::Year, 365.0), DateFormat::Year);
        assert_eq!(date_format_for(DateUnit::Month, 30.0), DateFormat::YearMonth);
        assert_eq!(date_format_for(DateUnit::Day, 1.0), DateFormat::YearMonthDay);
        assert_eq!(date_format_for(DateUnit::Day, 0.5), DateFormat::DayHour);
        assert_eq!(date_format_for(DateUnit::Minute, 0.01), DateFormat::HourMin);
    }
}
