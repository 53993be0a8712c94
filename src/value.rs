//! Cell values and their shared comparison and formatting rules.
//!
//! A dataset cell is an `Option<Value>`; `None` is the null value. Every
//! place the engine sorts, groups or buckets goes through [`compare`], so
//! ordering rules (numbers numerically, strings ordinally, nulls last) live
//! here and nowhere else.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::time::{Date, DateFormat};

/// A dynamically-typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numeric value
    Num(f64),
    /// Categorical (string) value
    Str(Rc<str>),
    /// Date value, held as a day number
    Date(Date),
    /// A binned interval standing in for the values inside it
    Range(Rc<Range>),
    /// A list of values in one cell
    List(Rc<ValueList>),
}

impl Value {
    /// Build a string value
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    /// Numeric reading of the value, if it has one.
    ///
    /// Dates read as their day number, ranges as their midpoint, and strings
    /// parse when they look like a number. Lists and non-finite numbers give
    /// `None`.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => v.is_finite().then_some(*v),
            Value::Date(d) => Some(d.days()),
            Value::Range(r) => Some(r.mid),
            Value::Str(s) => parse_num(s),
            Value::List(_) => None,
        }
    }

    /// The string slice, for categorical values only
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The date, for date values only
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The list, for list values only
    pub fn as_list(&self) -> Option<&ValueList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Num(_) => 0,
            Value::Date(_) => 1,
            Value::Range(_) => 2,
            Value::Str(_) => 3,
            Value::List(_) => 4,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Num(v) => state.write_u64(v.to_bits()),
            Value::Str(s) => s.hash(state),
            Value::Date(d) => state.write_u64(d.days().to_bits()),
            Value::Range(r) => {
                state.write_u64(r.low.to_bits());
                state.write_u64(r.high.to_bits());
            }
            Value::List(l) => {
                for item in l.items() {
                    item.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(v) => write!(f, "{}", format_num(*v, false)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", DateFormat::YearMonthDay.format(*d)),
            Value::Range(r) => write!(f, "{}", r.name()),
            Value::List(l) => write!(f, "{l}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Num(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::str(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Value {
        Value::Date(v)
    }
}

/// Total order over nullable values. Nulls sort last; numbers, dates and
/// ranges compare numerically; strings compare ordinally; mixed types
/// compare by a fixed type rank.
pub fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => (a, b),
    };
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => num_cmp(*x, *y),
        (Value::Date(x), Value::Date(y)) => num_cmp(x.days(), y.days()),
        (Value::Range(x), Value::Range(y)) => num_cmp(x.mid, y.mid),
        (Value::Str(x), Value::Str(y)) => x.as_ref().cmp(y.as_ref()),
        (Value::List(x), Value::List(y)) => x.compare(y),
        _ => a.type_rank().cmp(&b.type_rank()),
    }
}

fn num_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Sort values ascending using [`compare`]
pub fn sort(values: &mut [Value]) {
    values.sort_by(|a, b| compare(Some(a), Some(b)));
}

/// Parse a number from text, locale-free. Empty or non-numeric text gives `None`.
pub fn parse_num(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    // tolerate thousands grouping in the input
    let cleaned: String;
    let s = if s.contains(',') {
        cleaned = s.replace(',', "");
        &cleaned
    } else {
        s
    };
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a number for display.
///
/// Zero is "0"; very small or large magnitudes use scientific notation;
/// integral values print as integers (with thousands grouping from 1000 up
/// when `grouping` is set); everything else gets decimals scaled to its
/// magnitude, trailing zeros trimmed.
pub fn format_num(d: f64, grouping: bool) -> String {
    if d == 0.0 || d.abs() == 0.0 {
        return "0".to_string();
    }
    if !d.is_finite() {
        return if d.is_nan() {
            "NaN".to_string()
        } else if d > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    if d.abs() <= 1e-6 || d.abs() >= 1e8 {
        return format_scientific(d);
    }
    if ((d - d.round()) / d).abs() < 1e-9 {
        let r = d.round();
        return if d.abs() >= 1e3 && grouping {
            group_thousands(&format!("{r:.0}"))
        } else {
            format!("{r:.0}")
        };
    }
    let magnitude = d.abs().log10().floor() as i32;
    let places = (7 - magnitude.clamp(0, 7)) as usize;
    let fixed = format!("{d:.places$}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if grouping {
        group_thousands(trimmed)
    } else {
        trimmed.to_string()
    }
}

fn format_scientific(d: f64) -> String {
    let exp = d.abs().log10().floor() as i32;
    let mantissa = d / 10f64.powi(exp);
    let mut m = format!("{mantissa:.3}");
    while m.ends_with('0') {
        m.pop();
    }
    if m.ends_with('.') {
        m.push('0');
    }
    format!("{m}e{exp}")
}

fn group_thousands(s: &str) -> String {
    let (sign, digits) = s.strip_prefix('-').map_or(("", s), |rest| ("-", rest));
    let (int_part, frac_part) = match digits.find('.') {
        Some(p) => (&digits[..p], &digits[p..]),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    let n = int_part.len();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (n - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}{frac_part}")
}

/// A binned interval. It stands in for all the values in `low..high` and
/// compares, converts and aggregates as its midpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    /// Inclusive lower edge, as a number (day number for date ranges)
    pub low: f64,
    /// Exclusive upper edge
    pub high: f64,
    /// Midpoint, used for comparison and numeric reading
    pub mid: f64,
    name: String,
    date_format: Option<DateFormat>,
}

impl Range {
    /// A numeric range, named either by its midpoint or as "low…high"
    pub fn numeric(low: f64, high: f64, name_at_mid: bool) -> Range {
        let mid = (low + high) / 2.0;
        let ext = 2.0 * (high - low) + 1.0;
        let name = if name_at_mid {
            format_edge(mid, ext)
        } else {
            format!("{}\u{2026}{}", format_edge(low, ext), format_edge(high, ext))
        };
        Range { low, high, mid, name, date_format: None }
    }

    /// A date range over day numbers, formatted with the given style
    pub fn date(low: f64, high: f64, name_at_mid: bool, fmt: DateFormat) -> Range {
        let mid = (low + high) / 2.0;
        let show = |v: f64| match Date::from_days(v) {
            Some(d) => fmt.format(d),
            None => "?".to_string(),
        };
        let name = if name_at_mid {
            show(mid)
        } else {
            format!("{}\u{2026}{}", show(low), show(high))
        };
        Range { low, high, mid, name, date_format: Some(fmt) }
    }

    /// Range for a summary aggregation; date-formatted when a format is given
    pub fn summary(low: f64, high: f64, fmt: Option<DateFormat>) -> Range {
        match fmt {
            Some(fmt) => Range::date(low, high, false, fmt),
            None => Range::numeric(low, high, false),
        }
    }

    /// The display name of the range
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// Ranges over a large extent read better in millions
fn format_edge(v: f64, ext: f64) -> String {
    if ext > 2e6 {
        format!("{}M", format_num(v / 1e6, false))
    } else {
        format_num(v, true)
    }
}

/// A list-valued cell: an ordered list of values that compares
/// lexicographically, then by length.
#[derive(Debug, Clone)]
pub struct ValueList {
    items: Vec<Value>,
    date_format: Option<DateFormat>,
    display_count: usize,
}

impl ValueList {
    /// Create a list; items formatted as dates when a format is given
    pub fn new(items: Vec<Value>, date_format: Option<DateFormat>) -> ValueList {
        ValueList { items, date_format, display_count: 12 }
    }

    /// Limit how many items display before eliding with "…"
    pub fn with_display_count(mut self, display_count: usize) -> ValueList {
        self.display_count = display_count;
        self
    }

    /// The items in the list
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the list has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Lexicographic comparison, ties broken by length
    pub fn compare(&self, other: &ValueList) -> Ordering {
        let n = self.len().min(other.len());
        for i in 0..n {
            let d = compare(Some(&self.items[i]), Some(&other.items[i]));
            if d != Ordering::Equal {
                return d;
            }
        }
        self.len().cmp(&other.len())
    }
}

impl PartialEq for ValueList {
    fn eq(&self, other: &ValueList) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Display for ValueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.items.len();
        for (i, v) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if i == self.display_count - 1 && n > self.display_count {
                return write!(f, "\u{2026}");
            }
            match (&self.date_format, v.as_num()) {
                (Some(fmt), Some(d)) => match Date::from_days(d) {
                    Some(d) => write!(f, "{}", fmt.format(d))?,
                    None => write!(f, "?")?,
                },
                (None, Some(d)) => write!(f, "{}", format_num(d, false))?,
                _ => write!(f, "{v}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_nulls_last() {
        let one = Value::Num(1.0);
        assert_eq!(compare(Some(&one), None), Ordering::Less);
        assert_eq!(compare(None, Some(&one)), Ordering::Greater);
        assert_eq!(compare(None, None), Ordering::Equal);
    }

    #[test]
    fn test_compare_types() {
        let a = Value::Num(2.0);
        let b = Value::Num(10.0);
        assert_eq!(compare(Some(&a), Some(&b)), Ordering::Less);

        let a = Value::str("b");
        let b = Value::str("a");
        assert_eq!(compare(Some(&a), Some(&b)), Ordering::Greater);

        // numbers sort before strings
        let a = Value::Num(99.0);
        let b = Value::str("1");
        assert_eq!(compare(Some(&a), Some(&b)), Ordering::Less);
    }

    #[test]
    fn test_as_num() {
        assert_eq!(Value::Num(3.5).as_num(), Some(3.5));
        assert_eq!(Value::str(" 12 ").as_num(), Some(12.0));
        assert_eq!(Value::str("a").as_num(), None);
        assert_eq!(Value::str("").as_num(), None);
        let r = Value::Range(Rc::new(Range::numeric(2.0, 4.0, false)));
        assert_eq!(r.as_num(), Some(3.0));
    }

    #[test]
    fn test_format_num() {
        assert_eq!(format_num(0.0, false), "0");
        assert_eq!(format_num(3.0, false), "3");
        assert_eq!(format_num(-5.0, false), "-5");
        assert_eq!(format_num(1234.0, true), "1,234");
        assert_eq!(format_num(1234.0, false), "1234");
        assert_eq!(format_num(0.5, false), "0.5");
        assert_eq!(format_num(2.25, false), "2.25");
        assert_eq!(format_num(1.5e8, false), "1.5e8");
        assert_eq!(format_num(1e-7, false), "1.0e-7");
    }

    #[test]
    fn test_range_names() {
        let r = Range::numeric(0.0, 10.0, false);
        assert_eq!(r.name(), "0\u{2026}10");
        let r = Range::numeric(2.0, 4.0, true);
        assert_eq!(r.name(), "3");
        assert_eq!(r.mid, 3.0);
    }

    #[test]
    fn test_list_display() {
        let l = ValueList::new(vec![Value::str("a"), Value::Num(2.0)], None);
        assert_eq!(l.to_string(), "a, 2");

        let items: Vec<Value> = (0..5).map(|i| Value::Num(i as f64)).collect();
        let l = ValueList::new(items, None).with_display_count(3);
        assert_eq!(l.to_string(), "0, 1, \u{2026}");
    }

    #[test]
    fn test_list_compare() {
        let a = ValueList::new(vec![Value::Num(1.0), Value::Num(2.0)], None);
        let b = ValueList::new(vec![Value::Num(1.0)], None);
        assert_eq!(a.compare(&b), Ordering::Greater);
        let c = ValueList::new(vec![Value::Num(1.0)], None);
        assert!(b == c);
    }
}
