//! Fields: named, typed columns with lazily computed statistics.
//!
//! A [`Field`] wraps a [`Provider`] and a typed property bag. Statistics are
//! computed in three groups (nominal, numeric, date) the first time any
//! property of that group is requested, then cached; fields are otherwise
//! immutable, so the cache never needs invalidation. The one exception is
//! [`Field::set_value`], used for interactive selection state.
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::auto::ScaleKind;
use crate::provider::Provider;
use crate::stats;
use crate::time::{Date, DateFormat, DateUnit};
use crate::value::{self, Value};

/// Selection glyph for a selected row
pub const VAL_SELECTED: &str = "\u{2713}";
/// Selection glyph for an unselected row
pub const VAL_UNSELECTED: &str = "\u{2717}";

/// A typed property value in a field's property bag
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// A numeric property (statistics, counts)
    Num(f64),
    /// A flag (numeric, date, binned, list, ...)
    Bool(bool),
    /// A string property (summary aggregator name, original label)
    Str(Rc<str>),
    /// A single value (the mode)
    Val(Value),
    /// An ordered list of category values
    Categories(Rc<Vec<Value>>),
    /// Counts aligned with a category list
    Counts(Rc<Vec<usize>>),
    /// A calendar unit
    Unit(DateUnit),
    /// A date display format
    Format(DateFormat),
    /// The value transform for scales
    Scale(ScaleKind),
}

/// A named, typed column of a dataset.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    label: String,
    provider: RefCell<Provider>,
    info: RefCell<HashMap<&'static str, Prop>>,
    nominal_done: Cell<bool>,
    numeric_done: Cell<bool>,
    date_done: Cell<bool>,
    category_rank: RefCell<Option<Rc<HashMap<Value, usize>>>>,
}

impl Field {
    fn new(name: &str, label: Option<&str>, provider: Provider) -> Field {
        Field {
            name: name.to_string(),
            label: label.unwrap_or(name).to_string(),
            provider: RefCell::new(provider),
            info: RefCell::new(HashMap::new()),
            nominal_done: Cell::new(false),
            numeric_done: Cell::new(false),
            date_done: Cell::new(false),
            category_rank: RefCell::new(None),
        }
    }

    /// A field over a dense column of data
    pub fn column(name: &str, label: Option<&str>, data: Vec<Option<Value>>) -> Field {
        Field::new(name, label, Provider::column(data))
    }

    /// A field holding the same value in every row.
    /// The field is numeric when the constant reads as a number.
    pub fn constant(name: &str, label: Option<&str>, value: Option<Value>, len: usize) -> Field {
        let numeric = value.as_ref().and_then(Value::as_num).is_some();
        let f = Field::new(name, label, Provider::Constant { value, len });
        if numeric {
            f.set_numeric();
        }
        f
    }

    /// A numeric field counting rows from 1
    pub fn indexing(name: &str, label: Option<&str>, len: usize) -> Field {
        let f = Field::new(name, label, Provider::RowIndex { len });
        f.set_numeric();
        f
    }

    /// A view of `field` with its rows permuted by `order`.
    ///
    /// With `only_order_changed` the view is a pure permutation, so all
    /// computed statistics carry over; otherwise (rows dropped or repeated)
    /// only the base properties carry over and statistics recompute.
    pub fn permute(field: &Field, order: &[usize], only_order_changed: bool) -> Field {
        let provider = field.provider.borrow().clone();
        if let Provider::Constant { value, .. } = &provider {
            if only_order_changed {
                return field.clone();
            }
            return Field::constant(&field.name, Some(&field.label), value.clone(), order.len());
        }
        let reordered = Provider::reordered(&provider, order.to_vec());
        if only_order_changed {
            let f = Field {
                name: field.name.clone(),
                label: field.label.clone(),
                provider: RefCell::new(reordered),
                info: RefCell::new(field.info.borrow().clone()),
                nominal_done: Cell::new(field.nominal_done.get()),
                numeric_done: Cell::new(field.numeric_done.get()),
                date_done: Cell::new(field.date_done.get()),
                category_rank: RefCell::new(None),
            };
            f
        } else {
            let f = Field::new(&field.name, Some(&field.label), reordered);
            f.copy_base_properties(field);
            f
        }
    }

    /// A copy of this field under another name (which doubles as the label
    /// when none is given)
    pub fn rename(&self, name: &str, label: Option<&str>) -> Field {
        let mut f = self.clone();
        f.name = name.to_string();
        f.label = label.unwrap_or(name).to_string();
        f
    }

    /// The unique field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The human-readable label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.provider.borrow().count()
    }

    /// The value at a row
    pub fn value(&self, index: usize) -> Option<Value> {
        self.provider.borrow().value(index)
    }

    /// Set a value in place.
    ///
    /// This is the path used for selection state only: fields share storage,
    /// so writing through one field is visible through every view of it.
    pub fn set_value(&self, value: Option<Value>, index: usize) {
        let updated = self.provider.borrow().with_value_set(value, index);
        *self.provider.borrow_mut() = updated;
    }

    /// Compare two rows of this field. Fields that prefer categorical
    /// treatment compare by category order; everything else by natural
    /// value order with nulls last.
    pub fn compare_rows(&self, a: usize, b: usize) -> Ordering {
        if self.category_rank.borrow().is_none() {
            let mut rank = HashMap::new();
            if self.prefer_categorical() {
                if let Some(cats) = self.categories() {
                    for (i, c) in cats.iter().enumerate() {
                        rank.entry(c.clone()).or_insert(i);
                    }
                }
            }
            *self.category_rank.borrow_mut() = Some(Rc::new(rank));
        }
        let rank = self.category_rank.borrow().as_ref().cloned().unwrap_or_default();
        self.provider.borrow().compare_rows(a, b, &rank)
    }

    /// Look up a property, computing its statistics group on first access
    pub fn property(&self, key: &'static str) -> Option<Prop> {
        if let Some(p) = self.info.borrow().get(key) {
            return Some(p.clone());
        }
        if !self.nominal_done.get() && stats::nominal_creates(key) {
            self.compute_nominal();
        }
        if !self.numeric_done.get() && stats::numeric_creates(key) {
            if !self.nominal_done.get() {
                self.compute_nominal();
            }
            self.compute_numeric();
        }
        if !self.date_done.get() && stats::date_creates(key) {
            if self.is_date() {
                if !self.nominal_done.get() {
                    self.compute_nominal();
                }
                if !self.numeric_done.get() {
                    self.compute_numeric();
                }
                self.compute_date();
            } else {
                // not a date; remember so this is not retried
                self.date_done.set(true);
            }
        }
        self.info.borrow().get(key).cloned()
    }

    fn compute_nominal(&self) {
        stats::populate_nominal(self);
        self.nominal_done.set(true);
    }

    fn compute_numeric(&self) {
        stats::populate_numeric(self);
        self.numeric_done.set(true);
    }

    fn compute_date(&self) {
        if self.is_numeric() {
            stats::populate_date(self);
        }
        self.date_done.set(true);
    }

    /// Set a property; `None` removes it
    pub fn set(&self, key: &'static str, value: Option<Prop>) {
        match value {
            Some(v) => self.info.borrow_mut().insert(key, v),
            None => self.info.borrow_mut().remove(key),
        };
    }

    /// A numeric property, if present
    pub fn num_property(&self, key: &'static str) -> Option<f64> {
        match self.property(key)? {
            Prop::Num(v) => Some(v),
            _ => None,
        }
    }

    /// A string property, if present
    pub fn str_property(&self, key: &'static str) -> Option<Rc<str>> {
        match self.property(key)? {
            Prop::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True when the named flag is set
    pub fn flag(&self, key: &'static str) -> bool {
        matches!(self.property(key), Some(Prop::Bool(true)))
    }

    /// The category values of this field, in display order
    pub fn categories(&self) -> Option<Rc<Vec<Value>>> {
        match self.property("categories")? {
            Prop::Categories(c) => Some(c),
            _ => None,
        }
    }

    /// Counts per category, aligned with [`Field::categories`]
    pub fn category_counts(&self) -> Option<Rc<Vec<usize>>> {
        match self.property("category_counts")? {
            Prop::Counts(c) => Some(c),
            _ => None,
        }
    }

    /// Fix the category display order explicitly
    pub fn set_categories(&self, cats: Vec<Value>) {
        self.set("categories", Some(Prop::Categories(Rc::new(cats))));
        self.set("categories_ordered", Some(Prop::Bool(true)));
        *self.category_rank.borrow_mut() = None;
    }

    /// The date display format, computed from the data for date fields
    pub fn date_format(&self) -> Option<DateFormat> {
        match self.property("date_format")? {
            Prop::Format(f) => Some(f),
            _ => None,
        }
    }

    /// The calendar unit matching the data's span, for date fields
    pub fn date_unit(&self) -> Option<DateUnit> {
        match self.property("date_unit")? {
            Prop::Unit(u) => Some(u),
            _ => None,
        }
    }

    /// The scale transform assigned to this field, if any
    pub fn scale(&self) -> Option<ScaleKind> {
        match self.property("transform")? {
            Prop::Scale(s) => Some(s),
            _ => None,
        }
    }

    /// True for numeric fields
    pub fn is_numeric(&self) -> bool {
        self.flag("numeric")
    }

    /// Mark the field numeric
    pub fn set_numeric(&self) {
        self.set("numeric", Some(Prop::Bool(true)));
    }

    /// True for date fields
    pub fn is_date(&self) -> bool {
        self.flag("date")
    }

    /// True for binned fields
    pub fn is_binned(&self) -> bool {
        self.flag("binned")
    }

    /// True for list-valued fields
    pub fn is_list(&self) -> bool {
        self.flag("list")
    }

    /// True for engine-injected fields (`#count`, `#row`, `#selection`)
    pub fn is_synthetic(&self) -> bool {
        self.name.starts_with('#')
    }

    /// True when the field should be treated as categories rather than as a
    /// continuous quantity
    pub fn prefer_categorical(&self) -> bool {
        !self.is_numeric() || self.is_binned()
    }

    /// True when the field has an inherent order that sorting must not change
    pub fn ordered(&self) -> bool {
        self.is_numeric() || self.name == "#selection"
    }

    /// Count of valid (non-null) values
    pub fn valid(&self) -> usize {
        self.num_property("valid").map_or(0, |v| v as usize)
    }

    /// Count of distinct values
    pub fn unique_values_count(&self) -> usize {
        self.num_property("unique").map_or(0, |v| v.round() as usize)
    }

    /// Minimum numeric value, for fields with numeric content
    pub fn min(&self) -> Option<f64> {
        self.num_property("min")
    }

    /// Maximum numeric value, for fields with numeric content
    pub fn max(&self) -> Option<f64> {
        self.num_property("max")
    }

    /// Copy the identity-level properties (type flags, scale transform, date
    /// handling, ordered categories) from another field
    pub fn copy_base_properties(&self, source: &Field) {
        const BASE: [&str; 10] = [
            "numeric",
            "binned",
            "summary",
            "transform",
            "list",
            "list_categories",
            "date",
            "categories_ordered",
            "date_unit",
            "date_format",
        ];
        let src = source.info.borrow();
        let mut dst = self.info.borrow_mut();
        for key in BASE {
            match src.get(key) {
                Some(v) => dst.insert(key, v.clone()),
                None => dst.remove(key),
            };
        }
        // category order only matters when it was set explicitly
        if matches!(src.get("categories_ordered"), Some(Prop::Bool(true))) {
            if let Some(cats) = src.get("categories") {
                dst.insert("categories", cats.clone());
            }
        }
    }

    /// Format a value the way this field displays: "?" for null, ranges by
    /// name, dates in the computed format, percents with one decimal,
    /// numbers with grouping
    pub fn format(&self, v: Option<&Value>) -> String {
        let Some(v) = v else {
            return "?".to_string();
        };
        if let Value::Range(r) = v {
            return r.name().to_string();
        }
        if self.is_date() {
            if let (Some(fmt), Some(days)) = (self.date_format(), v.as_num()) {
                if let Some(d) = Date::from_days(days) {
                    return fmt.format(d);
                }
            }
        }
        if self.str_property("summary").as_deref() == Some("percent") {
            return match v.as_num() {
                Some(d) => format!("{}%", value::format_num((d * 10.0).round() / 10.0, false)),
                None => "?".to_string(),
            };
        }
        if self.is_numeric() {
            return match v.as_num() {
                Some(d) => value::format_num(d, true),
                None => "?".to_string(),
            };
        }
        v.to_string()
    }

    /// The value at a row, formatted for display
    pub fn value_formatted(&self, index: usize) -> String {
        self.format(self.value(index).as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Option<Value>> {
        values.iter().map(|v| Some(Value::Num(*v))).collect()
    }

    #[test]
    fn test_empty_field() {
        let f = Field::column("a", Some("label"), Vec::new());
        assert_eq!(f.row_count(), 0);
        assert_eq!(f.min(), None);
    }

    #[test]
    fn test_properties() {
        let f = Field::column("a", Some("label"), Vec::new());
        assert_eq!(f.property("xyz"), None);
        f.set("xyz", Some(Prop::Num(12.0)));
        assert_eq!(f.num_property("xyz"), Some(12.0));
        f.set("xyz", None);
        assert_eq!(f.property("xyz"), None);
    }

    #[test]
    fn test_basic_stats() {
        let g = Field::column("a", None, nums(&[100.0, 200.0, 400.0, 500.0, 600.0]));
        g.set_numeric();
        assert_eq!(g.min(), Some(100.0));
        assert_eq!(g.max(), Some(600.0));
        assert_eq!(g.unique_values_count(), 5);

        let i = Field::indexing("a", None, 20);
        assert_eq!(i.min(), Some(1.0));
        assert_eq!(i.max(), Some(20.0));
        assert_eq!(i.unique_values_count(), 20);

        let c = Field::constant("a", None, Some(Value::Num(5.0)), 2000);
        assert_eq!(c.min(), Some(5.0));
        assert_eq!(c.max(), Some(5.0));
        assert_eq!(c.unique_values_count(), 1);

        let h = Field::column(
            "a",
            None,
            ["a", "b", "c", "c"].iter().map(|s| Some(Value::str(s))).collect(),
        );
        assert_eq!(h.min(), None);
        assert_eq!(h.unique_values_count(), 3);
        let counts = h.category_counts().unwrap();
        assert_eq!(counts.as_ref(), &vec![1, 1, 2]);
    }

    #[test]
    fn test_permute_keeps_stats_for_pure_reorder() {
        let f = Field::column("a", None, nums(&[3.0, 1.0, 2.0]));
        f.set_numeric();
        assert_eq!(f.min(), Some(1.0));
        let p = Field::permute(&f, &[1, 2, 0], true);
        assert_eq!(p.value(0), Some(Value::Num(1.0)));
        assert_eq!(p.min(), Some(1.0));
        assert!(p.is_numeric());
    }

    #[test]
    fn test_selection_shared_through_views() {
        let f = Field::constant("#selection", None, Some(Value::str(VAL_UNSELECTED)), 3);
        f.set_value(Some(Value::str(VAL_SELECTED)), 1);
        let view = Field::permute(&f, &[1, 0, 2], true);
        assert_eq!(view.value(0), Some(Value::str(VAL_SELECTED)));
        // writing through the base is visible through the view
        f.set_value(Some(Value::str(VAL_SELECTED)), 2);
        assert_eq!(view.value(2), Some(Value::str(VAL_SELECTED)));
    }

    #[test]
    fn test_format() {
        let f = Field::column("a", None, nums(&[1234.5]));
        f.set_numeric();
        assert_eq!(f.format(None), "?");
        assert_eq!(f.format(Some(&Value::Num(1234.0))), "1,234");

        let p = Field::column("p", None, nums(&[12.34]));
        p.set_numeric();
        p.set("summary", Some(Prop::Str(Rc::from("percent"))));
        assert_eq!(p.format(Some(&Value::Num(12.34))), "12.3%");
    }
}
