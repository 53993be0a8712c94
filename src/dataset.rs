//! Datasets: ordered collections of uniquely-named fields.
//!
//! A [`Dataset`] is immutable: every transform hands back a new dataset that
//! shares unchanged fields with its parent. Three synthetic fields ride
//! along with every dataset (`#count`, `#row`, `#selection`) and survive all
//! ordinary transforms.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::Error;
use crate::auto;
use crate::field::{Field, Prop, VAL_SELECTED, VAL_UNSELECTED};
use crate::transform;
use crate::value::Value;

/// How a selection gesture combines with the current selection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Replace the selection with the target rows
    Select,
    /// Add the target rows to the selection
    Add,
    /// Remove the target rows from the selection
    Subtract,
    /// Flip the selection state of the target rows
    Toggle,
}

/// An ordered, immutable collection of uniquely-named fields sharing one row count
#[derive(Debug, Clone)]
pub struct Dataset {
    fields: Vec<Rc<Field>>,
    by_name: HashMap<String, usize>,
    info: RefCell<HashMap<&'static str, Prop>>,
}

impl Dataset {
    /// Assemble a dataset from raw fields.
    ///
    /// Names are made unique, the synthetic fields are added when missing,
    /// and (unless `auto_convert` is off) each field is converted to its
    /// best type via [`auto::convert`].
    pub fn make(fields: Vec<Field>, auto_convert: bool) -> Dataset {
        let mut augmented: Vec<Field> = Vec::with_capacity(fields.len() + 3);
        let mut names: HashSet<String> = HashSet::new();
        for f in fields {
            let f = if auto_convert { auto::convert(f) } else { f };
            names.insert(f.name().to_string());
            augmented.push(f);
        }

        let len = augmented.first().map_or(0, Field::row_count);
        log::debug!("assembling dataset: {} fields, {} rows", augmented.len(), len);
        if !names.contains("#count") {
            augmented.push(Field::constant("#count", Some("Count"), Some(Value::Num(1.0)), len));
        }
        if !names.contains("#row") {
            augmented.push(Field::indexing("#row", Some("Row"), len));
        }
        if !names.contains("#selection") {
            augmented.push(Field::constant(
                "#selection",
                Some("Selection"),
                Some(Value::str(VAL_UNSELECTED)),
                len,
            ));
        }

        Dataset::assemble(augmented.into_iter().map(Rc::new).collect(), None)
    }

    fn assemble(fields: Vec<Rc<Field>>, properties: Option<&Dataset>) -> Dataset {
        let fields = ensure_unique_rc(fields);
        let mut by_name = HashMap::new();
        // lowercase entries first so exact names win collisions
        for (i, f) in fields.iter().enumerate() {
            by_name.insert(f.name().to_lowercase(), i);
        }
        for (i, f) in fields.iter().enumerate() {
            by_name.insert(f.name().to_string(), i);
        }
        let info = match properties {
            Some(d) => d.info.borrow().clone(),
            None => HashMap::new(),
        };
        Dataset { fields, by_name, info: RefCell::new(info) }
    }

    /// A dataset with the same properties but different fields
    pub fn replace_fields(&self, fields: Vec<Rc<Field>>) -> Dataset {
        Dataset::assemble(fields, Some(self))
    }

    /// The fields, in order
    pub fn fields(&self) -> &[Rc<Field>] {
        &self.fields
    }

    /// Number of rows (zero for a dataset with no fields)
    pub fn row_count(&self) -> usize {
        self.fields.first().map_or(0, |f| f.row_count())
    }

    /// Find a field by name (also matches the lowercase form of a name)
    pub fn field(&self, name: &str) -> Option<&Rc<Field>> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Find a field, relaxing the query to lowercase if the exact name misses
    pub fn field_lax(&self, name: &str) -> Option<&Rc<Field>> {
        self.field(name).or_else(|| self.field(&name.to_lowercase()))
    }

    pub(crate) fn field_required(&self, name: &str) -> Result<Rc<Field>, Error> {
        self.field(name)
            .cloned()
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))
    }

    /// A dataset property
    pub fn property(&self, key: &'static str) -> Option<Prop> {
        self.info.borrow().get(key).cloned()
    }

    /// Set a dataset property; `None` removes it
    pub fn set(&self, key: &'static str, value: Option<Prop>) {
        match value {
            Some(v) => self.info.borrow_mut().insert(key, v),
            None => self.info.borrow_mut().remove(key),
        };
    }

    /// The dataset's display name, if one was set
    pub fn name(&self) -> Option<Rc<str>> {
        match self.property("name")? {
            Prop::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True once the dataset has been aggregated by [`Dataset::summarize`]
    pub fn is_summarized(&self) -> bool {
        matches!(self.property("summarized"), Some(Prop::Bool(true)))
    }

    /// Keep only the rows at the given indices, in that order
    pub fn retain_rows(&self, keep: &[usize]) -> Dataset {
        let fields = self
            .fields
            .iter()
            .map(|f| Rc::new(Field::permute(f, keep, false)))
            .collect();
        self.replace_fields(fields)
    }

    /// Keep only the named fields (plus the synthetic ones)
    pub fn reduce(&self, command: &str) -> Dataset {
        let names: HashSet<&str> = transform::clauses(command).into_iter().collect();
        let fields = self
            .fields
            .iter()
            .filter(|f| f.is_synthetic() || names.contains(f.name()))
            .cloned()
            .collect();
        self.replace_fields(fields)
    }

    /// Drop the synthetic fields, typically before serializing
    pub fn remove_special_fields(&self) -> Dataset {
        let fields = self.fields.iter().filter(|f| !f.is_synthetic()).cloned().collect();
        self.replace_fields(fields)
    }

    /// Remove rows by filter commands, like `"region is East,West; sales valid"`.
    /// See the crate's filter grammar: verbs `valid`, `is`, `in`, `ranked`,
    /// each negatable with a leading `!`. Returns the dataset unchanged when
    /// nothing is removed.
    pub fn filter(&self, command: &str) -> Result<Dataset, Error> {
        transform::filter::apply(self, command)
    }

    /// Sort rows and category orders by the named fields, first listed first.
    /// Append `:ascending` or `:descending` to a name to force a direction.
    pub fn sort(&self, command: &str) -> Result<Dataset, Error> {
        transform::sort::apply(self, command, true)
    }

    /// Sort rows only, leaving category display orders alone
    pub fn sort_rows(&self, command: &str) -> Result<Dataset, Error> {
        transform::sort::apply(self, command, false)
    }

    /// Bin or rank fields, like `"salary=bin; age=bin:10; height=rank"`.
    /// Identity on an already-summarized dataset.
    pub fn transform(&self, command: &str) -> Result<Dataset, Error> {
        if self.is_summarized() {
            return Ok(self.clone());
        }
        transform::bin::apply(self, command)
    }

    /// Stack a y field over x/group fields for cumulative charts; the command
    /// is `"y; x,...; group,...; full"`
    pub fn stack(&self, command: &str) -> Result<Dataset, Error> {
        transform::stack::apply(self, command)
    }

    /// Aggregate into one row per group, like
    /// `"region=region; sales=sales:sum; share=sales:percent"`.
    /// Identity on an already-summarized dataset.
    pub fn summarize(&self, command: &str) -> Result<Dataset, Error> {
        if self.is_summarized() {
            return Ok(self.clone());
        }
        transform::summarize::apply(self, command)
    }

    /// Pivot several y fields into `#series`/`#values` (wide to long), like
    /// `"gold,silver,bronze; country"`
    pub fn series(&self, command: &str) -> Result<Dataset, Error> {
        transform::series::apply(self, command)
    }

    /// Split list-valued fields into one row per item
    pub fn each(&self, command: &str) -> Result<Dataset, Error> {
        transform::each::apply(self, command)
    }

    /// Add constant fields, like `"4.3; 'label'"`; quoted constants are text
    pub fn add_constants(&self, command: &str) -> Result<Dataset, Error> {
        transform::constants::apply(self, command)
    }

    /// Replicate rows proportionally to a numeric field until the dataset has
    /// exactly the requested count, like `"#count:100"`
    pub fn set_row_count(&self, command: &str) -> Result<Dataset, Error> {
        transform::rows::apply(self, command)
    }

    /// Update the shared `#selection` field in place.
    ///
    /// `row` addresses a row of `source` (usually a transformed descendant of
    /// this dataset); all rows of this dataset matching it on the key fields
    /// are selected, deselected or toggled.
    pub fn modify_selection(
        &self,
        method: Selection,
        row: Option<usize>,
        source: &Dataset,
        keys: &[&str],
    ) -> Result<(), Error> {
        let off = || Some(Value::str(VAL_UNSELECTED));
        let on = || Some(Value::str(VAL_SELECTED));
        let sel = self.field_required("#selection")?;

        if method == Selection::Select {
            for i in 0..self.row_count() {
                sel.set_value(off(), i);
            }
        }

        for i in source.expanded_original_rows(row, keys)? {
            if i >= self.row_count() {
                continue;
            }
            match method {
                Selection::Select | Selection::Add => sel.set_value(on(), i),
                Selection::Subtract => sel.set_value(off(), i),
                Selection::Toggle => {
                    let selected = sel.value(i) == Some(Value::str(VAL_SELECTED));
                    sel.set_value(if selected { off() } else { on() }, i);
                }
            }
        }
        Ok(())
    }

    /// Rows of the *original* data similar to `row`: rows matching it on all
    /// key fields, expanded through this dataset's `#row` values (which may
    /// be lists after aggregation). Indices returned are zero-based.
    pub fn expanded_original_rows(
        &self,
        row: Option<usize>,
        keys: &[&str],
    ) -> Result<HashSet<usize>, Error> {
        let mut expanded = HashSet::new();
        let Some(row) = row else {
            return Ok(expanded);
        };

        let key_fields: Vec<Rc<Field>> = keys
            .iter()
            .map(|k| self.field_required(k))
            .collect::<Result<_, _>>()?;
        let compare = transform::RowComparator::new(key_fields, None, false);
        let row_field = self.field_required("#row")?;

        for i in 0..self.row_count() {
            if compare.compare(i, row) != std::cmp::Ordering::Equal {
                continue;
            }
            match row_field.value(i) {
                Some(Value::List(list)) => {
                    for item in list.items() {
                        if let Some(v) = item.as_num() {
                            if v >= 1.0 {
                                expanded.insert(v as usize - 1);
                            }
                        }
                    }
                }
                Some(v) => {
                    if let Some(v) = v.as_num() {
                        if v >= 1.0 {
                            expanded.insert(v as usize - 1);
                        }
                    }
                }
                None => {}
            }
        }
        Ok(expanded)
    }
}

// Empty names and collisions get "_1", "_2", ... suffixes; the original
// name survives as the label
fn ensure_unique_rc(fields: Vec<Rc<Field>>) -> Vec<Rc<Field>> {
    let mut cannot_use: HashSet<String> = HashSet::new();
    cannot_use.insert(String::new());
    let mut result = Vec::with_capacity(fields.len());
    for f in fields {
        let name = f.name().to_string();
        let f = if cannot_use.contains(&name) {
            let mut k = 1;
            loop {
                let candidate = format!("{name}_{k}");
                if !cannot_use.contains(&candidate) {
                    break Rc::new(f.rename(&candidate, Some(&name)));
                }
                k += 1;
            }
        } else {
            f
        };
        cannot_use.insert(f.name().to_string());
        result.push(f);
    }
    result
}
