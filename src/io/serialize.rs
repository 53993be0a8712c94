//! A compact self-describing binary codec for datasets.
//!
//! Each field is written as a dictionary of its distinct values followed by
//! one dictionary index per row, so long columns of repeated values stay
//! small. Numbers use a variable-length encoding: a literal byte for 0-252,
//! a two-byte little-endian integer, or the formatted decimal text of the
//! value; strings are null-terminated UTF-8 with a leading 0x03 marking a
//! null string (distinct from an empty one).
use std::collections::HashMap;

use crate::Error;
use crate::dataset::Dataset;
use crate::field::{Field, Prop};
use crate::value::{self, Value};

const TAG_DATA_SET: u8 = 1;
const TAG_FIELD: u8 = 2;
const TYPE_NUMBER: u8 = 3;
const TYPE_STRING: u8 = 4;
const TYPE_DATE: u8 = 5;
const TAG_VERSION: u8 = 6;

/// Incremented whenever the format changes incompatibly
pub const FORMAT_VERSION: u32 = 1;

/// Serialize a dataset (without its synthetic fields, which are rebuilt on
/// read) to bytes
pub fn write_dataset(data: &Dataset) -> Vec<u8> {
    let data = data.remove_special_fields();
    let mut out = Vec::new();
    out.push(TAG_VERSION);
    write_number(&mut out, Some(FORMAT_VERSION as f64));
    out.push(TAG_DATA_SET);
    write_number(&mut out, Some(data.fields().len() as f64));
    for f in data.fields() {
        write_field(&mut out, f);
    }
    out
}

/// Serialize one field to bytes
pub fn write_field(out: &mut Vec<u8>, field: &Field) {
    out.push(TAG_FIELD);
    write_string(out, Some(field.name()));
    write_string(out, Some(field.label()));

    // Dictionary of distinct values in first-seen order, then one index per row
    let n = field.row_count();
    let mut index: HashMap<Option<Value>, usize> = HashMap::new();
    let mut uniques: Vec<Option<Value>> = Vec::new();
    let mut rows: Vec<usize> = Vec::with_capacity(n);
    for i in 0..n {
        let v = field.value(i);
        let at = *index.entry(v.clone()).or_insert_with(|| {
            uniques.push(v);
            uniques.len() - 1
        });
        rows.push(at);
    }

    write_number(out, Some(uniques.len() as f64));
    if field.is_date() {
        out.push(TYPE_DATE);
        for v in &uniques {
            write_number(out, v.as_ref().and_then(Value::as_num));
        }
    } else if field.is_numeric() {
        out.push(TYPE_NUMBER);
        for v in &uniques {
            write_number(out, v.as_ref().and_then(Value::as_num));
        }
    } else {
        out.push(TYPE_STRING);
        for v in &uniques {
            write_string(out, v.as_ref().map(|v| v.to_string()).as_deref());
        }
    }

    write_number(out, Some(n as f64));
    for at in rows {
        write_number(out, Some(at as f64));
    }
}

/// Read a dataset back from bytes written by [`write_dataset`]
pub fn read_dataset(data: &[u8]) -> Result<Dataset, Error> {
    let mut input = ByteInput::new(data);
    match read_tagged(&mut input)? {
        Item::Dataset(d) => Ok(d),
        Item::Field(_) => Err(Error::Codec("expected a dataset, found a field".to_string())),
    }
}

/// Read a single field back from bytes written by [`write_field`]
pub fn read_field(data: &[u8]) -> Result<Field, Error> {
    let mut input = ByteInput::new(data);
    match read_tagged(&mut input)? {
        Item::Field(f) => Ok(f),
        Item::Dataset(_) => Err(Error::Codec("expected a field, found a dataset".to_string())),
    }
}

enum Item {
    Dataset(Dataset),
    Field(Field),
}

fn read_tagged(input: &mut ByteInput<'_>) -> Result<Item, Error> {
    match input.byte()? {
        TAG_VERSION => {
            let found = input.require_number()? as u32;
            if found != FORMAT_VERSION {
                return Err(Error::BadVersion { found, expected: FORMAT_VERSION });
            }
            read_tagged(input)
        }
        TAG_DATA_SET => {
            let count = input.require_number()? as usize;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                match read_tagged(input)? {
                    Item::Field(f) => fields.push(f),
                    Item::Dataset(_) => {
                        return Err(Error::Codec("nested dataset".to_string()));
                    }
                }
            }
            Ok(Item::Dataset(Dataset::make(fields, false)))
        }
        TAG_FIELD => Ok(Item::Field(read_field_body(input)?)),
        other => Err(Error::Codec(format!("unknown tag {other}"))),
    }
}

fn read_field_body(input: &mut ByteInput<'_>) -> Result<Field, Error> {
    let name = input.string()?.unwrap_or_default();
    let label = input.string()?.unwrap_or_default();

    let unique_count = input.require_number()? as usize;
    let kind = input.byte()?;
    let mut uniques: Vec<Option<Value>> = Vec::with_capacity(unique_count);
    for _ in 0..unique_count {
        let v = match kind {
            TYPE_NUMBER => input.number()?.map(Value::Num),
            TYPE_DATE => match input.number()? {
                Some(days) => crate::time::Date::from_days(days).map(Value::Date),
                None => None,
            },
            TYPE_STRING => input.string()?.map(|s| Value::str(&s)),
            other => {
                return Err(Error::Codec(format!("unknown column type {other}")));
            }
        };
        uniques.push(v);
    }

    let n = input.require_number()? as usize;
    let mut rows = Vec::with_capacity(n);
    for _ in 0..n {
        let at = input.require_number()? as usize;
        if at >= unique_count.max(1) {
            return Err(Error::Codec(format!("dictionary index {at} out of range")));
        }
        rows.push(at);
    }

    let dictionary = Field::column(&name, Some(&label), uniques);
    let field = Field::permute(&dictionary, &rows, false);
    if kind == TYPE_NUMBER || kind == TYPE_DATE {
        field.set_numeric();
    }
    if kind == TYPE_DATE {
        field.set("date", Some(Prop::Bool(true)));
    }
    Ok(field)
}

/*
    Number encoding, decided by the first byte:
    0-252  the value itself
    253    the next two bytes are a little-endian unsigned integer
    254    the formatted decimal text of the value follows ("NaN" included)
    255    null
*/
fn write_number(out: &mut Vec<u8>, value: Option<f64>) {
    let Some(d) = value else {
        out.push(255);
        return;
    };
    let e = d.floor();
    if e == d && (0.0..65536.0).contains(&e) {
        let e = e as u32;
        if e <= 252 {
            out.push(e as u8);
        } else {
            out.push(253);
            out.push((e & 0xff) as u8);
            out.push((e >> 8) as u8);
        }
        return;
    }
    out.push(254);
    let text = if d.is_nan() {
        "NaN".to_string()
    } else {
        value::format_num(d, false)
    };
    write_string(out, Some(&text));
}

fn write_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => out.push(3),
        Some(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
    }
}

struct ByteInput<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> ByteInput<'a> {
    fn new(data: &'a [u8]) -> ByteInput<'a> {
        ByteInput { data, at: 0 }
    }

    fn byte(&mut self) -> Result<u8, Error> {
        let b = self
            .data
            .get(self.at)
            .copied()
            .ok_or_else(|| Error::Codec("unexpected end of data".to_string()))?;
        self.at += 1;
        Ok(b)
    }

    fn number(&mut self) -> Result<Option<f64>, Error> {
        match self.byte()? {
            b if b <= 252 => Ok(Some(b as f64)),
            253 => {
                let lo = self.byte()? as u32;
                let hi = self.byte()? as u32;
                Ok(Some((lo + hi * 256) as f64))
            }
            254 => {
                let text = self
                    .string()?
                    .ok_or_else(|| Error::Codec("null text for a number".to_string()))?;
                if text == "NaN" {
                    return Ok(Some(f64::NAN));
                }
                text.parse()
                    .map(Some)
                    .map_err(|_| Error::Codec(format!("bad number text '{text}'")))
            }
            _ => Ok(None),
        }
    }

    fn require_number(&mut self) -> Result<f64, Error> {
        self.number()?
            .ok_or_else(|| Error::Codec("unexpected null".to_string()))
    }

    fn string(&mut self) -> Result<Option<String>, Error> {
        if self.data.get(self.at) == Some(&3) {
            self.at += 1;
            return Ok(None);
        }
        let start = self.at;
        while self.byte()? != 0 {}
        let bytes = &self.data[start..self.at - 1];
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::Codec("invalid text encoding".to_string()))?;
        Ok(Some(s.to_string()))
    }
}
