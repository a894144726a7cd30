//! Readable text form of cells.
//!
//! Collections print their elements recursively. A collection with a child
//! that cannot be resolved prints as `#<type> <hash>` instead.

use std::fmt;

use crate::blob::Blob;
use crate::blob_map::BlobMap;
use crate::cell::{Cell, Value};
use crate::list::List;
use crate::map::Map;
use crate::set::Set;
use crate::string::Str;
use crate::vector::Vector;

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(x) => write!(f, "{x}"),
            Value::Double(x) if x.is_nan() => f.write_str("##NaN"),
            Value::Double(x) if x.is_infinite() => {
                f.write_str(if *x > 0.0 { "##Inf" } else { "##-Inf" })
            }
            Value::Double(x) => write!(f, "{x:?}"),
            Value::Char(c) => write!(f, "\\{c}"),
            Value::Address(a) => write!(f, "#{a}"),
            Value::Symbol(name) => f.write_str(name),
            Value::Keyword(name) => write!(f, ":{name}"),
            Value::Str(_) => match Str::try_from(self.clone()) {
                Ok(s) => fmt::Display::fmt(&s, f),
                Err(_) => self.placeholder(f),
            },
            Value::Blob(_) => match Blob::try_from(self.clone()) {
                Ok(b) => fmt::Display::fmt(&b, f),
                Err(_) => self.placeholder(f),
            },
            Value::Vector(_) => match Vector::try_from(self.clone()).and_then(|v| v.elements()) {
                Ok(items) => write_seq(f, "[", &items, "]"),
                Err(_) => self.placeholder(f),
            },
            Value::List(_) => {
                let items = List::try_from(self.clone())
                    .and_then(|l| l.to_vector())
                    .and_then(|v| v.elements());
                match items {
                    Ok(items) => write_seq(f, "(", &items, ")"),
                    Err(_) => self.placeholder(f),
                }
            }
            Value::Set(_) => match Set::try_from(self.clone()).and_then(|s| s.elements()) {
                Ok(items) => write_seq(f, "#{", &items, "}"),
                Err(_) => self.placeholder(f),
            },
            Value::Map(_) => match Map::try_from(self.clone()).and_then(|m| m.entries()) {
                Ok(entries) => write_pairs(
                    f,
                    "{",
                    entries.iter().map(|(k, v)| (k as &dyn fmt::Display, v)),
                ),
                Err(_) => self.placeholder(f),
            },
            Value::BlobMap(_) => match BlobMap::try_from(self.clone()).and_then(|m| m.entries()) {
                Ok(entries) => write_pairs(
                    f,
                    "#blob-map{",
                    entries.iter().map(|(k, v)| (k as &dyn fmt::Display, v)),
                ),
                Err(_) => self.placeholder(f),
            },
        }
    }
}

impl Cell {
    fn placeholder(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.cell_type(), self.hash().short_hex())
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Cell], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

fn write_pairs<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    pairs: impl Iterator<Item = (&'a dyn fmt::Display, &'a Cell)>,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, (k, v)) in pairs.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{k} {v}")?;
    }
    f.write_str("}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() {
        assert_eq!(Cell::nil().to_string(), "nil");
        assert_eq!(Cell::integer(-7).to_string(), "-7");
        assert_eq!(Cell::double(1.5).to_string(), "1.5");
        assert_eq!(Cell::double(f64::NAN).to_string(), "##NaN");
        assert_eq!(Cell::character('a').to_string(), "\\a");
        assert_eq!(Cell::keyword("k").to_string(), ":k");
        assert_eq!(Cell::symbol("s").to_string(), "s");
        assert_eq!(Cell::address(12).to_string(), "#12");
        assert_eq!(Cell::from("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn collections() {
        let v = Vector::of([1, 2, 3].map(Cell::integer));
        assert_eq!(v.to_string(), "[1 2 3]");
        let l = List::of([1, 2].map(Cell::integer));
        assert_eq!(l.to_string(), "(1 2)");
        let m = Map::of([(Cell::keyword("a"), Cell::integer(1))]);
        assert_eq!(m.to_string(), "{:a 1}");
        let s = Set::of([Cell::nil()]);
        assert_eq!(s.to_string(), "#{nil}");
        let b = BlobMap::of([(Blob::from_hex("ca").unwrap(), Cell::boolean(true))]).unwrap();
        assert_eq!(b.to_string(), "#blob-map{0xca true}");
    }

    #[test]
    fn unresolvable_child_prints_placeholder() {
        let v = Vector::of((0..300).map(Cell::integer));
        let back = Cell::decode(v.as_cell().encoding()).unwrap();
        assert!(back.to_string().starts_with("#vector-leaf "));
    }
}
