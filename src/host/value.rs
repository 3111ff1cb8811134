//! Loose value semantics for generated code
//!
//! Template variables are JSON values. Generated code compares, prints and
//! tests them the way a dynamically typed host does: `"1" == 1` holds, an
//! empty string is falsy and `true` prints as `1`.

use std::cmp::Ordering;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::{CharEscape, CompactFormatter, Formatter, PrettyFormatter, Serializer};
use serde_json::{Map, Number, Value};

pub const JSON_HEX_TAG: i64 = 1;
pub const JSON_HEX_AMP: i64 = 2;
pub const JSON_HEX_APOS: i64 = 4;
pub const JSON_HEX_QUOT: i64 = 8;
pub const JSON_UNESCAPED_SLASHES: i64 = 64;
pub const JSON_PRETTY_PRINT: i64 = 128;
pub const JSON_UNESCAPED_UNICODE: i64 = 256;

/// Look up a named constant available to generated code
pub fn constant(name: &str) -> Option<Value> {
    let value = match name {
        "JSON_HEX_TAG" => JSON_HEX_TAG,
        "JSON_HEX_AMP" => JSON_HEX_AMP,
        "JSON_HEX_APOS" => JSON_HEX_APOS,
        "JSON_HEX_QUOT" => JSON_HEX_QUOT,
        "JSON_UNESCAPED_SLASHES" => JSON_UNESCAPED_SLASHES,
        "JSON_PRETTY_PRINT" => JSON_PRETTY_PRINT,
        "JSON_UNESCAPED_UNICODE" => JSON_UNESCAPED_UNICODE,
        "PHP_EOL" => return Some(Value::String("\n".to_string())),
        _ => return None,
    };
    Some(Value::from(value))
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text written for a value by `echo`
pub fn display(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => "Array".to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Numeric reading of a value; non-numeric strings count as zero
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Array(items) => f64::from(u8::from(!items.is_empty())),
        Value::Object(map) => f64::from(u8::from(!map.is_empty())),
    }
}

/// Build a JSON number, preferring an integer when the value is whole
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// `==` between two values
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
            truthy(a) == truthy(b)
        }
        (Value::String(x), Value::String(y)) if !(is_numeric(a) && is_numeric(b)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| loose_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ if is_numeric(a) && is_numeric(b) => to_number(a) == to_number(b),
        _ => false,
    }
}

/// Ordering used by `<`, `<=`, `>` and `>=`
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) if !(is_numeric(a) && is_numeric(b)) => x.cmp(y),
        _ => to_number(a)
            .partial_cmp(&to_number(b))
            .unwrap_or(Ordering::Equal),
    }
}

/// Escape text for HTML output, quotes included
pub fn htmlentities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Serialize a value to JSON text honoring the `JSON_*` flags
///
/// Returns `None` when the value nests deeper than `depth`.
pub fn json_encode(value: &Value, flags: i64, depth: usize) -> Option<String> {
    if nesting(value) > depth {
        return None;
    }
    if flags & JSON_PRETTY_PRINT != 0 {
        serialize_with(value, FlagFormatter::new(PrettyFormatter::with_indent(b"    "), flags))
    } else {
        serialize_with(value, FlagFormatter::new(CompactFormatter, flags))
    }
}

fn serialize_with<F: Formatter>(value: &Value, formatter: F) -> Option<String> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer).ok()?;
    String::from_utf8(out).ok()
}

fn nesting(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(nesting).max().unwrap_or(0),
        _ => 0,
    }
}

/// Adds the `JSON_*` string escapes on top of a layout formatter
struct FlagFormatter<F> {
    inner: F,
    flags: i64,
}

impl<F> FlagFormatter<F> {
    fn new(inner: F, flags: i64) -> Self {
        Self { inner, flags }
    }

    fn escape(&self, c: char) -> Option<&'static str> {
        match c {
            '/' if self.flags & JSON_UNESCAPED_SLASHES == 0 => Some("\\/"),
            '<' if self.flags & JSON_HEX_TAG != 0 => Some("\\u003C"),
            '>' if self.flags & JSON_HEX_TAG != 0 => Some("\\u003E"),
            '&' if self.flags & JSON_HEX_AMP != 0 => Some("\\u0026"),
            '\'' if self.flags & JSON_HEX_APOS != 0 => Some("\\u0027"),
            _ => None,
        }
    }
}

impl<F: Formatter> Formatter for FlagFormatter<F> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let unicode = !c.is_ascii() && self.flags & JSON_UNESCAPED_UNICODE == 0;
            let escape = self.escape(c);
            if escape.is_none() && !unicode {
                continue;
            }

            writer.write_all(fragment[start..i].as_bytes())?;
            match escape {
                Some(escape) => writer.write_all(escape.as_bytes())?,
                None => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        write!(writer, "\\u{:04x}", unit)?;
                    }
                }
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn write_char_escape<W>(&mut self, writer: &mut W, char_escape: CharEscape) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        match char_escape {
            CharEscape::Quote if self.flags & JSON_HEX_QUOT != 0 => {
                writer.write_all(b"\\u0022")
            }
            other => self.inner.write_char_escape(writer, other),
        }
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}

/// Element count of an array or object
pub fn count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Key/value pairs iterated by `foreach`
pub fn entries(value: &Value) -> Vec<(Value, Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item.clone()))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| (Value::String(key.clone()), item.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Element lookup for `$value[index]` and `$value->name`
pub fn index(value: &Value, key: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let i = to_number(key);
            if i < 0.0 || i.fract() != 0.0 {
                return Value::Null;
            }
            items.get(i as usize).cloned().unwrap_or(Value::Null)
        }
        Value::Object(map) => map.get(&display(key)).cloned().unwrap_or(Value::Null),
        Value::String(s) => {
            let i = to_number(key);
            if i < 0.0 || i.fract() != 0.0 {
                return Value::Null;
            }
            s.chars()
                .nth(i as usize)
                .map_or(Value::Null, |c| Value::String(c.to_string()))
        }
        _ => Value::Null,
    }
}

/// Build an array literal; keyed entries turn it into an object
pub fn array(entries: Vec<(Option<Value>, Value)>) -> Value {
    if entries.iter().all(|(key, _)| key.is_none()) {
        return Value::Array(entries.into_iter().map(|(_, v)| v).collect());
    }
    let mut map = Map::new();
    let mut next = 0usize;
    for (key, value) in entries {
        let key = match key {
            Some(key) => display(&key),
            None => {
                let key = next.to_string();
                next += 1;
                key
            }
        };
        map.insert(key, value);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!("0")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!("a")));
        assert!(truthy(&json!([0])));
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&json!(true)), "1");
        assert_eq!(display(&json!(false)), "");
        assert_eq!(display(&json!(3.0)), "3");
        assert_eq!(display(&json!(2.5)), "2.5");
        assert_eq!(display(&json!([1])), "Array");
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_eq(&json!("1"), &json!(1)));
        assert!(loose_eq(&json!(null), &json!(false)));
        assert!(!loose_eq(&json!("a"), &json!("b")));
        assert!(loose_eq(&json!("1.0"), &json!("1")));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&json!(2), &json!("10")), Ordering::Less);
        assert_eq!(compare(&json!("b"), &json!("a")), Ordering::Greater);
    }

    #[test]
    fn test_htmlentities() {
        assert_eq!(
            htmlentities(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_json_encode_default_escapes() {
        assert_eq!(
            json_encode(&json!({"url": "a/b", "name": "é"}), 0, 512).as_deref(),
            Some(r#"{"name":"\u00e9","url":"a\/b"}"#)
        );
    }

    #[test]
    fn test_json_encode_hex_flags() {
        let flags = JSON_HEX_TAG | JSON_HEX_APOS | JSON_HEX_AMP | JSON_HEX_QUOT;
        assert_eq!(
            json_encode(&json!("<'&\">"), flags, 512).as_deref(),
            Some(r#""\u003C\u0027\u0026\u0022\u003E""#)
        );
    }

    #[test]
    fn test_json_encode_pretty_print_and_controls() {
        assert_eq!(
            json_encode(&json!({"a": [1]}), JSON_PRETTY_PRINT, 512).as_deref(),
            Some("{\n    \"a\": [\n        1\n    ]\n}")
        );
        assert_eq!(
            json_encode(&json!("q\"\n/😀"), JSON_UNESCAPED_SLASHES, 512).as_deref(),
            Some(r#""q\"\n/\ud83d\ude00""#)
        );
        assert_eq!(
            json_encode(&json!("é"), JSON_UNESCAPED_UNICODE, 512).as_deref(),
            Some("\"é\"")
        );
    }

    #[test]
    fn test_json_encode_depth_limit() {
        assert_eq!(json_encode(&json!([[1]]), 0, 1), None);
        assert_eq!(json_encode(&json!([[1]]), 0, 2).as_deref(), Some("[[1]]"));
    }

    #[test]
    fn test_array_literal_with_keys() {
        let value = array(vec![
            (Some(json!("a")), json!(1)),
            (None, json!(2)),
        ]);
        assert_eq!(value, json!({"a": 1, "0": 2}));
    }

    #[test]
    fn test_index() {
        assert_eq!(index(&json!([1, 2]), &json!(1)), json!(2));
        assert_eq!(index(&json!({"a": 1}), &json!("a")), json!(1));
        assert_eq!(index(&json!([1]), &json!(5)), json!(null));
    }
}
