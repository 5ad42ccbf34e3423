//! # Bencode Codec
//!
//! Bencode is the self-delimiting encoding used by torrent files and tracker
//! responses. It has four kinds of values:
//!
//! ```text
//! <length>:<bytes>        byte string   4:spam
//! i<integer>e             integer       i-42e
//! l<values>e              list          l4:spami42ee
//! d<key><value>...e       dictionary    d3:bar4:spam3:fooi42ee
//! ```
//!
//! Dictionary keys are byte strings and are encoded in ascending raw byte
//! order. Because decoded dictionaries are stored in a [`BTreeMap`], encoding
//! a value decoded from canonical input reproduces the input byte for byte,
//! which is what the info-hash computation relies on.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{Error, Result};

// Deeper nesting than this is rejected instead of exhausting the stack
const MAX_DEPTH: usize = 512;

pub type Dictionary = BTreeMap<Vec<u8>, Value>;

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Integer(i64),
    List(Vec<Value>),
    Dict(Dictionary),
}

impl Value {
    /// Create a byte string value from a &str
    pub fn string(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }

    /// Create an empty dictionary
    pub fn dict() -> Self {
        Value::Dict(BTreeMap::new())
    }

    /// Insert a key-value pair into a dictionary (builder pattern)
    pub fn insert(mut self, key: &str, value: Value) -> Self {
        if let Value::Dict(ref mut dict) = self {
            dict.insert(key.as_bytes().to_vec(), value);
        }
        self
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Byte string content, only if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Look up a key, if this value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|dict| dict.get(key.as_bytes()))
    }

    /// Encode to bencoded bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into an existing buffer
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Bytes(bytes) => encode_bytes(bytes, buf),
            Value::Integer(i) => {
                buf.push(b'i');
                buf.extend_from_slice(i.to_string().as_bytes());
                buf.push(b'e');
            }
            Value::List(list) => {
                buf.push(b'l');
                for item in list {
                    item.encode_into(buf);
                }
                buf.push(b'e');
            }
            Value::Dict(dict) => {
                buf.push(b'd');
                // BTreeMap iterates in raw byte order
                for (key, value) in dict {
                    encode_bytes(key, buf);
                    value.encode_into(buf);
                }
                buf.push(b'e');
            }
        }
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

/// Encode a value. Shorthand for [`Value::encode`].
pub fn encode(value: &Value) -> Vec<u8> {
    value.encode()
}

/// Decode the first value of `input`.
///
/// Returns the value and the number of bytes it occupied. Bytes after the
/// value are left untouched, so callers decide whether trailing data matters.
///
/// # Errors
///
/// Returns [`Error::MalformedEncoding`] if:
/// - the input ends before the value does
/// - a byte string length or an integer is not a valid decimal
/// - a list or dictionary is not terminated
/// - a dictionary key is not a byte string, or is repeated
pub fn decode(input: &[u8]) -> Result<(Value, usize)> {
    let mut decoder = Decoder { input, pos: 0 };
    let value = decoder.decode_value(0)?;
    Ok((value, decoder.pos))
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn decode_value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(Error::malformed(self.pos, "nesting too deep"));
        }

        match self.peek() {
            Some(b'0'..=b'9') => self.decode_bytes().map(Value::Bytes),
            Some(b'i') => self.decode_integer(),
            Some(b'l') => self.decode_list(depth),
            Some(b'd') => self.decode_dict(depth),
            Some(other) => Err(Error::malformed(
                self.pos,
                format!("unexpected byte {:?}", other as char),
            )),
            None => Err(Error::malformed(self.pos, "unexpected end of input")),
        }
    }

    /// Consume bytes up to `delimiter` and return them, skipping the delimiter.
    fn take_until(&mut self, delimiter: u8) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = self.input[start..]
            .iter()
            .position(|&b| b == delimiter)
            .ok_or_else(|| {
                Error::malformed(start, format!("missing {:?}", delimiter as char))
            })?;
        self.pos = start + len + 1;
        Ok(&self.input[start..start + len])
    }

    fn decode_bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let digits = self.take_until(b':')?;
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::malformed(start, "invalid byte string length"))?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| {
                Error::malformed(start, format!("byte string of length {} runs past input", len))
            })?;

        let bytes = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn decode_integer(&mut self) -> Result<Value> {
        let start = self.pos;
        // Skip 'i'
        self.pos += 1;
        let digits = self.take_until(b'e')?;
        if digits.is_empty() {
            return Err(Error::malformed(start, "empty integer"));
        }

        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::Integer)
            .ok_or_else(|| Error::malformed(start, "invalid integer"))
    }

    fn decode_list(&mut self, depth: usize) -> Result<Value> {
        let start = self.pos;
        // Skip 'l'
        self.pos += 1;
        let mut list = Vec::new();

        loop {
            match self.peek() {
                Some(b'e') => {
                    self.pos += 1;
                    return Ok(Value::List(list));
                }
                Some(_) => list.push(self.decode_value(depth + 1)?),
                None => return Err(Error::malformed(start, "unterminated list")),
            }
        }
    }

    fn decode_dict(&mut self, depth: usize) -> Result<Value> {
        let start = self.pos;
        // Skip 'd'
        self.pos += 1;
        let mut dict = BTreeMap::new();

        loop {
            match self.peek() {
                Some(b'e') => {
                    self.pos += 1;
                    return Ok(Value::Dict(dict));
                }
                Some(b'0'..=b'9') => {
                    let key_pos = self.pos;
                    let key = self.decode_bytes()?;
                    let value = self.decode_value(depth + 1)?;
                    if dict.insert(key, value).is_some() {
                        return Err(Error::malformed(key_pos, "duplicate dictionary key"));
                    }
                }
                Some(_) => {
                    return Err(Error::malformed(
                        self.pos,
                        "dictionary key is not a byte string",
                    ))
                }
                None => return Err(Error::malformed(start, "unterminated dictionary")),
            }
        }
    }
}

/// Byte strings are rendered as text (lossily when they are not UTF-8), which
/// is how decoded values are displayed to users.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Bytes(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(dict) => {
                let mut map = serializer.serialize_map(Some(dict.len()))?;
                for (key, value) in dict {
                    map.serialize_entry(&String::from_utf8_lossy(key), value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Value {
        Value::string(s)
    }

    fn assert_malformed(input: &[u8]) {
        match decode(input) {
            Err(Error::MalformedEncoding { .. }) => {}
            other => panic!("expected MalformedEncoding for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn decode_byte_string() {
        assert_eq!(decode(b"5:hello").unwrap(), (bytes("hello"), 7));
        assert_eq!(decode(b"0:").unwrap(), (bytes(""), 2));
    }

    #[test]
    fn decode_byte_string_keeps_raw_bytes() {
        let (value, used) = decode(b"3:\xff\x00\x80").unwrap();
        assert_eq!(value, Value::Bytes(vec![0xff, 0x00, 0x80]));
        assert_eq!(used, 5);
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn decode_integers() {
        assert_eq!(decode(b"i-42e").unwrap(), (Value::Integer(-42), 5));
        assert_eq!(decode(b"i52e").unwrap(), (Value::Integer(52), 4));
        assert_eq!(decode(b"i0e").unwrap(), (Value::Integer(0), 3));
    }

    #[test]
    fn decode_list() {
        let (value, used) = decode(b"l5:helloi52ee").unwrap();
        assert_eq!(value, Value::List(vec![bytes("hello"), Value::Integer(52)]));
        assert_eq!(used, 13);
    }

    #[test]
    fn decode_nested_list() {
        let (value, _) = decode(b"lli4eei5ee").unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::List(vec![Value::Integer(4)]),
                Value::Integer(5)
            ])
        );
    }

    #[test]
    fn decode_dictionary() {
        let (value, used) = decode(b"d3:foo3:bar5:helloi52ee").unwrap();
        let expected = Value::dict()
            .insert("foo", bytes("bar"))
            .insert("hello", Value::Integer(52));
        assert_eq!(value, expected);
        assert_eq!(used, 23);
        assert_eq!(value.get("hello").and_then(Value::as_integer), Some(52));
    }

    #[test]
    fn decode_reports_consumed_prefix_only() {
        let (value, used) = decode(b"i1ei2e").unwrap();
        assert_eq!(value, Value::Integer(1));
        assert_eq!(used, 3);
    }

    #[test]
    fn rejects_unterminated_containers() {
        assert_malformed(b"l5:helloi52e");
        assert_malformed(b"d3:foo3:bar");
        assert_malformed(b"l");
    }

    #[test]
    fn rejects_non_string_dictionary_key() {
        assert_malformed(b"di1e3:fooe");
        assert_malformed(b"dl1:ae3:fooe");
    }

    #[test]
    fn rejects_duplicate_dictionary_key() {
        assert_malformed(b"d1:ai1e1:ai2ee");
    }

    #[test]
    fn rejects_bad_integers() {
        assert_malformed(b"ie");
        assert_malformed(b"i12");
        assert_malformed(b"i1x2e");
        assert_malformed(b"i99999999999999999999e");
    }

    #[test]
    fn rejects_truncated_byte_string() {
        assert_malformed(b"10:short");
        assert_malformed(b"5hello");
    }

    #[test]
    fn rejects_empty_and_unknown_input() {
        assert_malformed(b"");
        assert_malformed(b"x");
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut input = vec![b'l'; MAX_DEPTH + 2];
        input.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert_malformed(&input);
    }

    #[test]
    fn encode_sorts_dictionary_keys() {
        let value = Value::dict()
            .insert("zoo", Value::Integer(1))
            .insert("bar", Value::List(vec![bytes("spam"), Value::Integer(-3)]));
        assert_eq!(value.encode(), b"d3:barl4:spami-3ee3:zooi1ee");
    }

    #[test]
    fn canonical_input_round_trips() {
        let inputs: [&[u8]; 4] = [
            b"d8:announce9:localhost4:infod6:lengthi3e4:name1:a12:piece lengthi1e6:pieces0:ee",
            b"ld1:ai0eei-7e0:e",
            b"d0:0:1:\x00i1ee",
            b"i-9223372036854775808e",
        ];
        for input in inputs {
            let (value, used) = decode(input).unwrap();
            assert_eq!(used, input.len());
            assert_eq!(encode(&value), input);
        }
    }

    #[test]
    fn serializes_to_json_shape() {
        let (value, _) = decode(b"d3:foo3:bar5:helloli52eee").unwrap();
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"foo":"bar","hello":[52]}"#);
    }
}
