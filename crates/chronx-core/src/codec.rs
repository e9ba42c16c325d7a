//! Canonical length-prefixed list encoding (RLP-style).
//!
//! Every domain object defines a total serialization whose byte output is the
//! pre-image of its identifying hash. The wire form is deliberately simple:
//! strings (byte arrays) and lists, each length-prefixed, with no leading
//! zero bytes in integer fields and no non-minimal length headers — decoding
//! always enforces the canonical form, since a node that accepted a
//! non-canonical encoding for the same object would derive a different hash
//! for it than a node that didn't.

use crate::error::ChronxError;

/// One decoded RLP item: either an opaque byte string or a list of items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rlp {
    String(Vec<u8>),
    List(Vec<Rlp>),
}

impl Rlp {
    pub fn as_string(&self) -> Result<&[u8], ChronxError> {
        match self {
            Rlp::String(b) => Ok(b),
            Rlp::List(_) => Err(ChronxError::MalformedEncoding("expected string, got list".into())),
        }
    }

    pub fn as_list(&self) -> Result<&[Rlp], ChronxError> {
        match self {
            Rlp::List(items) => Ok(items),
            Rlp::String(_) => Err(ChronxError::MalformedEncoding("expected list, got string".into())),
        }
    }
}

/// Builds a canonical encoding incrementally.
#[derive(Default)]
pub struct RlpStream {
    items: Vec<Rlp>,
}

impl RlpStream {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.items.push(Rlp::String(bytes.to_vec()));
        self
    }

    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        self.append_bytes(&strip_leading_zeros(&value.to_be_bytes()));
        self
    }

    pub fn append_u128(&mut self, value: u128) -> &mut Self {
        self.append_bytes(&strip_leading_zeros(&value.to_be_bytes()));
        self
    }

    pub fn append_list(&mut self, sub: Rlp) -> &mut Self {
        self.items.push(sub);
        self
    }

    /// Append anything that implements `Encodable` as a nested item.
    pub fn append<T: Encodable>(&mut self, value: &T) -> &mut Self {
        self.items.push(value.to_rlp());
        self
    }

    /// Append a homogeneous list of encodable items as a single nested list.
    pub fn append_list_of<T: Encodable>(&mut self, values: &[T]) -> &mut Self {
        let sub = Rlp::List(values.iter().map(|v| v.to_rlp()).collect());
        self.items.push(sub);
        self
    }

    pub fn finish_rlp(self) -> Rlp {
        Rlp::List(self.items)
    }

    /// Serialize the built list to canonical bytes.
    pub fn out(self) -> Vec<u8> {
        encode(&self.finish_rlp())
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(idx) => bytes[idx..].to_vec(),
        None => Vec::new(),
    }
}

/// Trait implemented by every domain object with a canonical encoding.
pub trait Encodable {
    fn to_rlp(&self) -> Rlp;

    fn to_canonical_bytes(&self) -> Vec<u8> {
        encode(&self.to_rlp())
    }
}

/// Trait implemented by every domain object decodable from the canonical form.
pub trait Decodable: Sized {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError>;

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, ChronxError> {
        let (rlp, rest) = decode_one(bytes)?;
        if !rest.is_empty() {
            return Err(ChronxError::MalformedEncoding("trailing bytes after top-level item".into()));
        }
        Self::from_rlp(&rlp)
    }
}

// ── Wire encoding ──────────────────────────────────────────────────────────

const STRING_SHORT: u8 = 0x80; // 0x80..=0xb7 : short string, length in tag
const STRING_LONG: u8 = 0xb8; // 0xb8..=0xbf : long string, length-of-length
const LIST_SHORT: u8 = 0xc0; // 0xc0..=0xf7 : short list
const LIST_LONG: u8 = 0xf8; // 0xf8..=0xff : long list

pub fn encode(rlp: &Rlp) -> Vec<u8> {
    match rlp {
        Rlp::String(bytes) => encode_string(bytes),
        Rlp::List(items) => {
            let mut payload = Vec::new();
            for item in items {
                payload.extend(encode(item));
            }
            encode_header(LIST_SHORT, LIST_LONG, payload.len()).into_iter().chain(payload).collect()
        }
    }
}

fn encode_string(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < STRING_SHORT {
        return vec![bytes[0]];
    }
    let mut out = encode_header(STRING_SHORT, STRING_LONG, bytes.len());
    out.extend_from_slice(bytes);
    out
}

fn encode_header(short_base: u8, long_base: u8, len: usize) -> Vec<u8> {
    if len < 56 {
        vec![short_base + len as u8]
    } else {
        let len_bytes = strip_leading_zeros(&len.to_be_bytes());
        let mut out = vec![long_base + len_bytes.len() as u8];
        out.extend(len_bytes);
        out
    }
}

/// Decode exactly one RLP item from the front of `bytes`, returning it and
/// the unconsumed remainder. Always enforces the canonical form: no leading
/// zero bytes in what would be an integer string, no non-minimal length
/// headers.
pub fn decode_one(bytes: &[u8]) -> Result<(Rlp, &[u8]), ChronxError> {
    let tag = *bytes.first().ok_or_else(|| ChronxError::MalformedEncoding("empty input".into()))?;

    if tag < STRING_SHORT {
        return Ok((Rlp::String(vec![tag]), &bytes[1..]));
    }

    if tag < STRING_LONG {
        let len = (tag - STRING_SHORT) as usize;
        let (data, rest) = take(bytes, 1, len)?;
        if len == 1 && data[0] < STRING_SHORT {
            return Err(ChronxError::MalformedEncoding("non-minimal single-byte string".into()));
        }
        return Ok((Rlp::String(data.to_vec()), rest));
    }

    if tag < LIST_SHORT {
        let len_of_len = (tag - STRING_LONG) as usize;
        let (len_bytes, after_len) = take(bytes, 1, len_of_len)?;
        check_no_leading_zero(len_bytes)?;
        let len = be_bytes_to_usize(len_bytes)?;
        if len < 56 {
            return Err(ChronxError::MalformedEncoding("long string encoded with short-form length".into()));
        }
        let (data, rest) = take(after_len, 0, len)?;
        return Ok((Rlp::String(data.to_vec()), rest));
    }

    if tag < LIST_LONG {
        let len = (tag - LIST_SHORT) as usize;
        let (mut payload, rest) = take(bytes, 1, len)?;
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, remainder) = decode_one(payload)?;
            items.push(item);
            payload = remainder;
        }
        return Ok((Rlp::List(items), rest));
    }

    let len_of_len = (tag - LIST_LONG) as usize;
    let (len_bytes, after_len) = take(bytes, 1, len_of_len)?;
    check_no_leading_zero(len_bytes)?;
    let len = be_bytes_to_usize(len_bytes)?;
    if len < 56 {
        return Err(ChronxError::MalformedEncoding("long list encoded with short-form length".into()));
    }
    let (mut payload, rest) = take(after_len, 0, len)?;
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, remainder) = decode_one(payload)?;
        items.push(item);
        payload = remainder;
    }
    Ok((Rlp::List(items), rest))
}

fn take(bytes: &[u8], skip: usize, len: usize) -> Result<(&[u8], &[u8]), ChronxError> {
    if bytes.len() < skip + len {
        return Err(ChronxError::MalformedEncoding("truncated input".into()));
    }
    Ok((&bytes[skip..skip + len], &bytes[skip + len..]))
}

fn check_no_leading_zero(bytes: &[u8]) -> Result<(), ChronxError> {
    if bytes.first() == Some(&0) {
        return Err(ChronxError::MalformedEncoding("leading zero byte in length".into()));
    }
    Ok(())
}

fn be_bytes_to_usize(bytes: &[u8]) -> Result<usize, ChronxError> {
    if bytes.len() > 8 {
        return Err(ChronxError::MalformedEncoding("length field too wide".into()));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf) as usize)
}

pub fn decode_u64(rlp: &Rlp) -> Result<u64, ChronxError> {
    let bytes = rlp.as_string()?;
    if bytes.len() > 8 {
        return Err(ChronxError::MalformedEncoding("u64 field too wide".into()));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

pub fn decode_u128(rlp: &Rlp) -> Result<u128, ChronxError> {
    let bytes = rlp.as_string()?;
    if bytes.len() > 16 {
        return Err(ChronxError::MalformedEncoding("u128 field too wide".into()));
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(u128::from_be_bytes(buf))
}

pub fn decode_fixed<const N: usize>(rlp: &Rlp) -> Result<[u8; N], ChronxError> {
    let bytes = rlp.as_string()?;
    if bytes.len() != N {
        return Err(ChronxError::MalformedEncoding(format!("expected {N}-byte field, got {}", bytes.len())));
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_list() {
        let rlp = Rlp::List(vec![]);
        let bytes = encode(&rlp);
        let (decoded, rest) = decode_one(&bytes).unwrap();
        assert_eq!(decoded, rlp);
        assert!(rest.is_empty());
    }

    #[test]
    fn round_trips_nested_list_of_strings() {
        let rlp = Rlp::List(vec![
            Rlp::String(vec![1, 2, 3]),
            Rlp::List(vec![Rlp::String(vec![]), Rlp::String(vec![0xff; 60])]),
        ]);
        let bytes = encode(&rlp);
        let (decoded, rest) = decode_one(&bytes).unwrap();
        assert_eq!(decoded, rlp);
        assert!(rest.is_empty());
    }

    #[test]
    fn u64_strips_leading_zeros_on_encode() {
        let mut s = RlpStream::new();
        s.append_u64(0);
        let rlp = s.finish_rlp();
        match &rlp {
            Rlp::List(items) => assert_eq!(items[0], Rlp::String(vec![])),
            _ => unreachable!(),
        }
    }

    #[test]
    fn rejects_leading_zero_length() {
        // Build a long-string header whose length bytes contain a leading zero.
        let mut bytes = vec![STRING_LONG + 2, 0x00, 56];
        bytes.extend(vec![0u8; 56]);
        assert!(decode_one(&bytes).is_err());
    }

    #[test]
    fn single_byte_below_0x80_is_its_own_encoding() {
        let rlp = Rlp::String(vec![0x42]);
        assert_eq!(encode(&rlp), vec![0x42]);
    }
}
