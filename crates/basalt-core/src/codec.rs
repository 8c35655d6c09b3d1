//! The keyspace codec.
//!
//! Every piece of durable state lives in one flat ordered byte-keyed
//! store. Keys are partitioned by a leading type-tag byte so all keys
//! of a family are contiguous, and composite keys length-prefix the
//! user key so a range scan over one user key's entries terminates
//! exactly at the first entry of the next.
//!
//! Two encodings are order-preserving by construction: list indices
//! (biased two's complement, big-endian) and sorted-set scores
//! (sign-flipped IEEE-754, big-endian). For both, lexicographic order
//! on the encoded bytes equals numeric order on the value.

use crate::error::CommandError;

/// Key and meta-value type tags. Only append to this list; the values
/// are persisted.
pub mod tag {
    /// Prefix of per-user-key meta entries.
    pub const META_KEY: u8 = 0;
    /// Prefix of string payloads.
    pub const STRING_KEY: u8 = 1;
    /// Prefix of hash field payloads.
    pub const HASH_KEY: u8 = 2;
    /// Prefix of list element payloads.
    pub const LIST_KEY: u8 = 3;
    /// Prefix of set member payloads.
    pub const SET_KEY: u8 = 4;
    /// Prefix of the sorted-set member-to-score mapping.
    pub const ZSET_KEY: u8 = 5;
    /// Prefix of the score-ordered sorted-set index.
    pub const ZSCORE_KEY: u8 = 6;
    /// Meta discriminator: string.
    pub const STRING_LEN_VALUE: u8 = 7;
    /// Meta discriminator: hash.
    pub const HASH_LEN_VALUE: u8 = 8;
    /// Meta discriminator: list.
    pub const LIST_LEN_VALUE: u8 = 9;
    /// Meta discriminator: set.
    pub const SET_CARD_VALUE: u8 = 10;
    /// Meta discriminator: sorted set.
    pub const ZSET_CARD_VALUE: u8 = 11;
}

/// Builds the meta key for a user key.
pub fn meta_key(user: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + user.len());
    key.push(tag::META_KEY);
    key.extend_from_slice(user);
    key
}

/// Builds the payload key for a string value.
pub fn string_key(user: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + user.len());
    key.push(tag::STRING_KEY);
    key.extend_from_slice(user);
    key
}

/// Builds `family ‖ len(user) ‖ user`, the scan prefix for every entry
/// of one user key in a composite family.
fn composite_prefix(family: u8, user: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + user.len());
    key.push(family);
    key.extend_from_slice(&(user.len() as u32).to_be_bytes());
    key.extend_from_slice(user);
    key
}

/// Scan prefix for all fields of a hash.
pub fn hash_prefix(user: &[u8]) -> Vec<u8> {
    composite_prefix(tag::HASH_KEY, user)
}

/// Payload key for one hash field.
pub fn hash_field_key(user: &[u8], field: &[u8]) -> Vec<u8> {
    let mut key = hash_prefix(user);
    key.extend_from_slice(field);
    key
}

/// Scan prefix for all elements of a list.
pub fn list_prefix(user: &[u8]) -> Vec<u8> {
    composite_prefix(tag::LIST_KEY, user)
}

/// Payload key for the list element at `index`.
pub fn list_elem_key(user: &[u8], index: i64) -> Vec<u8> {
    let mut key = list_prefix(user);
    key.extend_from_slice(&encode_index(index));
    key
}

/// Scan prefix for all members of a set.
pub fn set_prefix(user: &[u8]) -> Vec<u8> {
    composite_prefix(tag::SET_KEY, user)
}

/// Payload key for one set member.
pub fn set_member_key(user: &[u8], member: &[u8]) -> Vec<u8> {
    let mut key = set_prefix(user);
    key.extend_from_slice(member);
    key
}

/// Scan prefix for the member-to-score mapping of a sorted set.
pub fn zset_prefix(user: &[u8]) -> Vec<u8> {
    composite_prefix(tag::ZSET_KEY, user)
}

/// Primary key for one sorted-set member. Its value is the encoded score.
pub fn zset_member_key(user: &[u8], member: &[u8]) -> Vec<u8> {
    let mut key = zset_prefix(user);
    key.extend_from_slice(member);
    key
}

/// Scan prefix for the score-ordered index of a sorted set.
pub fn zscore_prefix(user: &[u8]) -> Vec<u8> {
    composite_prefix(tag::ZSCORE_KEY, user)
}

/// Secondary index key for one `(score, member)` pair. Empty value.
pub fn zscore_key(user: &[u8], score: f64, member: &[u8]) -> Vec<u8> {
    let mut key = zscore_prefix(user);
    key.extend_from_slice(&encode_score(score));
    key.extend_from_slice(member);
    key
}

/// Seek position for the first secondary entry with score >= `score`.
pub fn zscore_seek(user: &[u8], score: f64) -> Vec<u8> {
    let mut key = zscore_prefix(user);
    key.extend_from_slice(&encode_score(score));
    key
}

/// Encodes a list index so byte order equals numeric order.
///
/// Flipping the sign bit maps the signed range onto the unsigned range
/// while preserving order.
pub fn encode_index(index: i64) -> [u8; 8] {
    ((index as u64) ^ (1 << 63)).to_be_bytes()
}

/// Inverse of [`encode_index`].
pub fn decode_index(raw: [u8; 8]) -> i64 {
    (u64::from_be_bytes(raw) ^ (1 << 63)) as i64
}

/// Encodes a score so byte order equals numeric order.
///
/// Positive floats get the sign bit flipped; negative floats get all
/// bits inverted. NaN never reaches this function: it is rejected when
/// arguments are parsed.
pub fn encode_score(score: f64) -> [u8; 8] {
    let bits = score.to_bits();
    let mapped = if bits & (1 << 63) == 0 {
        bits ^ (1 << 63)
    } else {
        !bits
    };
    mapped.to_be_bytes()
}

/// Inverse of [`encode_score`].
pub fn decode_score(raw: &[u8]) -> Result<f64, CommandError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| CommandError::InvalidData)?;
    let mapped = u64::from_be_bytes(bytes);
    let bits = if mapped & (1 << 63) != 0 {
        mapped ^ (1 << 63)
    } else {
        !mapped
    };
    Ok(f64::from_bits(bits))
}

/// Smallest byte string greater than every key starting with `prefix`,
/// used as the exclusive upper bound of a range delete.
///
/// Returns `None` for an all-0xFF prefix, which has no successor. Key
/// prefixes here always start with a type tag below 0xFF, so callers
/// treat `None` as corrupt input.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(out);
        }
        out.pop();
    }
    None
}

/// The decoded meta value of a user key: the value-type discriminator
/// plus the aggregate counters each type maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meta {
    /// String payload of `len` bytes.
    String { len: u64 },
    /// Hash with `count` fields.
    Hash { count: u64 },
    /// List of `count` elements occupying indices `head..tail`.
    List { count: u64, head: i64, tail: i64 },
    /// Set with `card` members.
    Set { card: u64 },
    /// Sorted set with `card` members.
    ZSet { card: u64 },
}

impl Meta {
    /// Serializes to the on-disk meta value.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Meta::String { len } => encode_counter(tag::STRING_LEN_VALUE, len),
            Meta::Hash { count } => encode_counter(tag::HASH_LEN_VALUE, count),
            Meta::List { count, head, tail } => {
                let mut out = encode_counter(tag::LIST_LEN_VALUE, count);
                out.extend_from_slice(&encode_index(head));
                out.extend_from_slice(&encode_index(tail));
                out
            }
            Meta::Set { card } => encode_counter(tag::SET_CARD_VALUE, card),
            Meta::ZSet { card } => encode_counter(tag::ZSET_CARD_VALUE, card),
        }
    }

    /// Decodes an on-disk meta value. A short value or unknown
    /// discriminator is invalid data.
    pub fn decode(raw: &[u8]) -> Result<Meta, CommandError> {
        let (&disc, rest) = raw.split_first().ok_or(CommandError::InvalidData)?;
        match disc {
            tag::STRING_LEN_VALUE => Ok(Meta::String {
                len: decode_counter(rest)?,
            }),
            tag::HASH_LEN_VALUE => Ok(Meta::Hash {
                count: decode_counter(rest)?,
            }),
            tag::LIST_LEN_VALUE => {
                if rest.len() != 24 {
                    return Err(CommandError::InvalidData);
                }
                let count = decode_counter(&rest[..8])?;
                let head = decode_index(rest[8..16].try_into().unwrap_or_default());
                let tail = decode_index(rest[16..24].try_into().unwrap_or_default());
                Ok(Meta::List { count, head, tail })
            }
            tag::SET_CARD_VALUE => Ok(Meta::Set {
                card: decode_counter(rest)?,
            }),
            tag::ZSET_CARD_VALUE => Ok(Meta::ZSet {
                card: decode_counter(rest)?,
            }),
            _ => Err(CommandError::InvalidData),
        }
    }

    /// The type name TYPE reports for this family.
    pub fn type_name(&self) -> &'static str {
        match self {
            Meta::String { .. } => "string",
            Meta::Hash { .. } => "hash",
            Meta::List { .. } => "list",
            Meta::Set { .. } => "set",
            Meta::ZSet { .. } => "zset",
        }
    }
}

fn encode_counter(disc: u8, n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(disc);
    out.extend_from_slice(&n.to_be_bytes());
    out
}

fn decode_counter(raw: &[u8]) -> Result<u64, CommandError> {
    let bytes: [u8; 8] = raw
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or(CommandError::InvalidData)?;
    Ok(u64::from_be_bytes(bytes))
}
