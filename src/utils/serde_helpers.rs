use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

/// Serialize fixed-size bytes as a `0x`-prefixed hex string for human-readable
/// formats (JSON chain files, TOML) and as raw bytes for bincode.
pub fn as_hex<S, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if s.is_human_readable() {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    } else {
        s.serialize_bytes(bytes)
    }
}

/// Inverse of [`as_hex`]; the `0x` prefix is optional.
pub fn from_hex<'de, D, const N: usize>(d: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    if d.is_human_readable() {
        let s = String::deserialize(d)?;
        decode_fixed_hex(&s).map_err(D::Error::custom)
    } else {
        let raw = Vec::<u8>::deserialize(d)?;
        raw.try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("expected {N} bytes, got {}", v.len())))
    }
}

/// Variable-length bytes as hex in human-readable formats.
pub fn bytes_as_hex<S>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if s.is_human_readable() {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    } else {
        s.serialize_bytes(bytes)
    }
}

pub fn bytes_from_hex<'de, D>(d: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    if d.is_human_readable() {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)
    } else {
        Vec::<u8>::deserialize(d)
    }
}

/// Parse `0x`-optional hex into exactly `N` bytes.
pub fn decode_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let raw = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    raw.try_into()
        .map_err(|v: Vec<u8>| format!("expected {N} bytes, got {}", v.len()))
}
