use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};
use thiserror::Error;

const HEX_LEN: usize = 64;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ParseIdError {
    #[error("handle is empty")]
    Empty,
    #[error("handle `{0}` is longer than 32 bytes")]
    TooLong(String),
    #[error("handle `{0}` is not valid hex")]
    NotHex(String),
}

/// Normalises `0x6`, `6`, `0X00..06` into the canonical `0x` + 64 lowercase hex form.
fn normalize_hex(raw: &str) -> Result<String, ParseIdError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(ParseIdError::Empty);
    }
    if digits.len() > HEX_LEN {
        return Err(ParseIdError::TooLong(raw.to_string()));
    }
    let padded = format!("{:0>width$}", digits.to_ascii_lowercase(), width = HEX_LEN);
    hex::decode(&padded).map_err(|_| ParseIdError::NotHex(raw.to_string()))?;
    Ok(format!("0x{padded}"))
}

/// Opaque handle of an object living on the ledger.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

/// Account identity (the same 32-byte encoding as object handles).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for status lines, e.g. `0x1234..cdef`.
    pub fn short(&self) -> String {
        shorten(&self.0)
    }
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> String {
        shorten(&self.0)
    }
}

fn shorten(full: &str) -> String {
    let body = full.trim_start_matches("0x").trim_start_matches('0');
    if body.len() <= 8 {
        return format!("0x{body}");
    }
    format!("0x{}..{}", &body[..4], &body[body.len() - 4..])
}

impl FromStr for ObjectId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_hex(s).map(Self)
    }
}

impl FromStr for Address {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_hex(s).map(Self)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Address {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Move struct type tag such as `0xabc::tile_game_core::Game` or
/// `0x2::coin::Coin<0x2::sui::SUI>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StructTag {
    pub address: String,
    pub module: String,
    pub name: String,
}

impl StructTag {
    pub fn parse(raw: &str) -> Option<Self> {
        let base = raw.split('<').next()?.trim();
        let mut parts = base.split("::");
        let address = parts.next()?.to_string();
        let module = parts.next()?.to_string();
        let name = parts.next()?.to_string();
        if parts.next().is_some() || address.is_empty() || module.is_empty() || name.is_empty()
        {
            return None;
        }
        Some(Self {
            address,
            module,
            name,
        })
    }

    pub fn is(&self, module: &str, name: &str) -> bool {
        self.module == module && self.name == name
    }
}

/// True when `raw` is a type tag for `module::name`, ignoring the package address
/// and any generic parameters.
pub fn type_matches(raw: &str, module: &str, name: &str) -> bool {
    StructTag::parse(raw).is_some_and(|tag| tag.is(module, name))
}
