//! Record types for the product catalog.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Chocolate base classification.
///
/// Each base type owns a canonical identifier prefix; a record whose
/// identifier does not carry the prefix of its base type fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Dark,
    Milk,
    White,
}

impl BaseType {
    pub const ALL: [BaseType; 3] = [BaseType::Dark, BaseType::Milk, BaseType::White];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "Dark",
            Self::Milk => "Milk",
            Self::White => "White",
        }
    }

    /// Identifier prefix expected for records of this base type.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Dark => "CHD-",
            Self::Milk => "CHM-",
            Self::White => "CHW-",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|base| base.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownBaseType(s.to_string()))
    }
}

/// A canonical product after deduplication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Unique material code, e.g. `CHD-N811NV-E4`.
    pub id: String,
    pub category: Option<String>,
    pub base_type: Option<String>,
    pub moulding: Option<String>,
    /// Legislation region the row was published under.
    pub region: Option<String>,
    /// Short material description.
    pub label: Option<String>,
    /// Long free-text description.
    pub description: Option<String>,
    pub measures: BTreeMap<String, f64>,
}

impl Record {
    /// Look up a numeric measure, preferring an exact name match.
    pub fn measure(&self, field: &str) -> Option<f64> {
        self.measures.get(field).copied().or_else(|| {
            self.measures
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(field))
                .map(|(_, value)| *value)
        })
    }

    pub(crate) fn from_raw(raw: RawRow) -> Option<Self> {
        let id = raw.id?;
        let measures = raw
            .extra
            .into_iter()
            .filter_map(|(name, value)| numeric(&value).map(|n| (name, n)))
            .collect();

        Some(Self {
            id,
            category: raw.category,
            base_type: raw.base_type,
            moulding: raw.moulding,
            region: raw.region,
            label: raw.label,
            description: raw.description,
            measures,
        })
    }
}

/// A row as it appears in the source, before deduplication.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawRow {
    #[serde(rename = "Material_Code", default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(rename = "Product_Type", default, deserialize_with = "lenient_string")]
    category: Option<String>,
    #[serde(rename = "Base_Type", default, deserialize_with = "lenient_string")]
    base_type: Option<String>,
    #[serde(rename = "Moulding_Type", default, deserialize_with = "lenient_string")]
    moulding: Option<String>,
    #[serde(rename = "Legislation", default, deserialize_with = "lenient_string")]
    region: Option<String>,
    #[serde(
        rename = "Material_Description",
        default,
        deserialize_with = "lenient_string"
    )]
    label: Option<String>,
    #[serde(rename = "Description", default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Accepts strings, numbers and booleans; blank strings and nulls become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
