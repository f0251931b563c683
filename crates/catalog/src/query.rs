//! Typed query operations over a loaded catalog.

use std::fmt;
use std::str::FromStr;

use crate::{BaseType, Catalog, Error, Record, Result};

/// Default number of records returned by a threshold query.
pub const DEFAULT_THRESHOLD_LIMIT: usize = 10;

/// Default number of records returned by a category query.
pub const DEFAULT_CATEGORY_LIMIT: usize = 5;

const CHOCOLATE: &str = "chocolate";
const LOW_VEG_FAT_VARIANT: &str = "< 5% veg fat";

/// Comparison operator for threshold queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Whether `lhs <op> rhs` holds.
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparison {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" | "==" => Ok(Self::Eq),
            "<" => Ok(Self::Lt),
            "<=" | "≤" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" | "≥" => Ok(Self::Ge),
            other => Err(Error::InvalidOperator(other.to_string())),
        }
    }
}

/// Result of a category query.
#[derive(Debug, Clone)]
pub struct CategoryMatches<'a> {
    /// Records passing every stage, including the identifier prefix check.
    pub matches: Vec<&'a Record>,
    /// Records passing the first three stages whose identifier lacks the
    /// expected prefix.
    pub flagged: Vec<&'a Record>,
    pub expected_prefix: &'static str,
}

impl CategoryMatches<'_> {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.flagged.is_empty()
    }
}

impl Catalog {
    /// Records whose `field` satisfies `record[field] <op> value`, in store
    /// order. Records without the measure never match.
    pub fn query_by_threshold(
        &self,
        field: &str,
        op: Comparison,
        value: f64,
        limit: Option<usize>,
    ) -> Result<Vec<&Record>> {
        let records = self.records()?;
        if field.trim().is_empty() {
            return Err(Error::MissingParameter("field"));
        }
        let limit = resolve_limit(limit, DEFAULT_THRESHOLD_LIMIT)?;

        Ok(records
            .iter()
            .filter(|r| r.measure(field).is_some_and(|m| op.holds(m, value)))
            .take(limit)
            .collect())
    }

    /// Chocolate products of one base type whose moulding contains
    /// `subtype`, case-insensitively.
    ///
    /// Filters run in order: chocolate category, base type, moulding
    /// substring, identifier prefix. Records failing only the prefix stage
    /// are reported in [`CategoryMatches::flagged`]. Both lists are capped
    /// at `limit`.
    pub fn query_by_category(
        &self,
        base: BaseType,
        subtype: &str,
        limit: Option<usize>,
    ) -> Result<CategoryMatches<'_>> {
        let records = self.records()?;
        let needle = subtype.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::MissingParameter("moulding_type"));
        }
        let limit = resolve_limit(limit, DEFAULT_CATEGORY_LIMIT)?;
        let expected_prefix = base.prefix();

        let candidates = records
            .iter()
            .filter(|r| r.category.as_deref().is_some_and(is_chocolate))
            .filter(|r| {
                r.base_type
                    .as_deref()
                    .is_some_and(|b| b.eq_ignore_ascii_case(base.as_str()))
            })
            .filter(|r| {
                r.moulding
                    .as_deref()
                    .is_some_and(|m| m.to_lowercase().contains(&needle))
            });

        let mut matches = Vec::new();
        let mut flagged = Vec::new();
        for record in candidates {
            let bucket = if record.id.starts_with(expected_prefix) {
                &mut matches
            } else {
                &mut flagged
            };
            if bucket.len() < limit {
                bucket.push(record);
            }
            if matches.len() == limit && flagged.len() == limit {
                break;
            }
        }

        Ok(CategoryMatches {
            matches,
            flagged,
            expected_prefix,
        })
    }
}

/// Pure chocolate, or the bounded vegetable-fat variant.
fn is_chocolate(category: &str) -> bool {
    let lower = category.to_lowercase();
    lower.contains(CHOCOLATE) && (lower == CHOCOLATE || lower.contains(LOW_VEG_FAT_VARIANT))
}

fn resolve_limit(limit: Option<usize>, default: usize) -> Result<usize> {
    match limit {
        None => Ok(default),
        Some(0) => Err(Error::InvalidLimit),
        Some(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DedupPolicy;

    const ROWS: &str = r#"
{"Material_Code":"CHD-A","Product_Type":"Chocolate","Base_Type":"Dark","Moulding_Type":"Callets","Fat":38}
{"Material_Code":"CHD-B","Product_Type":"Chocolate with < 5% Veg Fat","Base_Type":"dark","Moulding_Type":"Mini Callets","Fat":9}
{"Material_Code":"CHD-C","Product_Type":"Chocolate","Base_Type":"Dark","Moulding_Type":"Blocks","Fat":12}
{"Material_Code":"CHD-D","Product_Type":"Compound chocolate","Base_Type":"Dark","Moulding_Type":"Callets","Fat":25}
{"Material_Code":"CHM-A","Product_Type":"Chocolate","Base_Type":"Milk","Moulding_Type":"Callets","Fat":36}
{"Material_Code":"CHM-X","Product_Type":"Chocolate","Base_Type":"Dark","Moulding_Type":"callets","Fat":20}
{"Material_Code":"CHW-A","Product_Type":"Chocolate","Base_Type":"White","Moulding_Type":"Callets","Fat":10}
{"Material_Code":"FIL-A","Product_Type":"Filling","Fat":50}
{"Material_Code":"NOFAT","Product_Type":"Chocolate"}
"#;

    fn catalog() -> Catalog {
        Catalog::load_from(ROWS.as_bytes(), &DedupPolicy::default()).unwrap()
    }

    fn ids(records: &[&Record]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn operator_tokens() {
        assert_eq!("==".parse::<Comparison>().unwrap(), Comparison::Eq);
        assert_eq!("=".parse::<Comparison>().unwrap(), Comparison::Eq);
        assert_eq!("≤".parse::<Comparison>().unwrap(), Comparison::Le);
        assert_eq!(">=".parse::<Comparison>().unwrap(), Comparison::Ge);
        assert!(matches!(
            "!=".parse::<Comparison>(),
            Err(Error::InvalidOperator(op)) if op == "!="
        ));
    }

    #[test]
    fn greater_than_is_strict_and_in_store_order() {
        let catalog = catalog();
        let found = catalog
            .query_by_threshold("Fat", Comparison::Gt, 12.0, None)
            .unwrap();
        assert_eq!(ids(&found), ["CHD-A", "CHD-D", "CHM-A", "CHM-X", "FIL-A"]);
        assert!(found.iter().all(|r| r.measure("Fat").unwrap() > 12.0));
    }

    #[test]
    fn threshold_truncates_at_limit() {
        let catalog = catalog();
        let found = catalog
            .query_by_threshold("Fat", Comparison::Ge, 0.0, Some(3))
            .unwrap();
        assert_eq!(ids(&found), ["CHD-A", "CHD-B", "CHD-C"]);
    }

    #[test]
    fn threshold_default_limit_is_ten() {
        let rows: String = (0..15)
            .map(|i| format!("{{\"Material_Code\":\"R{i:02}\",\"Fat\":{i}}}\n"))
            .collect();
        let catalog = Catalog::load_from(rows.as_bytes(), &DedupPolicy::default()).unwrap();
        let found = catalog
            .query_by_threshold("Fat", Comparison::Ge, 0.0, None)
            .unwrap();
        assert_eq!(found.len(), DEFAULT_THRESHOLD_LIMIT);
    }

    #[test]
    fn threshold_rejects_zero_limit() {
        let catalog = catalog();
        let result = catalog.query_by_threshold("Fat", Comparison::Gt, 1.0, Some(0));
        assert!(matches!(result, Err(Error::InvalidLimit)));
    }

    #[test]
    fn empty_match_is_not_an_error() {
        let catalog = catalog();
        let found = catalog
            .query_by_threshold("Fat", Comparison::Gt, 1000.0, None)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn category_query_matches_and_flags() {
        let catalog = catalog();
        let result = catalog
            .query_by_category(BaseType::Dark, "callets", Some(5))
            .unwrap();

        assert_eq!(ids(&result.matches), ["CHD-A", "CHD-B"]);
        assert_eq!(ids(&result.flagged), ["CHM-X"]);
        assert_eq!(result.expected_prefix, "CHD-");
        assert!(result.matches.iter().all(|r| r.id.starts_with("CHD-")));
    }

    #[test]
    fn category_query_respects_limit() {
        let catalog = catalog();
        let result = catalog
            .query_by_category(BaseType::Dark, "callets", Some(1))
            .unwrap();
        assert_eq!(ids(&result.matches), ["CHD-A"]);
        assert_eq!(ids(&result.flagged), ["CHM-X"]);
    }

    #[test]
    fn category_query_without_hits_is_empty() {
        let catalog = catalog();
        let result = catalog
            .query_by_category(BaseType::White, "drops", None)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn category_requires_subtype() {
        let catalog = catalog();
        let result = catalog.query_by_category(BaseType::Milk, "  ", None);
        assert!(matches!(result, Err(Error::MissingParameter("moulding_type"))));
    }

    #[test]
    fn queries_fail_when_not_ready() {
        let catalog = Catalog::not_ready();
        assert!(matches!(
            catalog.query_by_threshold("Fat", Comparison::Gt, 1.0, None),
            Err(Error::NotReady)
        ));
        assert!(matches!(
            catalog.query_by_category(BaseType::Dark, "callets", None),
            Err(Error::NotReady)
        ));
    }

    #[test]
    fn chocolate_category_variants() {
        assert!(is_chocolate("Chocolate"));
        assert!(is_chocolate("CHOCOLATE WITH < 5% VEG FAT"));
        assert!(!is_chocolate("Compound chocolate"));
        assert!(!is_chocolate("Filling"));
    }
}
