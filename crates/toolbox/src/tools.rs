//! The catalog tools and their text output.

use std::fmt::Write as _;

use catalog::{
    BaseType, Catalog, Comparison, DEFAULT_CATEGORY_LIMIT, DEFAULT_THRESHOLD_LIMIT, Record,
};
use mcp::{PropertySchema, ToolDefinition};

use crate::{Arguments, Handler, ToolError};

pub const QUERY_SKUS_BY_FAT: &str = "query_skus_by_fat";
pub const QUERY_CHOCOLATE_PRODUCTS: &str = "query_chocolate_products";

/// Long descriptions are cut to this many characters, ellipsis included.
pub const DESCRIPTION_BUDGET: usize = 500;

const FAT: &str = "Fat";

pub(crate) fn builtin() -> Vec<(ToolDefinition, Handler)> {
    vec![
        (skus_by_fat_definition(), query_skus_by_fat),
        (chocolate_products_definition(), query_chocolate_products),
    ]
}

fn result_count(default: usize) -> PropertySchema {
    PropertySchema::integer()
        .describe("Number of results to return")
        .minimum(1.0)
        .default_value(default)
}

fn skus_by_fat_definition() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_SKUS_BY_FAT,
        "Query Material_Code (SKUs) based on fat content with comparison operators (==, <, <=, >, >=)",
    )
    .param("n", result_count(DEFAULT_THRESHOLD_LIMIT), false)
    .param(
        "fat_value",
        PropertySchema::number().describe("Fat content threshold value (in grams)"),
        true,
    )
    .param(
        "operator",
        PropertySchema::string()
            .describe("Comparison operator to use")
            .one_of(["==", "<", "<=", ">", ">="])
            .default_value(">"),
        false,
    )
}

fn chocolate_products_definition() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_CHOCOLATE_PRODUCTS,
        "Search for chocolate products by type (Dark/Milk/White) and moulding type (e.g., callets). Validates Material_Code prefix.",
    )
    .param("n", result_count(DEFAULT_CATEGORY_LIMIT), false)
    .param(
        "chocolate_type",
        PropertySchema::string()
            .describe("Type of chocolate base")
            .one_of(BaseType::ALL.map(BaseType::as_str)),
        true,
    )
    .param(
        "moulding_type",
        PropertySchema::string().describe(
            "Moulding type to search for, matched as a substring (e.g. 'callets', 'chips', 'blocks', 'drops')",
        ),
        true,
    )
}

fn query_skus_by_fat(catalog: &Catalog, args: &Arguments) -> Result<String, ToolError> {
    let value = args.number("fat_value")?;
    let op: Comparison = args.text("operator")?.parse()?;
    let limit = args.count("n")?;

    let records = catalog.query_by_threshold(FAT, op, value, Some(limit))?;
    if records.is_empty() {
        return Ok(format!("No SKUs found where {FAT} {op} {value}g"));
    }

    let mut out = format!("Found {} SKU(s) where {FAT} {op} {value}g:\n", records.len());
    for record in records {
        let fat = record.measure(FAT).unwrap_or_default();
        let _ = write!(out, "\n- {} ({FAT}: {fat}g)", record.id);
        push_details(&mut out, record, false);
    }
    Ok(out)
}

fn query_chocolate_products(catalog: &Catalog, args: &Arguments) -> Result<String, ToolError> {
    let base: BaseType = args.text("chocolate_type")?.parse()?;
    let moulding = args.text("moulding_type")?;
    let limit = args.count("n")?;

    let found = catalog.query_by_category(base, moulding, Some(limit))?;
    let mut out = if found.matches.is_empty() {
        format!("No {base} chocolate products found with moulding type '{moulding}'")
    } else {
        format!(
            "Found {} {base} chocolate product(s) with moulding type '{moulding}':\n",
            found.matches.len()
        )
    };

    for record in &found.matches {
        let _ = write!(out, "\n- {}", record.id);
        push_details(&mut out, record, true);
    }

    if !found.flagged.is_empty() {
        let _ = write!(
            out,
            "\n\n{} record(s) failed prefix validation (expected {}):\n",
            found.flagged.len(),
            found.expected_prefix
        );
        for record in &found.flagged {
            let _ = write!(out, "\n- {} [invalid prefix]", record.id);
            push_details(&mut out, record, true);
        }
    }
    Ok(out)
}

fn push_details(out: &mut String, record: &Record, with_classification: bool) {
    let _ = write!(out, "\n  {}", record.label.as_deref().unwrap_or("N/A"));
    if with_classification {
        let _ = write!(
            out,
            "\n  Base: {} | Moulding: {}",
            record.base_type.as_deref().unwrap_or("N/A"),
            record.moulding.as_deref().unwrap_or("N/A")
        );
    }
    if let Some(description) = &record.description {
        let _ = write!(out, "\n  {}", truncate_description(description));
    }
}

/// Cut `text` to [`DESCRIPTION_BUDGET`] characters, ending in `...` when
/// anything was removed.
pub fn truncate_description(text: &str) -> String {
    truncate_chars(text, DESCRIPTION_BUDGET)
}

pub(crate) fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(budget.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
