//! Tool registry and router for the catalog tool service.
//!
//! The [`ToolRegistry`] is an ordered list of [`mcp::ToolDefinition`]s, each
//! bound to a plain function [`Handler`]. The [`ToolRouter`] looks calls up
//! by name, validates arguments into [`Arguments`], runs the handler and
//! folds any [`ToolError`] into an error-flagged result. It implements
//! [`mcp::ToolService`], so it can be served directly.

mod args;
mod error;
mod registry;
mod router;
mod tools;

pub use args::{ArgValue, Arguments};
pub use error::ToolError;
pub use registry::{Handler, RegisteredTool, ToolRegistry};
pub use router::ToolRouter;
pub use tools::{DESCRIPTION_BUDGET, QUERY_CHOCOLATE_PRODUCTS, QUERY_SKUS_BY_FAT, truncate_description};
