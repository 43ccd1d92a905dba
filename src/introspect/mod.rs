//! Metadata Discovery
//!
//! Catalog, schema and table discovery expressed as plain SQL run through the
//! [`QueryExecutor`], so every metadata call passes the same classifier, pool and
//! deadline as an ad-hoc query.
//!
//! | Operation | Statement | Projected column |
//! |---|---|---|
//! | list catalogs | `SHOW CATALOGS` | `Catalog` |
//! | list schemas | `SHOW SCHEMAS FROM <catalog>` | `Schema` |
//! | list tables | `SHOW TABLES FROM <catalog>.<schema>` | `Table` |
//! | table schema | `DESCRIBE <catalog>.<schema>.<table>` | none (raw rows) |
//!
//! Identifiers are interpolated verbatim. They are not quoted or escaped, so a caller
//! can still pass a quoted identifier like `"My Table"` through unchanged.

use std::fmt;

use serde::Serialize;

use crate::config::Configuration;
use crate::engine::{Connector, QueryExecutor, QueryResult};
use crate::error::Result;

/// A fully qualified `catalog.schema.table` name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualifiedTable {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Fills absent catalog/schema parts from the configured defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierResolver {
    default_catalog: String,
    default_schema: String,
}

impl IdentifierResolver {
    pub fn new(default_catalog: impl Into<String>, default_schema: impl Into<String>) -> Self {
        Self { default_catalog: default_catalog.into(), default_schema: default_schema.into() }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.catalog.clone(), config.schema.clone())
    }

    pub fn catalog_or_default<'a>(&'a self, catalog: &'a str) -> &'a str {
        if catalog.is_empty() {
            &self.default_catalog
        } else {
            catalog
        }
    }

    pub fn schema_or_default<'a>(&'a self, schema: &'a str) -> &'a str {
        if schema.is_empty() {
            &self.default_schema
        } else {
            schema
        }
    }

    /// Resolve a possibly dotted table name
    ///
    /// - `c.s.t`: used verbatim, explicit `catalog`/`schema` are ignored
    /// - `s.t`: schema from the name, catalog from `catalog` or the default
    /// - `t`: catalog and schema from the arguments or the defaults
    ///
    /// Empty strings count as absent. Names with more than two dots split on the first
    /// two, leaving the remainder in the table part.
    #[must_use]
    pub fn resolve(&self, catalog: &str, schema: &str, table: &str) -> QualifiedTable {
        let parts: Vec<&str> = table.splitn(3, '.').collect();

        let (catalog, schema, table) = match parts.as_slice() {
            [c, s, t] => (*c, *s, *t),
            [s, t] => (self.catalog_or_default(catalog), *s, *t),
            _ => (self.catalog_or_default(catalog), self.schema_or_default(schema), table),
        };

        QualifiedTable { catalog: catalog.to_string(), schema: schema.to_string(), table: table.to_string() }
    }
}

/// Metadata facade over a query executor
pub struct Introspector<'a, C: Connector> {
    executor: &'a QueryExecutor<C>,
    resolver: &'a IdentifierResolver,
}

impl<'a, C: Connector> Introspector<'a, C> {
    pub fn new(executor: &'a QueryExecutor<C>, resolver: &'a IdentifierResolver) -> Self {
        Self { executor, resolver }
    }

    /// List all catalogs
    pub async fn list_catalogs(&self) -> Result<Vec<String>> {
        let result = self.executor.execute("SHOW CATALOGS").await?;
        Ok(result.project("Catalog"))
    }

    /// List schemas in a catalog (empty for the default catalog)
    pub async fn list_schemas(&self, catalog: &str) -> Result<Vec<String>> {
        let catalog = self.resolver.catalog_or_default(catalog);
        let result = self.executor.execute(&format!("SHOW SCHEMAS FROM {catalog}")).await?;
        Ok(result.project("Schema"))
    }

    /// List tables in a schema (empty parts use the defaults)
    pub async fn list_tables(&self, catalog: &str, schema: &str) -> Result<Vec<String>> {
        let catalog = self.resolver.catalog_or_default(catalog);
        let schema = self.resolver.schema_or_default(schema);
        let result = self.executor.execute(&format!("SHOW TABLES FROM {catalog}.{schema}")).await?;
        Ok(result.project("Table"))
    }

    /// Describe a table's columns, returning the engine's rows unprojected
    pub async fn table_schema(&self, catalog: &str, schema: &str, table: &str) -> Result<QueryResult> {
        let qualified = self.resolver.resolve(catalog, schema, table);
        self.executor.execute(&format!("DESCRIBE {qualified}")).await
    }
}
