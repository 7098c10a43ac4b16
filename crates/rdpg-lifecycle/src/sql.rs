//! SQL sent through the application's `/exec` endpoint
//!
//! Schema and table names are random letter-first identifiers and are left
//! unquoted, so the database folds them to lower case. Keys are quoted
//! values and keep their case.

use crate::identifier::Identifier;

/// Built-in namespace every database has
pub const DEFAULT_SCHEMA: &str = "public";

/// Width of the `key` column; keys longer than this do not fit
pub const KEY_COLUMN_WIDTH: usize = 255;

/// One inserted row: a random key and its integer value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowValue {
    /// Row key
    pub key: Identifier,
    /// Current value
    pub value: i64,
}

impl RowValue {
    /// Create a row
    #[inline]
    #[must_use]
    pub fn new(key: Identifier, value: i64) -> Self {
        Self { key, value }
    }

    /// Same key, value plus one
    #[inline]
    #[must_use]
    pub fn incremented(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value + 1,
        }
    }
}

/// Namespace exercised by one CRUD sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaTarget {
    /// The pre-existing `public` schema
    Default,
    /// A schema created for this run
    Created(Identifier),
}

impl SchemaTarget {
    /// Schema name as used in SQL
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SchemaTarget::Default => DEFAULT_SCHEMA,
            SchemaTarget::Created(name) => name.as_str(),
        }
    }

    /// Whether this is the built-in schema
    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, SchemaTarget::Default)
    }

    /// `CREATE SCHEMA`, or `None` for the built-in schema
    #[must_use]
    pub fn create_statement(&self) -> Option<String> {
        match self {
            SchemaTarget::Default => None,
            SchemaTarget::Created(name) => Some(format!("CREATE SCHEMA {name};")),
        }
    }

    /// `DROP SCHEMA`, or `None` for the built-in schema
    #[must_use]
    pub fn drop_statement(&self) -> Option<String> {
        match self {
            SchemaTarget::Default => None,
            SchemaTarget::Created(name) => Some(format!("DROP SCHEMA {name};")),
        }
    }

    /// Catalog query that returns a row while the schema exists
    ///
    /// The catalog stores the folded name, so the lookup is lower-cased.
    #[must_use]
    pub fn catalog_lookup(&self) -> String {
        format!(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name='{}';",
            self.name().to_ascii_lowercase()
        )
    }

    /// Table `name` inside this schema
    #[must_use]
    pub fn table(&self, name: Identifier) -> TableRef {
        TableRef {
            schema: self.name().to_string(),
            name,
        }
    }
}

impl std::fmt::Display for SchemaTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Schema-qualified table with a `(key, value)` layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: String,
    name: Identifier,
}

impl TableRef {
    /// `schema.table`
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// `CREATE TABLE` with a unique text key and an integer value
    #[must_use]
    pub fn create(&self) -> String {
        format!(
            "CREATE TABLE {} (key varchar({KEY_COLUMN_WIDTH}) PRIMARY KEY, value int);",
            self.qualified()
        )
    }

    /// `DROP TABLE`
    #[must_use]
    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE {};", self.qualified())
    }

    /// One `INSERT` per row, as a single batch
    #[must_use]
    pub fn insert_batch(&self, rows: &[RowValue]) -> String {
        let table = self.qualified();
        join(rows.iter().map(|row| {
            format!("INSERT INTO {table} VALUES('{}', {});", row.key, row.value)
        }))
    }

    /// One `UPDATE` per row setting its current value, as a single batch
    #[must_use]
    pub fn update_batch(&self, rows: &[RowValue]) -> String {
        let table = self.qualified();
        join(rows.iter().map(|row| {
            format!("UPDATE {table} SET value={} WHERE key='{}';", row.value, row.key)
        }))
    }

    /// One `DELETE` per row, as a single batch
    #[must_use]
    pub fn delete_batch(&self, rows: &[RowValue]) -> String {
        let table = self.qualified();
        join(
            rows.iter()
                .map(|row| format!("DELETE FROM {table} WHERE key='{}';", row.key)),
        )
    }

    /// Read back one row by key
    #[must_use]
    pub fn select_key(&self, key: &Identifier) -> String {
        format!("SELECT * FROM {} WHERE key='{key}';", self.qualified())
    }

    /// Full-table scan
    #[must_use]
    pub fn select_all(&self) -> String {
        format!("SELECT * FROM {};", self.qualified())
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

fn join(statements: impl Iterator<Item = String>) -> String {
    statements.collect::<Vec<_>>().join(" ")
}
