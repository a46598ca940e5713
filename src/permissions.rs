//! Static table permission matrix
//!
//! Every table the gateway can touch is listed here with its allowed CRUD
//! capabilities. A table absent from the matrix is inaccessible. The matrix
//! is a `const` array and is never mutated at runtime.

/// One CRUD capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Select,
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Select => write!(f, "select"),
            Capability::Insert => write!(f, "insert"),
            Capability::Update => write!(f, "update"),
            Capability::Delete => write!(f, "delete"),
        }
    }
}

/// Allowed operations on a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePermissions {
    pub select: bool,
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl TablePermissions {
    const fn new(select: bool, insert: bool, update: bool, delete: bool) -> Self {
        Self {
            select,
            insert,
            update,
            delete,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Select => self.select,
            Capability::Insert => self.insert,
            Capability::Update => self.update,
            Capability::Delete => self.delete,
        }
    }
}

const FULL_CRUD: TablePermissions = TablePermissions::new(true, true, true, true);
const APPEND_ONLY: TablePermissions = TablePermissions::new(true, true, false, false);
const NO_DELETE: TablePermissions = TablePermissions::new(true, true, true, false);
const READ_UPDATE: TablePermissions = TablePermissions::new(true, false, true, false);

/// A table the gateway is allowed to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub permissions: TablePermissions,
    /// Conflict target for upserts.
    pub primary_key: &'static [&'static str],
}

const ID: &[&str] = &["id"];

const fn spec(name: &'static str, permissions: TablePermissions) -> TableSpec {
    TableSpec {
        name,
        permissions,
        primary_key: ID,
    }
}

/// The permission matrix.
pub const TABLES: &[TableSpec] = &[
    spec("projects", READ_UPDATE),
    spec("chapters", NO_DELETE),
    spec("tactics", FULL_CRUD),
    spec("glossary", FULL_CRUD),
    spec("diagrams", FULL_CRUD),
    spec("quality_scores", APPEND_ONLY),
    spec("issues", NO_DELETE),
    spec("pipeline_logs", APPEND_ONLY),
    spec("output_files", APPEND_ONLY),
    spec("cross_refs", FULL_CRUD),
    spec("book_context", NO_DELETE),
    spec("decisions", APPEND_ONLY),
    spec("validation_log", APPEND_ONLY),
];

/// Look up a table by exact name. Unknown tables return `None`.
pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.name == name)
}
