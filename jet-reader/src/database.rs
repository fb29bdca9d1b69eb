//! Database handle and system catalog.

use std::path::Path;

use crate::error::{JetError, Result};
use crate::format::{detect, JetVersion, Layout};
use crate::pages::PageSource;
use crate::table::Table;
use crate::value::Value;

/// The system catalog always starts at this page.
const CATALOG_PAGE: u32 = 2;
const CATALOG_TABLE: &str = "MSysObjects";

const OBJECT_TYPE_TABLE: i64 = 1;
/// System and hidden object flags.
const OBJECT_FLAGS_HIDDEN: u32 = 0x8000_0002;
const OBJECT_ID_PAGE_MASK: i64 = 0x00FF_FFFF;

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    tdef_page: u32,
}

/// An opened database file held in memory.
pub struct Database {
    bytes: Vec<u8>,
    layout: &'static Layout,
    tables: Vec<CatalogEntry>,
}

impl Database {
    /// Reads and parses the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(bytes)
    }

    /// Parses an in-memory image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let layout = detect(&bytes)?;
        let mut db = Self {
            bytes,
            layout,
            tables: Vec::new(),
        };
        db.tables = db.read_catalog()?;
        tracing::debug!(
            version = ?layout.version,
            tables = db.tables.len(),
            "opened legacy database"
        );
        Ok(db)
    }

    pub fn version(&self) -> JetVersion {
        self.layout.version
    }

    /// User table names in catalog order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Opens a user table by exact name, falling back to a case-insensitive match.
    pub fn table(&self, name: &str) -> Result<Table<'_>> {
        let wanted = name.to_lowercase();
        let entry = self
            .tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tables.iter().find(|t| t.name.to_lowercase() == wanted))
            .ok_or_else(|| JetError::TableNotFound(name.to_string()))?;
        Table::load(self.pages(), &entry.name, entry.tdef_page)
    }

    fn pages(&self) -> PageSource<'_> {
        PageSource::new(&self.bytes, self.layout)
    }

    fn read_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let catalog = Table::load(self.pages(), CATALOG_TABLE, CATALOG_PAGE)?;
        let index = |name: &str| {
            catalog
                .column_index(name)
                .ok_or_else(|| JetError::Corrupt(format!("system catalog lacks column {name}")))
        };
        let (id_col, name_col, type_col, flags_col) =
            (index("Id")?, index("Name")?, index("Type")?, index("Flags")?);

        let mut tables = Vec::new();
        for row in catalog.rows() {
            let row = row?;
            let object_type = row[type_col].as_i64();
            let flags = row[flags_col].as_i64().unwrap_or(0) as u32;
            if object_type != Some(OBJECT_TYPE_TABLE) || flags & OBJECT_FLAGS_HIDDEN != 0 {
                continue;
            }
            let (Some(id), Value::Text(name)) = (row[id_col].as_i64(), &row[name_col]) else {
                continue;
            };
            tables.push(CatalogEntry {
                name: name.clone(),
                tdef_page: (id & OBJECT_ID_PAGE_MASK) as u32,
            });
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use crate::testing::{build_database, TestTable};
    use chrono::NaiveDate;

    fn parts_table() -> TestTable {
        TestTable::new(
            "Parts",
            &[
                ("Id", ColumnType::Long),
                ("Name", ColumnType::Text),
                ("Price", ColumnType::Double),
                ("Added", ColumnType::DateTime),
                ("Active", ColumnType::Bool),
                ("Qty", ColumnType::Int),
                ("Cost", ColumnType::Currency),
            ],
        )
        .row(vec![
            Value::Long(1),
            Value::Text("Bolt".into()),
            Value::Double(0.25),
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 15)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
            ),
            Value::Bool(true),
            Value::Int(-4),
            Value::Currency(12_500),
        ])
        .row(vec![
            Value::Long(2),
            Value::Text("Ωmega nut".into()),
            Value::Null,
            Value::Null,
            Value::Bool(false),
            Value::Null,
            Value::Null,
        ])
    }

    #[test]
    fn test_rejects_non_jet_file() {
        let result = Database::from_bytes(vec![0u8; 3 * 4096]);
        assert!(matches!(result, Err(JetError::NotJet(_))));
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let result = Database::open("/nonexistent/rental.mdb");
        assert!(matches!(result, Err(JetError::Io(_))));
    }

    #[test]
    fn test_lists_user_tables_only() {
        let db = Database::from_bytes(build_database(&[
            parts_table(),
            TestTable::new("Customers", &[("Code", ColumnType::Text)]),
        ]))
        .unwrap();
        assert_eq!(db.version(), JetVersion::Jet4);
        assert_eq!(db.table_names(), vec!["Parts", "Customers"]);
    }

    #[test]
    fn test_columns_in_number_order() {
        let db = Database::from_bytes(build_database(&[parts_table()])).unwrap();
        let table = db.table("Parts").unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Id", "Name", "Price", "Added", "Active", "Qty", "Cost"]
        );
        assert_eq!(table.columns()[3].column_type, ColumnType::DateTime);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_decodes_rows() {
        let db = Database::from_bytes(build_database(&[parts_table()])).unwrap();
        let table = db.table("Parts").unwrap();
        let rows: Vec<Vec<Value>> = table.rows().collect::<Result<_>>().unwrap();

        assert_eq!(rows, parts_table().rows);
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let db = Database::from_bytes(build_database(&[parts_table()])).unwrap();
        assert_eq!(db.table("PARTS").unwrap().name(), "Parts");
        assert!(matches!(db.table("Orders"), Err(JetError::TableNotFound(_))));
    }

    #[test]
    fn test_column_values_and_missing_column() {
        let db = Database::from_bytes(build_database(&[parts_table()])).unwrap();
        let table = db.table("Parts").unwrap();
        assert_eq!(
            table.column_values("name", 10).unwrap(),
            vec![Value::Text("Bolt".into()), Value::Text("Ωmega nut".into())]
        );
        assert!(matches!(
            table.column_values("Weight", 10),
            Err(JetError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_rows_span_pages_in_order() {
        let mut table = TestTable::new("Ledger", &[("Seq", ColumnType::Long)]).rows_per_page(2);
        for i in 0..5 {
            table = table.row(vec![Value::Long(i)]);
        }
        let db = Database::from_bytes(build_database(&[table])).unwrap();
        let ledger = db.table("Ledger").unwrap();

        let all = ledger.column_values("Seq", 100).unwrap();
        assert_eq!(all, (0..5).map(Value::Long).collect::<Vec<_>>());
        assert_eq!(ledger.column_values("Seq", 3).unwrap().len(), 3);
    }

    #[test]
    fn test_deleted_rows_are_skipped() {
        let mut table = TestTable::new("Ledger", &[("Seq", ColumnType::Long)]);
        for i in 0..4 {
            table = table.row(vec![Value::Long(i)]);
        }
        let db = Database::from_bytes(build_database(&[table.deleted_rows(&[1, 2])])).unwrap();
        let values = db.table("Ledger").unwrap().column_values("Seq", 100).unwrap();
        assert_eq!(values, vec![Value::Long(0), Value::Long(3)]);
    }

    #[test]
    fn test_memo_storage_forms() {
        let short = "short note".to_string();
        let single = "x".repeat(300);
        let chained = "long memo ".repeat(600);
        let table = TestTable::new("Notes", &[("Id", ColumnType::Long), ("Body", ColumnType::Memo)])
            .row(vec![Value::Long(1), Value::Text(short.clone())])
            .row(vec![Value::Long(2), Value::Text(single.clone())])
            .row(vec![Value::Long(3), Value::Text(chained.clone())])
            .row(vec![Value::Long(4), Value::Null]);

        let db = Database::from_bytes(build_database(&[table])).unwrap();
        let values = db.table("Notes").unwrap().column_values("Body", 10).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Text(short),
                Value::Text(single),
                Value::Text(chained),
                Value::Null
            ]
        );
    }

    #[test]
    fn test_wide_table_definition_spans_pages() {
        let names: Vec<String> = (0..180).map(|i| format!("Measurement{i:03}")).collect();
        let columns: Vec<(&str, ColumnType)> =
            names.iter().map(|n| (n.as_str(), ColumnType::Long)).collect();
        let table = TestTable::new("Wide", &columns).row((0..180).map(Value::Long).collect());

        let db = Database::from_bytes(build_database(&[table])).unwrap();
        let wide = db.table("Wide").unwrap();
        assert_eq!(wide.columns().len(), 180);
        assert_eq!(
            wide.column_values("Measurement179", 1).unwrap(),
            vec![Value::Long(179)]
        );
    }
}
