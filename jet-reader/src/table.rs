//! Table definitions and row iteration.

use crate::bytes::{array, slice, u16_at, u32_at, u8_at};
use crate::column::{Column, ColumnType};
use crate::error::{JetError, Result};
use crate::format::{JetVersion, Layout};
use crate::pages::{PageSource, RowSlot};
use crate::record::{crack_row, Field};
use crate::text::decode_text;
use crate::value::{datetime_from_days, format_guid, format_numeric, Value};

/// Flag marking a fixed-width column.
const COLUMN_FIXED: u8 = 0x01;

/// Overflow pointers followed before giving up on a row.
const MAX_OVERFLOW_HOPS: usize = 8;

#[derive(Debug)]
pub(crate) struct TableDef {
    pub row_count: u32,
    pub var_col_count: u16,
    /// Sorted by column number.
    pub columns: Vec<Column>,
}

impl TableDef {
    pub fn parse(buf: &[u8], layout: &Layout) -> Result<Self> {
        let row_count = u32_at(buf, layout.tdef_row_count)?;
        let var_col_count = u16_at(buf, layout.tdef_var_cols)?;
        let num_cols = usize::from(u16_at(buf, layout.tdef_num_cols)?);
        let num_real_idx = u32_at(buf, layout.tdef_num_real_idx)? as usize;

        let mut pos = num_real_idx
            .checked_mul(layout.real_idx_entry_size)
            .and_then(|skip| skip.checked_add(layout.tdef_cols_start))
            .ok_or_else(|| JetError::Corrupt(format!("index count {num_real_idx} is implausible")))?;

        let mut columns = Vec::with_capacity(num_cols);
        for _ in 0..num_cols {
            let entry = slice(buf, pos, layout.col_entry_size)?;
            let flags = u8_at(entry, layout.col_flags)?;
            columns.push(Column {
                name: String::new(),
                column_type: ColumnType::from_code(entry[0]),
                number: u16_at(entry, layout.col_num)?,
                size: u16_at(entry, layout.col_size)?,
                precision: u8_at(entry, layout.col_precision)?,
                scale: u8_at(entry, layout.col_scale)?,
                var_index: u16_at(entry, layout.col_var_index)?,
                fixed_offset: u16_at(entry, layout.col_fixed_offset)?,
                fixed: flags & COLUMN_FIXED != 0,
            });
            pos += layout.col_entry_size;
        }

        for column in &mut columns {
            let len = match layout.version {
                JetVersion::Jet4 => {
                    let len = usize::from(u16_at(buf, pos)?);
                    pos += 2;
                    len
                }
                JetVersion::Jet3 => {
                    let len = usize::from(u8_at(buf, pos)?);
                    pos += 1;
                    len
                }
            };
            column.name = decode_text(slice(buf, pos, len)?, layout.version);
            pos += len;
        }

        columns.sort_by_key(|c| c.number);
        Ok(Self {
            row_count,
            var_col_count,
            columns,
        })
    }
}

/// A user table, borrowed from its [`Database`](crate::Database).
pub struct Table<'a> {
    pages: PageSource<'a>,
    name: String,
    def: TableDef,
    data_pages: Vec<u32>,
}

impl<'a> Table<'a> {
    pub(crate) fn load(pages: PageSource<'a>, name: &str, tdef_page: u32) -> Result<Self> {
        let buffer = pages.tdef_buffer(tdef_page)?;
        let def = TableDef::parse(&buffer, pages.layout)?;
        let data_pages = pages.owned_data_pages(tdef_page);
        tracing::trace!(
            table = name,
            tdef_page,
            columns = def.columns.len(),
            data_pages = data_pages.len(),
            "loaded table definition"
        );
        Ok(Self {
            pages,
            name: name.to_string(),
            def,
            data_pages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in column-number order.
    pub fn columns(&self) -> &[Column] {
        &self.def.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.def.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks a column up by exact name, then case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let columns = &self.def.columns;
        columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                let wanted = name.to_lowercase();
                columns.iter().position(|c| c.name.to_lowercase() == wanted)
            })
    }

    /// Row count recorded in the table definition.
    pub fn row_count(&self) -> u32 {
        self.def.row_count
    }

    /// Live rows in stored order, each holding one value per column.
    pub fn rows(&self) -> Rows<'_, 'a> {
        Rows {
            table: self,
            page_index: 0,
            row_index: 0,
            rows_on_page: None,
            done: false,
        }
    }

    /// Values of one column from the first `limit` rows.
    pub fn column_values(&self, column: &str, limit: usize) -> Result<Vec<Value>> {
        let index = self
            .column_index(column)
            .ok_or_else(|| JetError::ColumnNotFound {
                table: self.name.clone(),
                column: column.to_string(),
            })?;
        self.rows()
            .take(limit)
            .map(|row| row.map(|mut values| values.swap_remove(index)))
            .collect()
    }

    fn read_row(&self, page: u32, row: usize) -> Result<Option<Vec<Value>>> {
        let mut slot = self.pages.row(page, row)?;
        let mut hops = 0;
        let record = loop {
            match slot {
                RowSlot::Deleted => return Ok(None),
                RowSlot::Data(bytes) => break bytes,
                RowSlot::Overflow(pointer) => {
                    hops += 1;
                    if hops > MAX_OVERFLOW_HOPS {
                        return Err(JetError::Corrupt(format!(
                            "row {row} on page {page} overflows too many times"
                        )));
                    }
                    slot = self.pages.row(pointer >> 8, (pointer & 0xFF) as usize)?;
                }
            }
        };

        let fields = crack_row(
            record,
            &self.def.columns,
            self.def.var_col_count > 0,
            self.pages.layout,
        )?;
        fields
            .into_iter()
            .zip(&self.def.columns)
            .map(|(field, column)| self.decode(field, column))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn decode(&self, field: Field<'_>, column: &Column) -> Result<Value> {
        let bytes = match field {
            Field::Null => return Ok(Value::Null),
            Field::Bool(value) => return Ok(Value::Bool(value)),
            Field::Data(bytes) => bytes,
        };
        let version = self.pages.layout.version;
        let value = match column.column_type {
            ColumnType::Bool => Value::Bool(true),
            ColumnType::Byte => Value::Byte(u8_at(bytes, 0)?),
            ColumnType::Int => Value::Int(i16::from_le_bytes(array(bytes, 0)?)),
            ColumnType::Long | ColumnType::Complex => Value::Long(i32::from_le_bytes(array(bytes, 0)?)),
            ColumnType::BigInt => Value::BigInt(i64::from_le_bytes(array(bytes, 0)?)),
            ColumnType::Currency => Value::Currency(i64::from_le_bytes(array(bytes, 0)?)),
            ColumnType::Float => Value::Float(f32::from_le_bytes(array(bytes, 0)?)),
            ColumnType::Double => Value::Double(f64::from_le_bytes(array(bytes, 0)?)),
            ColumnType::DateTime => {
                let days = f64::from_le_bytes(array(bytes, 0)?);
                datetime_from_days(days).map_or(Value::Null, Value::DateTime)
            }
            ColumnType::Text => Value::Text(decode_text(bytes, version)),
            ColumnType::Memo => Value::Text(decode_text(&self.pages.long_value(bytes)?, version)),
            ColumnType::Ole => Value::Binary(self.pages.long_value(bytes)?),
            ColumnType::Guid => Value::Guid(format_guid(&array(bytes, 0)?)),
            ColumnType::Numeric => Value::Numeric(format_numeric(&array(bytes, 0)?, column.scale)),
            ColumnType::Binary | ColumnType::Unknown(_) => Value::Binary(bytes.to_vec()),
        };
        Ok(value)
    }
}

/// Iterator over the live rows of a [`Table`].
///
/// Stops after yielding the first error.
pub struct Rows<'t, 'a> {
    table: &'t Table<'a>,
    page_index: usize,
    row_index: usize,
    rows_on_page: Option<usize>,
    done: bool,
}

impl Iterator for Rows<'_, '_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let page = *self.table.data_pages.get(self.page_index)?;
            let total = match self.rows_on_page {
                Some(total) => total,
                None => match self.table.pages.row_count(page) {
                    Ok(total) => *self.rows_on_page.insert(total),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
            };

            if self.row_index >= total {
                self.page_index += 1;
                self.row_index = 0;
                self.rows_on_page = None;
                continue;
            }

            let row = self.row_index;
            self.row_index += 1;
            match self.table.read_row(page, row) {
                Ok(Some(values)) => return Some(Ok(values)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
