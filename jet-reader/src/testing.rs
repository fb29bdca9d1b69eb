//! In-memory Jet 4 image builder for tests.
//!
//! Writes the header page, the system catalog, table definitions, data pages
//! and long-value pages; enough structure for [`Database`](crate::Database)
//! to read back exactly what was described.

use crate::column::ColumnType;
use crate::value::{days_from_datetime, Value};

const PAGE_SIZE: usize = 4096;
const DATA_HEADER: usize = 14;
const TDEF_HEADER: usize = 63;
const TDEF_CONTINUATION_HEADER: usize = 8;
const COLUMN_ENTRY: usize = 25;
const CATALOG_PAGE: u32 = 2;

/// Long values up to this size are stored inside the row.
const INLINE_LONG_VALUE_MAX: usize = 64;
/// Long values up to this size use a single out-of-row slot; larger ones are chained.
const LVAL_CHUNK: usize = 2000;

pub struct TestColumn {
    pub name: String,
    pub column_type: ColumnType,
}

/// A table description: columns in number order and rows of values.
pub struct TestTable {
    pub name: String,
    pub columns: Vec<TestColumn>,
    pub rows: Vec<Vec<Value>>,
    deleted: Vec<usize>,
    rows_per_page: Option<usize>,
}

impl TestTable {
    pub fn new(name: &str, columns: &[(&str, ColumnType)]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(name, column_type)| TestColumn {
                    name: (*name).to_string(),
                    column_type: *column_type,
                })
                .collect(),
            rows: Vec::new(),
            deleted: Vec::new(),
            rows_per_page: None,
        }
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        assert_eq!(values.len(), self.columns.len(), "row width must match columns");
        self.rows.push(values);
        self
    }

    /// Stores the given rows with the deleted flag set.
    pub fn deleted_rows(mut self, rows: &[usize]) -> Self {
        self.deleted.extend_from_slice(rows);
        self
    }

    /// Caps rows per data page to force multi-page tables.
    pub fn rows_per_page(mut self, rows: usize) -> Self {
        self.rows_per_page = Some(rows);
        self
    }
}

/// Builds a complete Jet 4 file image holding `tables` in order.
pub fn build_database(tables: &[TestTable]) -> Vec<u8> {
    let mut pages: Vec<Vec<u8>> = vec![header_page(), vec![0u8; PAGE_SIZE], Vec::new()];

    let mut catalog = TestTable::new(
        "MSysObjects",
        &[
            ("Id", ColumnType::Long),
            ("Name", ColumnType::Text),
            ("Type", ColumnType::Int),
            ("Flags", ColumnType::Long),
        ],
    )
    .row(vec![
        Value::Long(CATALOG_PAGE as i32),
        Value::Text("MSysObjects".into()),
        Value::Int(1),
        Value::Long(0x8000_0002_u32 as i32),
    ]);

    for table in tables {
        let tdef_page = append_table(&mut pages, table);
        catalog = catalog.row(vec![
            Value::Long(tdef_page as i32),
            Value::Text(table.name.clone()),
            Value::Int(1),
            Value::Long(0),
        ]);
    }
    catalog = catalog.row(vec![
        Value::Long(0x0100_0001),
        Value::Text("qryOpenOrders".into()),
        Value::Int(5),
        Value::Long(0),
    ]);

    let slots = plan_columns(&catalog.columns);
    let mut catalog_tdef = paginate_tdef(&tdef_bytes(&catalog, &slots), CATALOG_PAGE);
    assert_eq!(catalog_tdef.len(), 1, "catalog definition must fit one page");
    pages[CATALOG_PAGE as usize] = catalog_tdef.remove(0);
    append_rows(&mut pages, &catalog, &slots, CATALOG_PAGE);

    pages.concat()
}

/// Jet 4 text encoding, compressed when every character fits one byte.
pub fn encode_text(text: &str) -> Vec<u8> {
    if !text.is_empty() && text.chars().all(|c| ('\u{1}'..='\u{ff}').contains(&c)) {
        let mut out = vec![0xFF, 0xFE];
        out.extend(text.chars().map(|c| c as u8));
        out
    } else {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }
}

fn header_page() -> Vec<u8> {
    let mut page = vec![0u8; PAGE_SIZE];
    page[1] = 0x01;
    page[4..19].copy_from_slice(b"Standard Jet DB");
    page[0x14] = 0x01;
    page
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    column_type: ColumnType,
    number: u16,
    fixed: bool,
    fixed_offset: u16,
    var_index: u16,
    size: u16,
}

fn fixed_size(column_type: ColumnType) -> Option<u16> {
    match column_type {
        ColumnType::Bool => Some(0),
        ColumnType::Byte => Some(1),
        ColumnType::Int => Some(2),
        ColumnType::Long | ColumnType::Complex | ColumnType::Float => Some(4),
        ColumnType::Currency | ColumnType::Double | ColumnType::DateTime | ColumnType::BigInt => {
            Some(8)
        }
        ColumnType::Guid => Some(16),
        ColumnType::Numeric => Some(17),
        ColumnType::Text
        | ColumnType::Memo
        | ColumnType::Ole
        | ColumnType::Binary
        | ColumnType::Unknown(_) => None,
    }
}

fn plan_columns(columns: &[TestColumn]) -> Vec<Slot> {
    let mut fixed_offset = 0u16;
    let mut var_index = 0u16;
    columns
        .iter()
        .enumerate()
        .map(|(number, column)| {
            let column_type = column.column_type;
            match fixed_size(column_type) {
                Some(size) => {
                    let slot = Slot {
                        column_type,
                        number: number as u16,
                        fixed: true,
                        fixed_offset,
                        var_index: 0,
                        size,
                    };
                    fixed_offset += size;
                    slot
                }
                None => {
                    let slot = Slot {
                        column_type,
                        number: number as u16,
                        fixed: false,
                        fixed_offset: 0,
                        var_index,
                        size: if column_type.is_long_value() { 0 } else { 510 },
                    };
                    var_index += 1;
                    slot
                }
            }
        })
        .collect()
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn append_table(pages: &mut Vec<Vec<u8>>, table: &TestTable) -> u32 {
    let tdef_page = pages.len() as u32;
    let slots = plan_columns(&table.columns);
    pages.extend(paginate_tdef(&tdef_bytes(table, &slots), tdef_page));
    append_rows(pages, table, &slots, tdef_page);
    tdef_page
}

fn tdef_bytes(table: &TestTable, slots: &[Slot]) -> Vec<u8> {
    let mut buf = vec![0u8; TDEF_HEADER];
    buf[0] = 0x02;
    buf[1] = 0x01;
    let live = table.rows.len() - table.deleted.len();
    put_u32(&mut buf, 16, live as u32);
    buf[40] = 0x4E;
    let columns = slots.len() as u16;
    let var_columns = slots.iter().filter(|s| !s.fixed).count() as u16;
    put_u16(&mut buf, 41, columns);
    put_u16(&mut buf, 43, var_columns);
    put_u16(&mut buf, 45, columns);

    for slot in slots {
        let mut entry = [0u8; COLUMN_ENTRY];
        entry[0] = slot.column_type.code();
        put_u16(&mut entry, 5, slot.number);
        put_u16(&mut entry, 7, slot.var_index);
        put_u16(&mut entry, 9, slot.number);
        entry[15] = if slot.fixed { 0x03 } else { 0x02 };
        put_u16(&mut entry, 21, slot.fixed_offset);
        put_u16(&mut entry, 23, slot.size);
        buf.extend_from_slice(&entry);
    }
    for column in &table.columns {
        let name: Vec<u8> = column.name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&name);
    }

    let len = buf.len() as u32;
    put_u32(&mut buf, 8, len);
    buf
}

fn paginate_tdef(buf: &[u8], first: u32) -> Vec<Vec<u8>> {
    let head = buf.len().min(PAGE_SIZE);
    let mut chunks = vec![buf[..head].to_vec()];
    let mut rest = &buf[head..];
    while !rest.is_empty() {
        let take = rest.len().min(PAGE_SIZE - TDEF_CONTINUATION_HEADER);
        let mut page = vec![0x02, 0x01, 0, 0, 0, 0, 0, 0];
        page.extend_from_slice(&rest[..take]);
        chunks.push(page);
        rest = &rest[take..];
    }
    let count = chunks.len();
    for (i, page) in chunks.iter_mut().enumerate() {
        if i + 1 < count {
            put_u32(page, 4, first + i as u32 + 1);
        }
        page.resize(PAGE_SIZE, 0);
    }
    chunks
}

/// One out-of-row long-value slot.
struct LvalRow {
    data: Vec<u8>,
    chained: bool,
    next: Option<usize>,
}

impl LvalRow {
    fn stored_len(&self) -> usize {
        self.data.len() + if self.chained { 4 } else { 0 }
    }
}

enum LongField {
    Inline(Vec<u8>),
    Single { len: usize, row: usize },
    Chain { len: usize, first: usize },
}

fn append_rows(pages: &mut Vec<Vec<u8>>, table: &TestTable, slots: &[Slot], owner: u32) {
    let mut lval_rows: Vec<LvalRow> = Vec::new();
    let long_fields: Vec<Vec<Option<LongField>>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(slots)
                .map(|(value, slot)| {
                    if !slot.column_type.is_long_value() || value.is_null() {
                        return None;
                    }
                    Some(plan_long_value(long_payload(slot.column_type, value), &mut lval_rows))
                })
                .collect()
        })
        .collect();

    let lval_base = pages.len() as u32;
    let sizes: Vec<usize> = lval_rows.iter().map(LvalRow::stored_len).collect();
    let lval_layout = pack(&sizes, None);
    let mut pointers = vec![0u32; lval_rows.len()];
    for (page, members) in lval_layout.iter().enumerate() {
        for (slot, &row) in members.iter().enumerate() {
            pointers[row] = ((lval_base + page as u32) << 8) | slot as u32;
        }
    }
    for members in &lval_layout {
        let rows: Vec<(Vec<u8>, u16)> = members
            .iter()
            .map(|&i| {
                let row = &lval_rows[i];
                let mut bytes = Vec::with_capacity(row.stored_len());
                if row.chained {
                    let next = row.next.map_or(0, |n| pointers[n]);
                    bytes.extend_from_slice(&next.to_le_bytes());
                }
                bytes.extend_from_slice(&row.data);
                (bytes, 0)
            })
            .collect();
        pages.push(render_page(*b"LVAL", &rows));
    }

    let records: Vec<(Vec<u8>, u16)> = table
        .rows
        .iter()
        .zip(&long_fields)
        .enumerate()
        .map(|(i, (row, longs))| {
            let flags = if table.deleted.contains(&i) { 0x8000 } else { 0 };
            (encode_record(slots, row, longs, &pointers), flags)
        })
        .collect();
    let sizes: Vec<usize> = records.iter().map(|(r, _)| r.len()).collect();
    for members in pack(&sizes, table.rows_per_page) {
        let rows: Vec<(Vec<u8>, u16)> = members.iter().map(|&i| records[i].clone()).collect();
        pages.push(render_page(owner.to_le_bytes(), &rows));
    }
}

fn long_payload(column_type: ColumnType, value: &Value) -> Vec<u8> {
    match (column_type, value) {
        (ColumnType::Memo, Value::Text(text)) => encode_text(text),
        (ColumnType::Ole, Value::Binary(bytes)) => bytes.clone(),
        (column_type, value) => panic!("cannot store {value:?} in a {column_type:?} column"),
    }
}

fn plan_long_value(payload: Vec<u8>, lval_rows: &mut Vec<LvalRow>) -> LongField {
    let len = payload.len();
    if len <= INLINE_LONG_VALUE_MAX {
        return LongField::Inline(payload);
    }
    if len <= LVAL_CHUNK {
        lval_rows.push(LvalRow {
            data: payload,
            chained: false,
            next: None,
        });
        return LongField::Single {
            len,
            row: lval_rows.len() - 1,
        };
    }

    let first = lval_rows.len();
    let chunks: Vec<&[u8]> = payload.chunks(LVAL_CHUNK).collect();
    let count = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        lval_rows.push(LvalRow {
            data: chunk.to_vec(),
            chained: true,
            next: (i + 1 < count).then_some(first + i + 1),
        });
    }
    LongField::Chain { len, first }
}

fn long_header(field: &LongField, pointers: &[u32]) -> Vec<u8> {
    let mut header = vec![0u8; 12];
    match field {
        LongField::Inline(payload) => {
            put_u32(&mut header, 0, payload.len() as u32 | 0x8000_0000);
            header.extend_from_slice(payload);
        }
        LongField::Single { len, row } => {
            put_u32(&mut header, 0, *len as u32 | 0x4000_0000);
            put_u32(&mut header, 4, pointers[*row]);
        }
        LongField::Chain { len, first } => {
            put_u32(&mut header, 0, *len as u32);
            put_u32(&mut header, 4, pointers[*first]);
        }
    }
    header
}

fn fixed_bytes(column_type: ColumnType, value: &Value) -> Vec<u8> {
    match (column_type, value) {
        (ColumnType::Byte, Value::Byte(v)) => vec![*v],
        (ColumnType::Int, Value::Int(v)) => v.to_le_bytes().to_vec(),
        (ColumnType::Long | ColumnType::Complex, Value::Long(v)) => v.to_le_bytes().to_vec(),
        (ColumnType::BigInt, Value::BigInt(v)) => v.to_le_bytes().to_vec(),
        (ColumnType::Currency, Value::Currency(v)) => v.to_le_bytes().to_vec(),
        (ColumnType::Float, Value::Float(v)) => v.to_le_bytes().to_vec(),
        (ColumnType::Double, Value::Double(v)) => v.to_le_bytes().to_vec(),
        (ColumnType::DateTime, Value::DateTime(v)) => days_from_datetime(*v).to_le_bytes().to_vec(),
        (column_type, value) => panic!("cannot store {value:?} in a {column_type:?} column"),
    }
}

fn var_bytes(column_type: ColumnType, value: &Value) -> Vec<u8> {
    match (column_type, value) {
        (ColumnType::Text, Value::Text(text)) => encode_text(text),
        (ColumnType::Binary, Value::Binary(bytes)) => bytes.clone(),
        (column_type, value) => panic!("cannot store {value:?} in a {column_type:?} column"),
    }
}

/// Column count, fixed area, variable data, reversed offsets, variable count, null mask.
fn encode_record(
    slots: &[Slot],
    values: &[Value],
    longs: &[Option<LongField>],
    pointers: &[u32],
) -> Vec<u8> {
    let fixed_len: usize = slots.iter().filter(|s| s.fixed).map(|s| usize::from(s.size)).sum();
    let var_count = slots.iter().filter(|s| !s.fixed).count();

    let mut record = (slots.len() as u16).to_le_bytes().to_vec();
    record.resize(2 + fixed_len, 0);
    let mut mask = vec![0u8; slots.len().div_ceil(8)];
    let mut var_data: Vec<Vec<u8>> = vec![Vec::new(); var_count];

    for ((slot, value), long) in slots.iter().zip(values).zip(longs) {
        let bit = usize::from(slot.number);
        let present = match (slot.column_type, value) {
            (ColumnType::Bool, Value::Bool(flag)) => *flag,
            (_, Value::Null) => false,
            _ if slot.fixed => {
                let start = 2 + usize::from(slot.fixed_offset);
                let bytes = fixed_bytes(slot.column_type, value);
                record[start..start + bytes.len()].copy_from_slice(&bytes);
                true
            }
            _ => {
                var_data[usize::from(slot.var_index)] = match long {
                    Some(field) => long_header(field, pointers),
                    None => var_bytes(slot.column_type, value),
                };
                true
            }
        };
        if present {
            mask[bit / 8] |= 1 << (bit % 8);
        }
    }

    if var_count > 0 {
        let mut offsets = Vec::with_capacity(var_count + 1);
        for data in &var_data {
            offsets.push(record.len() as u16);
            record.extend_from_slice(data);
        }
        offsets.push(record.len() as u16);
        for offset in offsets.iter().rev() {
            record.extend_from_slice(&offset.to_le_bytes());
        }
        record.extend_from_slice(&(var_count as u16).to_le_bytes());
    }
    record.extend_from_slice(&mask);
    record
}

/// Groups rows into pages by size; returns row indices per page.
fn pack(sizes: &[usize], max_rows: Option<usize>) -> Vec<Vec<usize>> {
    let mut pages = Vec::new();
    let mut current = Vec::new();
    let mut used = DATA_HEADER;
    for (i, &size) in sizes.iter().enumerate() {
        let need = size + 2;
        assert!(DATA_HEADER + need <= PAGE_SIZE, "row of {size} bytes does not fit a page");
        let full = used + need > PAGE_SIZE || max_rows.is_some_and(|max| current.len() >= max);
        if full && !current.is_empty() {
            pages.push(std::mem::take(&mut current));
            used = DATA_HEADER;
        }
        current.push(i);
        used += need;
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

/// Data page with rows packed from the end, row 0 last.
fn render_page(owner: [u8; 4], rows: &[(Vec<u8>, u16)]) -> Vec<u8> {
    let mut page = vec![0u8; PAGE_SIZE];
    page[0] = 0x01;
    page[1] = 0x01;
    page[4..8].copy_from_slice(&owner);
    put_u16(&mut page, 12, rows.len() as u16);

    let mut end = PAGE_SIZE;
    for (i, (row, flags)) in rows.iter().enumerate() {
        let start = end - row.len();
        page[start..end].copy_from_slice(row);
        put_u16(&mut page, DATA_HEADER + i * 2, start as u16 | flags);
        end = start;
    }
    let free = end - (DATA_HEADER + rows.len() * 2);
    put_u16(&mut page, 2, free as u16);
    page
}
