//! Page addressing, row slots and long-value chains.

use crate::bytes::{slice, u16_at, u32_at};
use crate::error::{JetError, Result};
use crate::format::Layout;

const PAGE_TYPE_DATA: u8 = 0x01;
const PAGE_TYPE_TDEF: u8 = 0x02;

const ROW_OFFSET_MASK: u16 = 0x1FFF;
const ROW_DELETED: u16 = 0x8000;
const ROW_OVERFLOW: u16 = 0x4000;

const LVAL_INLINE: u32 = 0x8000_0000;
const LVAL_SINGLE_PAGE: u32 = 0x4000_0000;
const LVAL_LENGTH_MASK: u32 = 0x3FFF_FFFF;

/// Bytes following the header on table-definition continuation pages.
const TDEF_CONTINUATION_HEADER: usize = 8;

/// What a data page holds at one row index.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RowSlot<'a> {
    Deleted,
    /// The row was moved; the payload is a pointer to its new location.
    Overflow(u32),
    Data(&'a [u8]),
}

/// Read-only view over the page array of a database image.
#[derive(Clone, Copy)]
pub(crate) struct PageSource<'a> {
    bytes: &'a [u8],
    pub layout: &'static Layout,
}

impl<'a> PageSource<'a> {
    pub fn new(bytes: &'a [u8], layout: &'static Layout) -> Self {
        Self { bytes, layout }
    }

    pub fn page_count(&self) -> u32 {
        u32::try_from(self.bytes.len() / self.layout.page_size).unwrap_or(u32::MAX)
    }

    pub fn page(&self, number: u32) -> Result<&'a [u8]> {
        let size = self.layout.page_size;
        (number as usize)
            .checked_mul(size)
            .and_then(|start| self.bytes.get(start..start.checked_add(size)?))
            .ok_or(JetError::PageOutOfRange(number))
    }

    fn typed_page(&self, number: u32, page_type: u8, expected: &'static str) -> Result<&'a [u8]> {
        let page = self.page(number)?;
        if page[0] != page_type {
            return Err(JetError::UnexpectedPageType {
                page: number,
                expected,
            });
        }
        Ok(page)
    }

    /// Concatenates a table definition and its continuation pages.
    pub fn tdef_buffer(&self, first: u32) -> Result<Vec<u8>> {
        let page = self.typed_page(first, PAGE_TYPE_TDEF, "table definition")?;
        let mut buffer = page.to_vec();
        let mut next = u32_at(page, 4)?;
        let mut hops = 0;
        while next != 0 {
            hops += 1;
            if hops > self.page_count() {
                return Err(JetError::Corrupt(format!(
                    "table definition at page {first} loops"
                )));
            }
            let page = self.typed_page(next, PAGE_TYPE_TDEF, "table definition")?;
            buffer.extend_from_slice(&page[TDEF_CONTINUATION_HEADER..]);
            next = u32_at(page, 4)?;
        }
        Ok(buffer)
    }

    /// Data pages owned by a table, in page order.
    pub fn owned_data_pages(&self, tdef_page: u32) -> Vec<u32> {
        (1..self.page_count())
            .filter(|&n| {
                self.page(n).is_ok_and(|page| {
                    page[0] == PAGE_TYPE_DATA && u32_at(page, 4).is_ok_and(|owner| owner == tdef_page)
                })
            })
            .collect()
    }

    /// Number of row slots on a data page.
    pub fn row_count(&self, page_number: u32) -> Result<usize> {
        let page = self.typed_page(page_number, PAGE_TYPE_DATA, "data")?;
        Ok(usize::from(u16_at(page, self.layout.data_row_count)?))
    }

    /// Resolves one row slot on a data page.
    pub fn row(&self, page_number: u32, row: usize) -> Result<RowSlot<'a>> {
        let page = self.typed_page(page_number, PAGE_TYPE_DATA, "data")?;
        let (raw, bytes) = self.row_bytes(page, page_number, row)?;
        if raw & ROW_DELETED != 0 {
            return Ok(RowSlot::Deleted);
        }
        if raw & ROW_OVERFLOW != 0 {
            return Ok(RowSlot::Overflow(u32_at(bytes, 0)?));
        }
        Ok(RowSlot::Data(bytes))
    }

    /// Row bytes addressed by a `page << 8 | row` pointer, ignoring slot flags.
    pub fn pointer_row(&self, pointer: u32) -> Result<&'a [u8]> {
        let page_number = pointer >> 8;
        let page = self.typed_page(page_number, PAGE_TYPE_DATA, "data")?;
        let (_, bytes) = self.row_bytes(page, page_number, (pointer & 0xFF) as usize)?;
        Ok(bytes)
    }

    fn row_bytes(&self, page: &'a [u8], page_number: u32, row: usize) -> Result<(u16, &'a [u8])> {
        let count = usize::from(u16_at(page, self.layout.data_row_count)?);
        if row >= count {
            return Err(JetError::Corrupt(format!(
                "row {row} requested on page {page_number} holding {count} rows"
            )));
        }
        let table = self.layout.data_row_count + 2;
        let raw = u16_at(page, table + row * 2)?;
        let start = usize::from(raw & ROW_OFFSET_MASK);
        let end = if row == 0 {
            self.layout.page_size
        } else {
            usize::from(u16_at(page, table + (row - 1) * 2)? & ROW_OFFSET_MASK)
        };
        if start > end {
            return Err(JetError::Corrupt(format!(
                "row {row} on page {page_number} has inverted bounds"
            )));
        }
        Ok((raw, slice(page, start, end - start)?))
    }

    /// Reads a memo or OLE value from its 12-byte in-row header.
    pub fn long_value(&self, field: &[u8]) -> Result<Vec<u8>> {
        let header = u32_at(field, 0)?;
        let len = (header & LVAL_LENGTH_MASK) as usize;

        if header & LVAL_INLINE != 0 {
            return Ok(slice(field, 12, len)?.to_vec());
        }

        let pointer = u32_at(field, 4)?;
        if header & LVAL_SINGLE_PAGE != 0 {
            let data = self.pointer_row(pointer)?;
            return Ok(data[..len.min(data.len())].to_vec());
        }

        let mut out = Vec::with_capacity(len);
        let mut next = pointer;
        let mut hops = 0;
        while out.len() < len && next != 0 {
            hops += 1;
            if hops > self.page_count() as usize * 256 {
                return Err(JetError::Corrupt("long value chain loops".into()));
            }
            let chunk = self.pointer_row(next)?;
            next = u32_at(chunk, 0)?;
            let data = &chunk[4..];
            let take = (len - out.len()).min(data.len());
            out.extend_from_slice(&data[..take]);
        }
        if out.len() < len {
            return Err(JetError::Corrupt(format!(
                "long value chain ended after {} of {len} bytes",
                out.len()
            )));
        }
        Ok(out)
    }
}
