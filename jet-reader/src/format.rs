//! File format detection and per-version layout constants.

use crate::bytes::{slice, u8_at};
use crate::error::{JetError, Result};

/// Page layout family of a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JetVersion {
    /// Access 97 and earlier, 2 KiB pages, single-byte text.
    Jet3,
    /// Access 2000 onward including ACE, 4 KiB pages, UCS-2 text.
    Jet4,
}

/// Byte offsets that differ between Jet 3 and Jet 4.
#[derive(Debug)]
pub(crate) struct Layout {
    pub version: JetVersion,
    pub page_size: usize,
    /// Row count on a data page; the row offset table follows it.
    pub data_row_count: usize,
    pub tdef_row_count: usize,
    pub tdef_var_cols: usize,
    pub tdef_num_cols: usize,
    pub tdef_num_real_idx: usize,
    pub tdef_cols_start: usize,
    pub real_idx_entry_size: usize,
    pub col_entry_size: usize,
    pub col_num: usize,
    pub col_var_index: usize,
    pub col_precision: usize,
    pub col_scale: usize,
    pub col_flags: usize,
    pub col_fixed_offset: usize,
    pub col_size: usize,
}

pub(crate) static JET3: Layout = Layout {
    version: JetVersion::Jet3,
    page_size: 2048,
    data_row_count: 8,
    tdef_row_count: 12,
    tdef_var_cols: 23,
    tdef_num_cols: 25,
    tdef_num_real_idx: 31,
    tdef_cols_start: 43,
    real_idx_entry_size: 8,
    col_entry_size: 18,
    col_num: 1,
    col_var_index: 3,
    col_precision: 9,
    col_scale: 10,
    col_flags: 13,
    col_fixed_offset: 14,
    col_size: 16,
};

pub(crate) static JET4: Layout = Layout {
    version: JetVersion::Jet4,
    page_size: 4096,
    data_row_count: 12,
    tdef_row_count: 16,
    tdef_var_cols: 43,
    tdef_num_cols: 45,
    tdef_num_real_idx: 51,
    tdef_cols_start: 63,
    real_idx_entry_size: 12,
    col_entry_size: 25,
    col_num: 5,
    col_var_index: 7,
    col_precision: 11,
    col_scale: 12,
    col_flags: 15,
    col_fixed_offset: 21,
    col_size: 23,
};

const JET_MAGIC: &[u8] = b"Standard Jet DB";
const ACE_MAGIC: &[u8] = b"Standard ACE DB";
const MAGIC_OFFSET: usize = 4;
const VERSION_OFFSET: usize = 0x14;

/// Inspects the header page and returns the matching layout.
pub(crate) fn detect(bytes: &[u8]) -> Result<&'static Layout> {
    let magic = slice(bytes, MAGIC_OFFSET, JET_MAGIC.len())
        .map_err(|_| JetError::NotJet("file is too short".into()))?;
    if magic != JET_MAGIC && magic != ACE_MAGIC {
        return Err(JetError::NotJet("missing database signature".into()));
    }

    let layout = match u8_at(bytes, VERSION_OFFSET)? {
        0 => &JET3,
        _ => &JET4,
    };
    if bytes.len() < layout.page_size * 3 {
        return Err(JetError::NotJet(format!(
            "file holds {} bytes, fewer than the first three pages",
            bytes.len()
        )));
    }
    Ok(layout)
}
