//! Splitting a stored row into per-column fields.
//!
//! A record starts with its column count and the fixed-width area, and ends
//! with the null mask. Variable-width columns are addressed through an offset
//! table stored in reverse just before the mask.

use crate::bytes::{slice, sub, u16_at, u8_at};
use crate::column::{Column, ColumnType};
use crate::error::{JetError, Result};
use crate::format::{JetVersion, Layout};

/// Raw contents of one column within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field<'a> {
    Null,
    /// Booleans are stored in the null mask.
    Bool(bool),
    Data(&'a [u8]),
}

/// Splits `record` into one field per entry of `columns`, in the same order.
pub(crate) fn crack_row<'a>(
    record: &'a [u8],
    columns: &[Column],
    has_var_cols: bool,
    layout: &Layout,
) -> Result<Vec<Field<'a>>> {
    let (col_count, count_width) = match layout.version {
        JetVersion::Jet4 => (usize::from(u16_at(record, 0)?), 2),
        JetVersion::Jet3 => (usize::from(u8_at(record, 0)?), 1),
    };
    let mask_len = col_count.div_ceil(8);
    let mask = slice(record, sub(record.len(), mask_len, "null mask")?, mask_len)?;

    let var_offsets = if has_var_cols {
        match layout.version {
            JetVersion::Jet4 => var_offsets_jet4(record, mask_len)?,
            JetVersion::Jet3 => var_offsets_jet3(record, mask_len)?,
        }
    } else {
        Vec::new()
    };
    let var_count = var_offsets.len().saturating_sub(1);
    let fixed_in_row = col_count.saturating_sub(var_count);

    let mut fixed_seen = 0;
    let mut fields = Vec::with_capacity(columns.len());
    for column in columns {
        let present = mask_bit(mask, column.number);

        if column.column_type == ColumnType::Bool {
            if column.fixed {
                fixed_seen += 1;
            }
            fields.push(Field::Bool(present));
            continue;
        }

        if column.fixed {
            let in_row = fixed_seen < fixed_in_row;
            fixed_seen += 1;
            if !present || !in_row {
                fields.push(Field::Null);
                continue;
            }
            let start = count_width + usize::from(column.fixed_offset);
            fields.push(Field::Data(slice(record, start, usize::from(column.size))?));
        } else {
            let index = usize::from(column.var_index);
            if !present || index >= var_count {
                fields.push(Field::Null);
                continue;
            }
            let (start, end) = (var_offsets[index], var_offsets[index + 1]);
            if start > end || end > record.len() {
                return Err(JetError::Corrupt(format!(
                    "variable column {} spans {start}..{end} in a {} byte record",
                    column.name,
                    record.len()
                )));
            }
            fields.push(Field::Data(&record[start..end]));
        }
    }
    Ok(fields)
}

fn mask_bit(mask: &[u8], number: u16) -> bool {
    let number = usize::from(number);
    mask.get(number / 8)
        .is_some_and(|byte| byte & (1 << (number % 8)) != 0)
}

/// Jet 4: two-byte variable count before the mask, then two-byte offsets
/// in reverse, the last one marking the end of data.
fn var_offsets_jet4(record: &[u8], mask_len: usize) -> Result<Vec<usize>> {
    let n = record.len();
    let var_count = usize::from(u16_at(record, sub(n, mask_len + 2, "variable column count")?)?);
    (0..=var_count)
        .map(|i| {
            let pos = sub(n, mask_len + 4 + i * 2, "variable column offsets")?;
            Ok(usize::from(u16_at(record, pos)?))
        })
        .collect()
}

/// Jet 3: one-byte offsets, with a jump table adding 256 for each page of
/// record length crossed.
fn var_offsets_jet3(record: &[u8], mask_len: usize) -> Result<Vec<usize>> {
    let row_end = sub(record.len(), 1, "record")?;
    let var_count = usize::from(u8_at(record, sub(row_end, mask_len, "variable column count")?)?);

    let mut num_jumps = row_end / 256;
    let col_ptr = sub(row_end, mask_len + num_jumps + 1, "variable column offsets")?;
    // The last jump is a dummy when the offsets do not reach it
    if num_jumps > 0 && col_ptr.saturating_sub(var_count) / 256 < num_jumps {
        num_jumps -= 1;
    }

    let mut jumps_used = 0;
    let mut offsets = Vec::with_capacity(var_count + 1);
    for i in 0..=var_count {
        while jumps_used < num_jumps {
            let jump = u8_at(record, sub(row_end, mask_len + jumps_used + 1, "jump table")?)?;
            if usize::from(jump) != i {
                break;
            }
            jumps_used += 1;
        }
        let offset = u8_at(record, sub(col_ptr, i, "variable column offsets")?)?;
        offsets.push(usize::from(offset) + jumps_used * 256);
    }
    Ok(offsets)
}
