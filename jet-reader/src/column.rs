//! Column metadata.

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Byte,
    Int,
    Long,
    Currency,
    Float,
    Double,
    DateTime,
    Binary,
    Text,
    Ole,
    Memo,
    Guid,
    Numeric,
    Complex,
    BigInt,
    Unknown(u8),
}

impl ColumnType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => ColumnType::Bool,
            0x02 => ColumnType::Byte,
            0x03 => ColumnType::Int,
            0x04 => ColumnType::Long,
            0x05 => ColumnType::Currency,
            0x06 => ColumnType::Float,
            0x07 => ColumnType::Double,
            0x08 => ColumnType::DateTime,
            0x09 => ColumnType::Binary,
            0x0A => ColumnType::Text,
            0x0B => ColumnType::Ole,
            0x0C => ColumnType::Memo,
            0x0F => ColumnType::Guid,
            0x10 => ColumnType::Numeric,
            0x12 => ColumnType::Complex,
            0x13 => ColumnType::BigInt,
            other => ColumnType::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ColumnType::Bool => 0x01,
            ColumnType::Byte => 0x02,
            ColumnType::Int => 0x03,
            ColumnType::Long => 0x04,
            ColumnType::Currency => 0x05,
            ColumnType::Float => 0x06,
            ColumnType::Double => 0x07,
            ColumnType::DateTime => 0x08,
            ColumnType::Binary => 0x09,
            ColumnType::Text => 0x0A,
            ColumnType::Ole => 0x0B,
            ColumnType::Memo => 0x0C,
            ColumnType::Guid => 0x0F,
            ColumnType::Numeric => 0x10,
            ColumnType::Complex => 0x12,
            ColumnType::BigInt => 0x13,
            ColumnType::Unknown(code) => code,
        }
    }

    /// Whether values live outside the row, behind a long-value header.
    pub fn is_long_value(self) -> bool {
        matches!(self, ColumnType::Memo | ColumnType::Ole)
    }
}

/// A column as declared in the table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Column number; rows are returned in this order.
    pub number: u16,
    /// Declared size in bytes.
    pub size: u16,
    pub precision: u8,
    pub scale: u8,
    pub(crate) var_index: u16,
    pub(crate) fixed_offset: u16,
    pub(crate) fixed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for code in 0u8..=0x14 {
            assert_eq!(ColumnType::from_code(code).code(), code);
        }
    }
}
