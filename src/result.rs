//! Query results: field descriptors, per-statement results and batches.
use bytes::{Buf, Bytes};

use crate::common::ByteStr;
use crate::error::FramingError;
use crate::ext::BytesExt;
use crate::postgres::{Oid, PgFormat};
use crate::value::PgValue;

/// One column of a row description.
#[derive(Clone, Debug)]
pub struct FieldDescription {
    /// The field name.
    pub name: ByteStr,
    /// The table oid, or zero when the field is not a table column.
    pub table_oid: Oid,
    /// The attribute number within the table, or zero.
    pub col_num: i16,
    /// The oid of the field's data type.
    pub type_oid: Oid,
    /// The data type size; negative values denote variable width types.
    pub type_size: i16,
    /// The type modifier.
    pub type_mod: i32,
    /// The format the values of this column arrive in.
    pub format: PgFormat,
}

impl FieldDescription {
    /// Parse the descriptor list of a `RowDescription` body.
    pub(crate) fn parse_all(
        mut body: Bytes,
        count: u16,
    ) -> Result<Vec<FieldDescription>, FramingError> {
        // name then: table oid, column, type oid, type size, type mod, format
        const SUFFIX: usize = 4 + 2 + 4 + 2 + 4 + 2;

        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = body.try_get_nul_bytestr()?;
            if body.remaining() < SUFFIX {
                return Err(FramingError::new("invalid row description"));
            }
            let table_oid = body.get_u32();
            let col_num = body.get_i16();
            let type_oid = body.get_u32();
            let type_size = body.get_i16();
            let type_mod = body.get_i32();
            let format = PgFormat::from_code(body.get_u16())
                .ok_or_else(|| FramingError::new("invalid field format code"))?;
            fields.push(FieldDescription {
                name,
                table_oid,
                col_num,
                type_oid,
                type_size,
                type_mod,
                format,
            });
        }
        if body.has_remaining() {
            return Err(FramingError::new("additional data after row description"));
        }
        Ok(fields)
    }
}

/// Result of a single executed statement.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Field descriptors, `None` for statements without a result set.
    pub fields: Option<Vec<FieldDescription>>,
    /// Decoded rows, `None` for statements without a result set.
    pub rows: Option<Vec<Vec<PgValue>>>,
    /// The command tag as reported by the server, e.g. `SELECT 1`.
    pub tag: String,
}

impl QueryResult {
    /// The number of affected records, parsed from the tag tail.
    pub fn records_affected(&self) -> Option<u64> {
        let (_, count) = self.tag.rsplit_once(' ')?;
        count.parse().ok()
    }
}

/// Results of one execute cycle, one entry per statement.
///
/// A simple query script yields one entry per statement in server order;
/// an extended query cycle yields exactly one.
#[derive(Debug, Default)]
pub struct ResultSet {
    results: Vec<QueryResult>,
    current: usize,
}

impl ResultSet {
    pub(crate) fn new(results: Vec<QueryResult>) -> Self {
        Self { results, current: 0 }
    }

    /// All statement results in server order.
    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    /// The result currently selected.
    pub fn current(&self) -> Option<&QueryResult> {
        self.results.get(self.current)
    }

    /// Advance to the next statement result. Returns whether one exists.
    pub fn next_result(&mut self) -> bool {
        if self.current < self.results.len() {
            self.current += 1;
        }
        self.current < self.results.len()
    }

    /// Rows of the current result.
    pub fn rows(&self) -> Option<&[Vec<PgValue>]> {
        self.current()?.rows.as_deref()
    }

    /// Fields of the current result.
    pub fn fields(&self) -> Option<&[FieldDescription]> {
        self.current()?.fields.as_deref()
    }

    /// Command tag of the current result.
    pub fn tag(&self) -> Option<&str> {
        self.current().map(|r| r.tag.as_str())
    }

    /// Affected record count of the current result.
    pub fn records_affected(&self) -> Option<u64> {
        self.current()?.records_affected()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}
