#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use mssql_value::SqlCell;
use mssql_value::decode::{decode_into, decode_plp_into};
use tds_wire::{Collation, ColumnData, TypeId, TypeInfo};

/// Column metadata as the server might describe it.
#[derive(Debug, Arbitrary)]
struct FuzzColumn {
    type_id: u8,
    max_length: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
    lcid: Option<u32>,
    vector_element_type: Option<u8>,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    column: FuzzColumn,
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: FuzzInput| {
    let Some(type_id) = TypeId::from_u8(input.column.type_id) else {
        return;
    };
    let column = ColumnData::new(
        "c",
        type_id,
        TypeInfo {
            max_length: input.column.max_length,
            precision: input.column.precision,
            scale: input.column.scale,
            collation: input.column.lcid.map(|lcid| Collation { lcid, sort_id: 0 }),
            vector_element_type: input.column.vector_element_type,
        },
    );

    let mut cell = SqlCell::new();
    let chunks: Vec<Bytes> = input.chunks.into_iter().map(Bytes::from).collect();
    let decoded = if column.is_plp() {
        decode_plp_into(&mut cell, &column, chunks)
    } else {
        decode_into(&mut cell, &column, Bytes::from(chunks.concat()))
    };

    // Accessors must reject bad values with an error, never a panic.
    if decoded.is_ok() {
        let _ = cell.value();
        let _ = cell.sql_value();
        let _ = cell.as_string();
    }
    cell.clear();
});
