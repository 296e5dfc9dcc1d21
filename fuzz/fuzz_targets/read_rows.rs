#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mssql_reader::{BufferedParser, ConnectionContext, DataReader, ReaderConfig};
use tds_wire::{ColMetaData, Collation, ColumnData, MAX_LENGTH_MARKER, TypeId, TypeInfo};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sequential: bool,
    /// Read every column before moving on, or skip straight to the next row.
    touch_columns: bool,
    /// Feed the stream as framed packets instead of a raw token payload.
    framed: bool,
    data: Vec<u8>,
}

fn metadata() -> ColMetaData {
    let column = |name: &str, type_id, max_length, collation| {
        ColumnData::new(
            name,
            type_id,
            TypeInfo {
                max_length,
                collation,
                ..TypeInfo::default()
            },
        )
    };
    let collation = Some(Collation {
        lcid: 0x0409,
        sort_id: 52,
    });
    ColMetaData {
        columns: vec![
            column("id", TypeId::IntN, Some(4), None),
            column("name", TypeId::NVarChar, Some(200), collation),
            column("code", TypeId::BigVarChar, Some(20), collation),
            column("blob", TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER), None),
            column("at", TypeId::DateTime2, None, None),
        ],
    }
}

fuzz_target!(|input: FuzzInput| {
    let parser = if input.framed {
        match BufferedParser::from_packets([input.data.as_slice()], 512) {
            Ok(parser) => parser,
            Err(_) => return,
        }
    } else {
        BufferedParser::from_payload(&input.data)
    };
    let config = if input.sequential {
        ReaderConfig::new().sequential()
    } else {
        ReaderConfig::new()
    }
    .command_timeout(None);
    let Ok(reader) = DataReader::new(parser, metadata(), config, ConnectionContext::new()) else {
        return;
    };

    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().build() else {
        return;
    };
    runtime.block_on(async {
        // The feed is closed, so running out of data is an error rather than a hang.
        while let Ok(true) = reader.read_async().await {
            if input.touch_columns {
                for index in 0..5 {
                    let _ = reader.get_value_async(index).await;
                }
            }
        }
        let _ = reader.close().await;
    });
});
