//! Asynchronous reads that wait for the network.
//!
//! Covers:
//! - suspension and replay when bytes arrive in pieces
//! - the single pending operation rule
//! - command timeout and cancellation, inside and outside a row
//! - close waiting for a pending operation before releasing the connection
//! - opening a reader on a stream that has not delivered its metadata yet

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mssql_reader::{
    BufferedParser, ConnectionContext, DataReader, Error, PacketFeed, ProtocolState, ReaderConfig,
};
use mssql_value::SqlValue;
use tds_wire::{ColMetaData, ColumnData, MAX_LENGTH_MARKER, RowWriter, TypeId, TypeInfo};
use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

fn column(name: &str, type_id: TypeId, max_length: Option<u32>) -> ColumnData {
    ColumnData::new(
        name,
        type_id,
        TypeInfo {
            max_length,
            ..TypeInfo::default()
        },
    )
}

/// (id INT, payload VARBINARY(MAX))
fn md() -> ColMetaData {
    ColMetaData {
        columns: vec![
            column("id", TypeId::IntN, Some(4)),
            column("payload", TypeId::BigVarBinary, Some(MAX_LENGTH_MARKER)),
        ],
    }
}

fn rows(n: i32) -> RowWriter {
    let md = md();
    let mut w = RowWriter::new();
    for id in 1..=n {
        let payload = vec![id as u8; 10 * id as usize];
        w.row()
            .value(&md.columns[0], Some(&id.to_le_bytes()))
            .plp(None, &[&payload[..3], &payload[3..]]);
    }
    w.done(n as u64);
    w
}

fn reader(config: ReaderConfig) -> (DataReader, PacketFeed, Arc<ConnectionContext>) {
    let (parser, feed) = BufferedParser::new(512);
    let connection = ConnectionContext::new();
    let reader = DataReader::new(parser, md(), config, Arc::clone(&connection)).unwrap();
    (reader, feed, connection)
}

fn int_only() -> ColMetaData {
    ColMetaData {
        columns: vec![column("id", TypeId::IntN, Some(4))],
    }
}

fn int_rows(n: i32) -> RowWriter {
    let md = int_only();
    let mut w = RowWriter::new();
    for id in 1..=n {
        w.row().value(&md.columns[0], Some(&id.to_le_bytes()));
    }
    w.done(n as u64);
    w
}

fn untimed() -> ReaderConfig {
    ReaderConfig::new().command_timeout(None)
}

// ============================================================================
// Suspension and Replay
// ============================================================================

mod suspension {
    use super::*;

    #[tokio::test]
    async fn test_read_waits_for_row() {
        let (reader, feed, connection) = reader(untimed());
        let payload = rows(1).to_payload();

        let mut read = task::spawn(reader.read_async());
        assert_pending!(read.poll());
        feed.push_payload(&payload[..4]).unwrap();
        assert!(read.is_woken());
        assert_pending!(read.poll());
        feed.push_payload(&payload[4..]).unwrap();
        assert!(read.is_woken());
        assert!(assert_ready_ok!(read.poll()));
        drop(read);

        assert_eq!(reader.get_value(0).unwrap(), SqlValue::Int(1));
        assert_eq!(reader.get::<Bytes>(1).unwrap().len(), 10);
        assert!(!reader.read_async().await.unwrap());
        assert!(connection.snapshots().is_occupied());
    }

    #[tokio::test]
    async fn test_buffered_rows_take_the_fast_path() {
        let (parser, feed) = BufferedParser::new(512);
        let connection = ConnectionContext::new();
        let reader = DataReader::new(parser, int_only(), untimed(), Arc::clone(&connection)).unwrap();
        feed.push_payload(&int_rows(3).to_payload()).unwrap();

        for id in 1..=3 {
            assert!(reader.read_async().await.unwrap());
            assert_eq!(reader.get_value_async(0).await.unwrap(), SqlValue::Int(id));
        }
        assert!(!reader.read_async().await.unwrap());
        assert_eq!(reader.rows_affected().unwrap(), Some(3));
        assert!(!connection.snapshots().is_occupied());
    }

    #[tokio::test]
    async fn test_sequential_column_waits_mid_value() {
        let (reader, feed, _connection) = reader(untimed().sequential());
        let payload = rows(2).to_payload();
        // row 1 token and id, then the payload length marker
        feed.push_payload(&payload[..14]).unwrap();

        assert!(reader.read_async().await.unwrap());
        assert_eq!(reader.get_async::<i32>(0).await.unwrap(), 1);

        let mut value = task::spawn(reader.get_value_async(1));
        assert_pending!(value.poll());
        feed.push_payload(&payload[14..]).unwrap();
        assert!(value.is_woken());
        let value = assert_ready_ok!(value.poll());
        assert_eq!(value, SqlValue::Binary(Bytes::from(vec![1u8; 10])));

        assert!(reader.read_async().await.unwrap());
        assert!(!reader.is_null_async(1).await.unwrap());
        assert!(matches!(
            reader.get_async::<i32>(0).await,
            Err(Error::NonSequentialColumnAccess {
                requested: 0,
                current: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_split_packet_header_is_reassembled() {
        let (parser, feed) = BufferedParser::new(16);
        let reader = DataReader::new(parser, int_only(), untimed(), ConnectionContext::new()).unwrap();
        let wire: Vec<u8> = int_rows(2).to_packets(16).concat();

        // first packet, plus three bytes of the second packet's header
        feed.push_packet(&wire[..19]).unwrap();
        assert!(reader.read_async().await.unwrap());
        assert_eq!(reader.get_value(0).unwrap(), SqlValue::Int(1));

        let mut read = task::spawn(reader.read_async());
        assert_pending!(read.poll());
        feed.push_packet(&wire[19..]).unwrap();
        assert!(read.is_woken());
        assert!(assert_ready_ok!(read.poll()));
        drop(read);

        assert_eq!(reader.get_value(0).unwrap(), SqlValue::Int(2));
        assert!(!reader.read_async().await.unwrap());
        assert_eq!(reader.rows_affected().unwrap(), Some(2));
    }
}

// ============================================================================
// Pending Operations
// ============================================================================

mod pending {
    use super::*;

    #[tokio::test]
    async fn test_second_operation_is_rejected() {
        let (reader, feed, _connection) = reader(untimed());

        let mut read = task::spawn(reader.read_async());
        assert_pending!(read.poll());

        assert!(matches!(reader.read(), Err(Error::AsyncOperationPending)));
        assert!(matches!(reader.get_value(0), Err(Error::AsyncOperationPending)));
        assert!(matches!(
            reader.read_async().await,
            Err(Error::AsyncOperationPending)
        ));
        assert!(reader.cancel_handle().is_pending());

        feed.push_payload(&rows(1).to_payload()).unwrap();
        assert!(assert_ready_ok!(read.poll()));
        drop(read);

        assert!(!reader.cancel_handle().is_pending());
        assert_eq!(reader.get_value(0).unwrap(), SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_cancel_outside_row_keeps_reader_usable() {
        let (reader, feed, connection) = reader(untimed());
        let handle = reader.cancel_handle();

        let mut read = task::spawn(reader.read_async());
        assert_pending!(read.poll());
        assert!(handle.cancel());
        assert!(read.is_woken());
        assert!(matches!(assert_ready!(read.poll()), Err(Error::Cancelled)));
        drop(read);

        assert!(!reader.is_closed());
        assert_eq!(connection.state(), ProtocolState::Busy);
        assert!(!handle.cancel());

        feed.push_payload(&rows(1).to_payload()).unwrap();
        assert!(reader.read_async().await.unwrap());
        assert_eq!(reader.get_value(0).unwrap(), SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_cancel_mid_row_breaks_connection() {
        let (reader, feed, connection) = reader(untimed().sequential());
        let payload = rows(1).to_payload();
        feed.push_payload(&payload[..14]).unwrap();
        assert!(reader.read_async().await.unwrap());

        let mut value = task::spawn(reader.get_value_async(1));
        assert_pending!(value.poll());
        reader.cancel_handle().cancel();
        assert!(matches!(assert_ready!(value.poll()), Err(Error::Cancelled)));
        drop(value);

        assert!(reader.is_closed());
        assert!(connection.is_broken());
        assert!(matches!(reader.read(), Err(Error::ReaderClosed)));
    }
}

// ============================================================================
// Timeouts
// ============================================================================

mod timeouts {
    use super::*;

    #[tokio::test]
    async fn test_timeout_mid_row_dooms_reader() {
        let config = ReaderConfig::new()
            .sequential()
            .command_timeout(Duration::from_millis(50));
        let (reader, feed, connection) = reader(config);
        feed.push_payload(&rows(1).to_payload()[..14]).unwrap();
        assert!(reader.read_async().await.unwrap());

        let result = reader.get_value_async(1).await;
        assert!(matches!(result, Err(Error::CommandTimeout)));
        assert!(reader.is_closed());
        assert_eq!(connection.state(), ProtocolState::Broken);
        assert!(matches!(reader.read_async().await, Err(Error::ReaderClosed)));
    }

    #[tokio::test]
    async fn test_timeout_between_rows_is_recoverable() {
        let config = ReaderConfig::new().command_timeout(Duration::from_millis(50));
        let (reader, feed, connection) = reader(config);

        assert!(matches!(
            reader.read_async().await,
            Err(Error::CommandTimeout)
        ));
        assert!(!reader.is_closed());
        assert!(!connection.is_broken());

        feed.push_payload(&rows(1).to_payload()).unwrap();
        assert!(reader.read_async().await.unwrap());
    }
}

// ============================================================================
// Open and Close
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_close_drains_and_releases() {
        let (reader, feed, connection) = reader(untimed());
        feed.push_payload(&rows(3).to_payload()).unwrap();
        assert!(reader.read_async().await.unwrap());

        reader.close().await.unwrap();
        assert!(reader.is_closed());
        assert_eq!(connection.state(), ProtocolState::Ready);
        reader.close().await.unwrap();
        assert!(matches!(reader.read(), Err(Error::ReaderClosed)));
    }

    #[tokio::test]
    async fn test_close_waits_for_pending_operation() {
        let (reader, feed, connection) = reader(untimed());

        let mut read = task::spawn(reader.read_async());
        assert_pending!(read.poll());

        let mut close = task::spawn(reader.close());
        assert_pending!(close.poll());
        assert_eq!(connection.state(), ProtocolState::Busy);

        assert!(read.is_woken());
        assert!(matches!(assert_ready!(read.poll()), Err(Error::Cancelled)));
        drop(read);

        let mut w = RowWriter::new();
        w.done(0);
        feed.push_payload(&w.to_payload()).unwrap();

        assert!(close.is_woken());
        assert_ready_ok!(close.poll());
        assert_eq!(connection.state(), ProtocolState::Ready);
    }

    #[tokio::test]
    async fn test_reader_can_be_rebound_after_close() {
        let (reader, feed, connection) = reader(untimed());
        feed.push_payload(&rows(1).to_payload()).unwrap();
        reader.close().await.unwrap();

        let parser = BufferedParser::from_payload(&rows(1).to_payload());
        let next = DataReader::new(parser, md(), untimed(), connection).unwrap();
        assert!(next.read().unwrap());
    }

    #[tokio::test]
    async fn test_open_waits_for_metadata() {
        let mut w = RowWriter::new();
        // DONE of a preceding statement
        w.done(0).metadata(&md());
        w.raw(&rows(1).to_payload());
        let payload = w.to_payload();

        let (parser, feed) = BufferedParser::new(512);
        let connection = ConnectionContext::new();
        let mut open = task::spawn(DataReader::open(parser, untimed(), Arc::clone(&connection)));
        assert_pending!(open.poll());
        feed.push_payload(&payload[..20]).unwrap();
        assert_pending!(open.poll());
        feed.push_payload(&payload[20..]).unwrap();
        let reader = assert_ready_ok!(open.poll());

        assert_eq!(reader.field_count().unwrap(), 2);
        assert_eq!(connection.state(), ProtocolState::Busy);
        assert!(reader.read_async().await.unwrap());
        assert_eq!(reader.get::<i32>(0).unwrap(), 1);
        assert!(!reader.read_async().await.unwrap());
    }

    #[tokio::test]
    async fn test_open_on_closed_stream_breaks_connection() {
        let (parser, feed) = BufferedParser::new(512);
        feed.close();
        let connection = ConnectionContext::new();
        let result = DataReader::open(parser, untimed(), Arc::clone(&connection)).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(connection.is_broken());
    }
}

// ============================================================================
// Arbitrary Packet Splits
// ============================================================================

mod splits {
    use proptest::prelude::*;

    use super::*;

    async fn collect(reader: &DataReader) -> Vec<(SqlValue, SqlValue)> {
        let mut out = Vec::new();
        while reader.read_async().await.unwrap() {
            let id = reader.get_value_async(0).await.unwrap();
            let payload = reader.get_value_async(1).await.unwrap();
            out.push((id, payload));
        }
        out
    }

    fn expected() -> Vec<(SqlValue, SqlValue)> {
        (1..=4)
            .map(|id| {
                (
                    SqlValue::Int(id),
                    SqlValue::Binary(Bytes::from(vec![id as u8; 10 * id as usize])),
                )
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_rows_survive_any_packet_split(
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
            sequential in any::<bool>(),
        ) {
            let wire: Vec<u8> = rows(4).to_packets(32).concat();
            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(wire.len())).collect();
            points.push(wire.len());
            points.sort_unstable();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let got = runtime.block_on(async {
                let (parser, feed) = BufferedParser::new(32);
                let config = if sequential { untimed().sequential() } else { untimed() };
                let reader = DataReader::new(parser, md(), config, ConnectionContext::new()).unwrap();
                let push = async {
                    let mut start = 0;
                    for end in points {
                        tokio::task::yield_now().await;
                        feed.push_packet(&wire[start..end]).unwrap();
                        start = end;
                    }
                };
                let (got, ()) = tokio::join!(collect(&reader), push);
                got
            });
            prop_assert_eq!(got, expected());
        }
    }
}
