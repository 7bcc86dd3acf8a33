//! Chunk-schedule invariance: parsing the same byte stream in chunks of
//! any size yields an identical container, down to one byte per call.

use ulog_stream::{
    AddLoggedMessage, Data, Field, FileHeader, LogData, LogLevel, Logging, MessageFormat,
    MessageInfo, Reader, StorageMode, Writer,
};

/// Magic, version, timestamp and flag bits; must arrive in one chunk.
const FIRST_CHUNK: usize = 100;

fn build_log() -> Vec<u8> {
    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.file_header(&FileHeader::new(1_000, false)).unwrap();
    writer
        .message_info(&MessageInfo::with_string("sys_name", "chunk_test"))
        .unwrap();
    writer
        .message_format(&MessageFormat::new(
            "imu",
            vec![
                Field::new("uint64_t", "timestamp"),
                Field::new_array("float", "accel", 3),
                Field::new("uint8_t", "instance"),
            ],
        ))
        .unwrap();
    writer.header_complete();
    writer
        .add_logged_message(&AddLoggedMessage::new(0, 0, "imu"))
        .unwrap();
    writer
        .add_logged_message(&AddLoggedMessage::new(1, 1, "imu"))
        .unwrap();
    writer
        .logging(&Logging::new(LogLevel::Notice, "recording", 5_000))
        .unwrap();
    for i in 0..20u64 {
        let mut payload = (i * 500).to_le_bytes().to_vec();
        for axis in 0..3 {
            payload.extend_from_slice(&(i as f32 + axis as f32).to_le_bytes());
        }
        payload.push(i as u8);
        writer
            .data(&Data::new((i % 2) as u16, payload))
            .unwrap();
    }
    writer.into_sink()
}

/// A comparable projection of the parsed state.
fn snapshot(log: &LogData) -> (Vec<String>, Vec<(u16, usize)>, Vec<String>, usize) {
    let formats = log.message_formats().keys().cloned().collect();
    let mut samples: Vec<(u16, usize)> = log
        .subscriptions()
        .map(|s| (s.msg_id(), s.len()))
        .collect();
    samples.sort_unstable();
    let logging = log.logging().iter().map(|l| l.message().to_string()).collect();
    (formats, samples, logging, log.message_info().len())
}

fn parse_with_chunks(bytes: &[u8], chunk_size: usize) -> LogData {
    let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
    reader.read_chunk(&bytes[..FIRST_CHUNK]);
    let mut offset = FIRST_CHUNK;
    while offset < bytes.len() {
        let end = (offset + chunk_size).min(bytes.len());
        reader.read_chunk(&bytes[offset..end]);
        offset = end;
    }
    let log = reader.into_handler();
    assert!(log.parsing_errors().is_empty(), "{:?}", log.parsing_errors());
    assert!(!log.had_fatal_error());
    log
}

#[test]
fn any_chunk_schedule_yields_the_same_state() {
    let bytes = build_log();
    assert!(bytes.len() > FIRST_CHUNK);

    let whole = {
        let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
        reader.read_chunk(&bytes);
        reader.into_handler()
    };
    let reference = snapshot(&whole);
    assert_eq!(reference.1.iter().map(|(_, n)| n).sum::<usize>(), 20);

    for chunk_size in [1, 2, 3, 5, 7, 64, 1024, 4096] {
        let log = parse_with_chunks(&bytes, chunk_size);
        assert_eq!(snapshot(&log), reference, "chunk size {chunk_size}");
    }
}

#[test]
fn samples_split_mid_message_decode_exactly_once() {
    let bytes = build_log();

    // split inside the last data message's payload
    let split = bytes.len() - 10;
    let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
    reader.read_chunk(&bytes[..FIRST_CHUNK]);
    reader.read_chunk(&bytes[FIRST_CHUNK..split]);

    let samples_before: usize = reader.handler().subscriptions().map(|s| s.len()).sum();
    reader.read_chunk(&bytes[split..]);
    let log = reader.into_handler();

    let samples_after: usize = log.subscriptions().map(|s| s.len()).sum();
    assert!(samples_before < samples_after);
    assert_eq!(samples_after, 20);
    assert!(log.parsing_errors().is_empty());
}
