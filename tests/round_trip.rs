//! Write a log through the low-level writer, stream it back, and compare
//! the reconstructed container against the inputs.

use ulog_stream::{
    AddLoggedMessage, Data, Field, FileHeader, LogData, LogLevel, Logging, MessageFormat,
    MessageInfo, Reader, StorageMode, Writer,
};

fn format_message_name() -> MessageFormat {
    MessageFormat::new(
        "message_name",
        vec![
            Field::new("uint64_t", "timestamp"),
            Field::new("float", "float_value"),
        ],
    )
}

fn format_other_message() -> MessageFormat {
    MessageFormat::new(
        "other_message",
        vec![
            Field::new("uint64_t", "timestamp"),
            Field::new_array("uint32_t", "array", 3),
            Field::new("uint16_t", "x"),
        ],
    )
}

fn sample_payload() -> Vec<u8> {
    // matches the resolved size of other_message: 8 + 12 + 2
    let mut payload = vec![0u8; 22];
    payload[0] = 32;
    payload[20] = 49;
    payload
}

#[test]
fn write_then_read_reconstructs_the_log() {
    let file_header = FileHeader::new(0, false);
    let format1 = format_message_name();
    let format2 = format_other_message();
    let info = MessageInfo::with_string("info", "test_value");
    let logging = Logging::new(LogLevel::Warning, "logging message", 3_834_732);
    let msg_id = 1u16;
    let add_logged = AddLoggedMessage::new(0, msg_id, "other_message");
    let data = Data::new(msg_id, sample_payload());

    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.file_header(&file_header).unwrap();
    writer.message_info(&info).unwrap();
    writer.message_format(&format1).unwrap();
    writer.message_format(&format2).unwrap();
    writer.header_complete();
    writer.logging(&logging).unwrap();
    writer.add_logged_message(&add_logged).unwrap();
    writer.data(&data).unwrap();
    writer.data(&data).unwrap();
    let bytes = writer.into_sink();
    assert!(!bytes.is_empty());

    let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
    reader.read_chunk(&bytes);
    let log = reader.into_handler();

    assert!(log.parsing_errors().is_empty(), "{:?}", log.parsing_errors());
    assert!(!log.had_fatal_error());
    assert!(log.is_header_complete());

    // raw state
    assert_eq!(log.file_header(), Some(&file_header));
    assert_eq!(log.message_formats()["message_name"].as_ref(), &format1);
    assert_eq!(log.message_formats()["other_message"].as_ref(), &format2);
    assert_eq!(log.message_info()["info"], info);
    assert_eq!(log.logging(), &[logging]);

    let by_id = log.subscription_by_msg_id(msg_id).unwrap();
    assert_eq!(by_id.raw_samples(), &[data.clone(), data.clone()]);

    // convenience lookups
    let subscription = log.subscription("other_message", 0).unwrap();
    assert_eq!(subscription.format().as_ref(), &format2);
    assert_eq!(subscription.len(), 2);

    let timestamp_field = subscription.field("timestamp").unwrap();
    let x_field = subscription.field("x").unwrap();
    for sample in subscription.iter() {
        assert_eq!(sample.at_field(timestamp_field).unwrap().cast::<i32>().unwrap(), 32);
        assert_eq!(sample.at_field(x_field).unwrap().cast::<i32>().unwrap(), 49);
        assert_eq!(sample.get("timestamp").unwrap().cast::<i32>().unwrap(), 32);
        assert_eq!(sample.get("x").unwrap().cast::<i32>().unwrap(), 49);
    }
}

#[test]
fn header_only_mode_keeps_metadata_drops_samples() {
    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.file_header(&FileHeader::new(0, false)).unwrap();
    writer.message_format(&format_other_message()).unwrap();
    writer.header_complete();
    writer
        .add_logged_message(&AddLoggedMessage::new(0, 1, "other_message"))
        .unwrap();
    writer.data(&Data::new(1, sample_payload())).unwrap();
    writer
        .logging(&Logging::new(LogLevel::Info, "dropped", 7))
        .unwrap();
    let bytes = writer.into_sink();

    let mut reader = Reader::new(LogData::new(StorageMode::HeaderOnly));
    reader.read_chunk(&bytes);
    let log = reader.into_handler();

    assert!(log.parsing_errors().is_empty());
    assert!(log.message_formats().contains_key("other_message"));
    let subscription = log.subscription("other_message", 0).unwrap();
    assert!(subscription.is_empty());
    assert!(log.logging().is_empty());
}

#[test]
fn log_with_no_formats_and_no_data_parses_to_an_empty_container() {
    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.file_header(&FileHeader::new(42, false)).unwrap();
    writer.header_complete();
    let bytes = writer.into_sink();

    let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
    reader.read_chunk(&bytes);
    let log = reader.into_handler();

    assert!(log.parsing_errors().is_empty());
    assert!(!log.had_fatal_error());
    assert!(log.message_formats().is_empty());
    assert_eq!(log.subscription_names().len(), 0);
    // no data-phase message ever arrived, so the header never completed
    assert!(!log.is_header_complete());
    assert_eq!(log.file_header().unwrap().timestamp_us(), 42);
}
