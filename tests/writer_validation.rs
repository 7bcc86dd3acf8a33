//! The integrity-checking writer: layout validation up front, then a full
//! write-and-read-back of a packed record stream.

use ulog_stream::{Field, LogData, LogLevel, Reader, SimpleWriter, StorageMode, UlogError};

/// Packed wire layout written by the test: 33 bytes per record.
struct TelemetryRecord {
    timestamp: u64,
    debug_array: [f32; 4],
    cpuload: f32,
    temperature: f32,
    counter: i8,
}

impl TelemetryRecord {
    fn fields() -> Vec<Field> {
        vec![
            Field::new("uint64_t", "timestamp"),
            Field::new_array("float", "debug_array", 4),
            Field::new("float", "cpuload"),
            Field::new("float", "temperature"),
            Field::new("int8_t", "counter"),
        ]
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(33);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        for value in self.debug_array {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&self.cpuload.to_le_bytes());
        bytes.extend_from_slice(&self.temperature.to_le_bytes());
        bytes.extend_from_slice(&self.counter.to_le_bytes());
        bytes
    }
}

#[test]
fn write_and_read_back_a_complete_log() {
    let mut writer = SimpleWriter::new(Vec::new(), 0).unwrap();

    let sys_name = "ULogExampleWriter";
    writer.write_info("sys_name", sys_name).unwrap();

    let param_a = 382.23f32;
    let param_b = 8272i32;
    writer.write_parameter("PARAM_A", param_a).unwrap();
    writer.write_parameter("PARAM_B", param_b).unwrap();

    // rejected layouts
    assert!(writer
        .write_message_format(
            "invalid_require_padding",
            &[
                Field::new("uint64_t", "timestamp"),
                Field::new("int8_t", "a"),
                Field::new("float", "b"),
            ],
        )
        .is_err());
    assert!(writer
        .write_message_format(
            "invalid_type",
            &[Field::new("uint64_t", "timestamp"), Field::new("my_type", "a")],
        )
        .is_err());
    assert!(writer
        .write_message_format("invalid_no_timestamp", &[Field::new("int8_t", "a")])
        .is_err());
    assert!(writer
        .write_message_format(
            "invalid_field_name",
            &[Field::new("uint64_t", "timestamp"), Field::new("int8_t", "a/b")],
        )
        .is_err());

    writer
        .write_message_format("my_data", &TelemetryRecord::fields())
        .unwrap();
    writer.header_complete().unwrap();

    let msg_id = writer.write_add_logged_message("my_data", 0).unwrap();

    let text_message = "Hello world";
    writer
        .write_text_message(LogLevel::Info, text_message, 0)
        .unwrap();

    let mut cpuload = 25.423f32;
    let mut written = Vec::new();
    for i in 0..100i32 {
        let record = TelemetryRecord {
            timestamp: i as u64 * 1000,
            debug_array: [0.0; 4],
            cpuload,
            temperature: 0.0,
            counter: i as i8,
        };
        writer.write_data(msg_id, &record.to_bytes()).unwrap();
        written.push(record);
        cpuload -= 0.424;
    }

    // read everything back
    let bytes = writer.into_sink();
    let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
    reader.read_chunk(&bytes);
    let log = reader.into_handler();

    assert!(log.parsing_errors().is_empty(), "{:?}", log.parsing_errors());
    assert!(!log.had_fatal_error());

    assert_eq!(
        log.message_info()["sys_name"].value().cast::<String>().unwrap(),
        sys_name
    );
    assert_eq!(log.logging().len(), 1);
    assert_eq!(log.logging()[0].message(), text_message);
    assert_eq!(
        log.initial_parameters()["PARAM_A"].value().cast::<f32>().unwrap(),
        param_a
    );
    assert_eq!(
        log.initial_parameters()["PARAM_B"].value().cast::<i32>().unwrap(),
        param_b
    );

    assert_eq!(log.message_formats()["my_data"].name(), "my_data");
    assert_eq!(log.subscription_names().len(), 1);

    let subscription = log.subscription("my_data", 0).unwrap();
    assert_eq!(subscription.len(), written.len());
    for (index, expected) in written.iter().enumerate() {
        let sample = subscription.sample(index).unwrap();
        assert_eq!(sample.raw_data(), &expected.to_bytes()[..]);
        assert_eq!(
            sample.get("timestamp").unwrap().cast::<u64>().unwrap(),
            expected.timestamp
        );
        assert_eq!(
            sample.get("cpuload").unwrap().cast::<f32>().unwrap(),
            expected.cpuload
        );
        assert_eq!(
            sample.get("counter").unwrap().cast::<i8>().unwrap(),
            expected.counter
        );
    }
}

#[test]
fn padding_violation_names_the_field() {
    let mut writer = SimpleWriter::new(Vec::new(), 0).unwrap();
    let err = writer
        .write_message_format(
            "needs_padding",
            &[
                Field::new("uint64_t", "timestamp"),
                Field::new("int8_t", "a"),
                Field::new("float", "b"),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, UlogError::Usage { .. }));
    assert!(err.to_string().contains("field: b"));
}

#[test]
fn sample_size_mismatch_is_a_usage_error() {
    let mut writer = SimpleWriter::new(Vec::new(), 0).unwrap();
    writer
        .write_message_format("my_data", &TelemetryRecord::fields())
        .unwrap();
    writer.header_complete().unwrap();
    let msg_id = writer.write_add_logged_message("my_data", 0).unwrap();

    let err = writer.write_data(msg_id, &[0u8; 32]).unwrap_err();
    assert!(matches!(err, UlogError::Usage { .. }));
}
