//! Streaming reader and writer for the ULog flight-telemetry log format.
//!
//! ULog is a self-describing binary format: a log carries its own message
//! format definitions (including nested ones), subscriptions binding wire
//! message ids to formats, and an append-only sequence of data samples,
//! parameters, info entries, text messages, dropouts and sync markers.
//!
//! This crate implements the message codec:
//!
//! - [`Reader`] — a push parser. Feed it byte chunks of any size; it
//!   reassembles messages across chunk boundaries, detects corruption,
//!   resynchronizes, and emits typed messages into a [`MessageHandler`].
//! - [`LogData`] — a ready-made handler indexing a whole log: format
//!   registry, subscriptions, parameters, info, text messages.
//! - [`Value`] — runtime-typed access to sample bytes against resolved
//!   format metadata, with casts, array indexing and nested navigation.
//! - [`Writer`] / [`SimpleWriter`] — serializers emitting to a caller
//!   provided byte sink; `SimpleWriter` additionally enforces call order
//!   and field-layout safety.
//!
//! The crate performs no I/O of its own: bytes come in through
//! [`Reader::read_chunk`] and go out through a [`ByteSink`].
//!
//! # Reading
//!
//! ```
//! use ulog_stream::{LogData, Reader, StorageMode};
//!
//! # fn read(log_bytes: &[u8]) -> ulog_stream::Result<()> {
//! let mut reader = Reader::new(LogData::new(StorageMode::FullLog));
//! reader.read_chunk(log_bytes);
//! let log = reader.into_handler();
//!
//! for subscription in log.subscriptions() {
//!     for sample in subscription.iter() {
//!         let timestamp: u64 = sample.get("timestamp")?.cast()?;
//!         let _ = timestamp;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//!
//! ```
//! use ulog_stream::{Field, LogLevel, SimpleWriter};
//!
//! # fn write() -> ulog_stream::Result<Vec<u8>> {
//! let mut writer = SimpleWriter::new(Vec::new(), 0)?;
//! writer.write_info("sys_name", "example")?;
//! writer.write_message_format(
//!     "vehicle_status",
//!     &[
//!         Field::new("uint64_t", "timestamp"),
//!         Field::new("uint8_t", "armed"),
//!     ],
//! )?;
//! writer.header_complete()?;
//! let id = writer.write_add_logged_message("vehicle_status", 0)?;
//! writer.write_data(id, &[0u8; 9])?;
//! writer.write_text_message(LogLevel::Info, "armed", 1)?;
//! # Ok(writer.into_sink())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod error;
pub mod field;
pub mod handler;
pub mod messages;
pub mod reader;
pub mod simple_writer;
pub mod subscription;
pub mod value;
pub mod wire;
pub mod writer;

pub use container::{LogData, StorageMode};
pub use error::{Result, UlogError};
pub use field::{BasicType, Field};
pub use handler::MessageHandler;
pub use messages::{
    AddLoggedMessage, Data, Dropout, FileHeader, FlagBits, LogLevel, Logging, MessageFormat,
    MessageInfo, Parameter, ParameterDefault, SyncMessage,
};
pub use reader::Reader;
pub use simple_writer::{InfoValue, ParamValue, SimpleWriter};
pub use subscription::{Subscription, TypedDataView};
pub use value::{CastFrom, NativeValue, Value};
pub use wire::MessageType;
pub use writer::{ByteSink, SinkFn, Writer};
