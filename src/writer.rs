//! Low-level ULog serializer.
//!
//! [`Writer`] emits messages to a caller-provided [`ByteSink`] in wire
//! order. It enforces only the structural call order of the format — the
//! file header first, formats before the header completes, subscriptions
//! after — and leaves content integrity to [`SimpleWriter`].
//!
//! [`SimpleWriter`]: crate::simple_writer::SimpleWriter

use crate::error::{Result, UlogError};
use crate::messages::{
    AddLoggedMessage, Data, Dropout, FileHeader, Logging, MessageFormat, MessageInfo, Parameter,
    ParameterDefault, SyncMessage,
};
use crate::wire::MessageType;

/// Receives serialized bytes from a writer.
///
/// The sink must be total: it is called for every emitted byte run and has
/// no way to signal failure or request a retry.
pub trait ByteSink {
    /// Accept the next run of serialized bytes.
    fn write_bytes(&mut self, bytes: &[u8]);
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes);
    }
}

/// Adapter turning a closure into a [`ByteSink`].
pub struct SinkFn<F: FnMut(&[u8])>(
    /// The wrapped callback.
    pub F,
);

impl<F: FnMut(&[u8])> ByteSink for SinkFn<F> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        (self.0)(bytes);
    }
}

/// Serializes ULog messages to a byte sink.
pub struct Writer<S: ByteSink> {
    sink: S,
    header_complete: bool,
}

impl<S: ByteSink> Writer<S> {
    /// Create a writer emitting to `sink`.
    ///
    /// Fails on a big-endian host: data payloads are caller-provided raw
    /// records and would be emitted byte-swapped.
    pub fn new(sink: S) -> Result<Writer<S>> {
        if cfg!(target_endian = "big") {
            return Err(UlogError::usage("writer requires a little-endian host"));
        }
        Ok(Writer {
            sink,
            header_complete: false,
        })
    }

    /// The underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the writer and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Write the file header (and flag bits). Must come first.
    pub fn file_header(&mut self, header: &FileHeader) -> Result<()> {
        header.serialize(&mut self.sink)
    }

    /// Write a key/value info message.
    pub fn message_info(&mut self, info: &MessageInfo) -> Result<()> {
        info.serialize(&mut self.sink, MessageType::Info)
    }

    /// Write a message format definition. Formats belong to the header.
    pub fn message_format(&mut self, format: &MessageFormat) -> Result<()> {
        if self.header_complete {
            return Err(UlogError::usage(
                "header already complete, cannot write formats",
            ));
        }
        format.serialize(&mut self.sink)
    }

    /// Write a parameter value.
    pub fn parameter(&mut self, parameter: &Parameter) -> Result<()> {
        parameter.serialize(&mut self.sink, MessageType::Parameter)
    }

    /// Write a parameter default value.
    pub fn parameter_default(&mut self, parameter_default: &ParameterDefault) -> Result<()> {
        parameter_default.serialize(&mut self.sink)
    }

    /// Mark the header as complete. Emits nothing; the reader infers the
    /// transition from the first data-phase message.
    pub fn header_complete(&mut self) {
        self.header_complete = true;
    }

    /// Write a subscription message. Only valid after the header completed.
    pub fn add_logged_message(&mut self, add_logged: &AddLoggedMessage) -> Result<()> {
        if !self.header_complete {
            return Err(UlogError::usage(
                "header not yet complete, cannot write subscriptions",
            ));
        }
        add_logged.serialize(&mut self.sink)
    }

    /// Write a logged text message.
    pub fn logging(&mut self, logging: &Logging) -> Result<()> {
        logging.serialize(&mut self.sink)
    }

    /// Write a data sample.
    pub fn data(&mut self, data: &Data) -> Result<()> {
        data.serialize(&mut self.sink)
    }

    /// Write a dropout marker.
    pub fn dropout(&mut self, dropout: &Dropout) -> Result<()> {
        dropout.serialize(&mut self.sink)
    }

    /// Write a synchronization marker.
    pub fn sync(&mut self, sync: &SyncMessage) -> Result<()> {
        sync.serialize(&mut self.sink)
    }
}
