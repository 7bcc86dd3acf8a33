//! The receiving side of the streaming reader.
//!
//! The reader pushes every decoded message into a [`MessageHandler`]. All
//! methods have no-op defaults, so a handler only implements what it cares
//! about; a completely empty handler is legal (errors then go unnoticed).
//!
//! Handler methods return [`Result`]: a [`UlogError::Parse`] return makes
//! the reader treat the message as corrupt (report once, drop it,
//! resynchronize); a [`UlogError::Fatal`] return stops the reader for good.

use crate::error::Result;
use crate::messages::{
    AddLoggedMessage, Data, Dropout, FileHeader, Logging, MessageFormat, MessageInfo, Parameter,
    ParameterDefault, SyncMessage,
};

/// Receives decoded messages and stream events from a reader.
#[allow(unused_variables)]
pub trait MessageHandler {
    /// The log header is complete: all formats are known, data follows.
    /// Called exactly once, before the first data-phase message.
    fn header_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// A stream error. Recoverable errors are reported at most once per
    /// corruption episode; fatal errors terminate parsing.
    fn error(&mut self, message: &str, is_recoverable: bool) {}

    /// The file header (with flag bits when the log carries them).
    fn file_header(&mut self, header: FileHeader) -> Result<()> {
        Ok(())
    }

    /// A key/value info message (single- or multi-part).
    fn message_info(&mut self, info: MessageInfo) -> Result<()> {
        Ok(())
    }

    /// A message format definition.
    fn message_format(&mut self, format: MessageFormat) -> Result<()> {
        Ok(())
    }

    /// A parameter value.
    fn parameter(&mut self, parameter: Parameter) -> Result<()> {
        Ok(())
    }

    /// A parameter default value.
    fn parameter_default(&mut self, parameter_default: ParameterDefault) -> Result<()> {
        Ok(())
    }

    /// A subscription of a format to a wire message id.
    fn add_logged_message(&mut self, add_logged: AddLoggedMessage) -> Result<()> {
        Ok(())
    }

    /// A logged text message.
    fn logging(&mut self, logging: Logging) -> Result<()> {
        Ok(())
    }

    /// A data sample.
    fn data(&mut self, data: Data) -> Result<()> {
        Ok(())
    }

    /// A dropout marker.
    fn dropout(&mut self, dropout: Dropout) -> Result<()> {
        Ok(())
    }

    /// A synchronization marker.
    fn sync(&mut self, sync: SyncMessage) -> Result<()> {
        Ok(())
    }
}
