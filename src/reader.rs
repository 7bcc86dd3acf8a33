//! Streaming ULog parser.
//!
//! [`Reader`] consumes arbitrary-sized chunks of bytes, reassembles
//! messages that straddle chunk boundaries in a single growable buffer, and
//! pushes every decoded message into its [`MessageHandler`]. All work
//! happens inside the caller's [`Reader::read_chunk`] call.
//!
//! The parser is a state machine: `ReadMagic → ReadFlagBits → ReadHeader →
//! ReadData`, with a terminal `InvalidData` state for fatal stream errors.
//! The transition to `ReadData` happens on the first data-phase message
//! (subscription or logged text) and is one-shot; it is the signal for the
//! handler that all message formats are known.
//!
//! Corruption (zero message size or type, or a message that fails to
//! decode) is reported once per episode through the handler, then the
//! parser scans byte-by-byte for the next plausible message header and
//! resumes.

use tracing::{debug, warn};

use crate::error::{Result, UlogError};
use crate::handler::MessageHandler;
use crate::messages::{
    AddLoggedMessage, Data, Dropout, FileHeader, FlagBits, Logging, MessageFormat, MessageInfo,
    ParameterDefault, SyncMessage,
};
use crate::wire::{
    read_message_header, MessageType, FILE_HEADER_LEN, FILE_MAGIC, FLAG_BITS_BODY_LEN,
    INCOMPAT_FLAG0_DATA_APPENDED, MAX_PLAUSIBLE_MSG_SIZE, MSG_HEADER_LEN,
};

/// Initial size of the reassembly buffer; it doubles when a message needs
/// more.
const INITIAL_BUFFER_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadMagic,
    ReadFlagBits,
    ReadHeader,
    ReadData,
    InvalidData,
}

/// Streaming parser pushing decoded messages into a [`MessageHandler`].
///
/// Feed bytes in order with [`Reader::read_chunk`]; chunk boundaries are
/// arbitrary, except that the 16-byte file header (and the flag-bits
/// message, when present) must each arrive within a single chunk.
pub struct Reader<H: MessageHandler> {
    handler: H,
    state: State,
    /// Reassembly buffer; holds at most one partial message outside of
    /// corruption recovery.
    partial: Vec<u8>,
    partial_capacity: usize,
    need_recovery: bool,
    corruption_reported: bool,
    total_bytes_read: usize,
    file_version: u8,
    file_timestamp: u64,
}

impl<H: MessageHandler> Reader<H> {
    /// Create a parser feeding `handler`.
    ///
    /// On a big-endian host the handler receives a fatal error immediately
    /// and the parser stays inert.
    pub fn new(handler: H) -> Reader<H> {
        let mut reader = Reader {
            handler,
            state: State::ReadMagic,
            partial: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            partial_capacity: INITIAL_BUFFER_CAPACITY,
            need_recovery: false,
            corruption_reported: false,
            total_bytes_read: 0,
            file_version: 0,
            file_timestamp: 0,
        };
        if cfg!(target_endian = "big") {
            reader
                .handler
                .error("reader requires a little-endian host", false);
            reader.state = State::InvalidData;
        }
        reader
    }

    /// The attached handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The attached handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consume the parser and return the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Total number of bytes accepted so far (including bytes waiting in
    /// the reassembly buffer).
    pub fn total_bytes_read(&self) -> usize {
        self.total_bytes_read
    }

    /// Parse the next chunk of the byte stream, emitting every fully
    /// decoded message to the handler.
    ///
    /// Never fails: stream errors are surfaced through the handler's
    /// `error` method, and after a fatal error further chunks are ignored.
    pub fn read_chunk(&mut self, mut data: &[u8]) {
        if self.state == State::InvalidData {
            return;
        }
        if self.state == State::ReadMagic {
            let consumed = self.read_magic(data);
            data = &data[consumed.min(data.len())..];
            self.total_bytes_read += consumed;
        }
        if self.state == State::ReadFlagBits && !data.is_empty() {
            let consumed = self.read_flag_bits(data);
            data = &data[consumed.min(data.len())..];
            self.total_bytes_read += consumed;
        }

        loop {
            data = self.pump_messages(data);
            if !self.need_recovery || self.state == State::InvalidData {
                break;
            }
            data = self.try_to_recover(data);
            if self.need_recovery {
                // input exhausted without finding a message boundary
                break;
            }
        }
    }

    /// Decode messages until the input and the reassembly buffer hold no
    /// further complete message. Returns the unconsumed tail of `data`.
    fn pump_messages<'a>(&mut self, mut data: &'a [u8]) -> &'a [u8] {
        loop {
            if self.need_recovery || self.state == State::InvalidData {
                return data;
            }

            if !self.partial.is_empty() {
                let consumed = self.fill_partial(MSG_HEADER_LEN, data);
                data = &data[consumed..];
                if self.partial.len() < MSG_HEADER_LEN {
                    return data;
                }
                let (msg_size, _) = read_message_header(&self.partial);
                let total = MSG_HEADER_LEN + msg_size as usize;
                let consumed = self.fill_partial(total, data);
                data = &data[consumed..];
                if self.partial.len() < total {
                    return data;
                }
                // hand the message over without holding a borrow on self
                let buffer = std::mem::take(&mut self.partial);
                self.process_message(&buffer[..total]);
                self.partial = buffer;
                self.partial.drain(..total);
            } else if data.len() > MSG_HEADER_LEN {
                let (msg_size, _) = read_message_header(data);
                let total = MSG_HEADER_LEN + msg_size as usize;
                if data.len() >= total {
                    let (message, rest) = data.split_at(total);
                    self.total_bytes_read += total;
                    self.process_message(message);
                    data = rest;
                } else {
                    let appended = self.append_to_partial(data);
                    data = &data[appended..];
                    if data.is_empty() {
                        return data;
                    }
                }
            } else if !data.is_empty() {
                let appended = self.append_to_partial(data);
                data = &data[appended..];
                if data.is_empty() {
                    return data;
                }
            } else {
                return data;
            }
        }
    }

    /// Append to the reassembly buffer until it holds `required` bytes,
    /// growing the buffer when needed. Returns how much of `data` was
    /// taken.
    fn fill_partial(&mut self, required: usize, data: &[u8]) -> usize {
        if self.partial.len() >= required || data.is_empty() {
            return 0;
        }
        let take = (required - self.partial.len()).min(data.len());
        if self.partial.len() + take > self.partial_capacity {
            while self.partial_capacity < self.partial.len() + take {
                self.partial_capacity *= 2;
            }
            debug!(
                capacity = self.partial_capacity,
                total_bytes = self.total_bytes_read,
                "resized reassembly buffer"
            );
        }
        self.partial.extend_from_slice(&data[..take]);
        self.total_bytes_read += take;
        take
    }

    /// Append as much of `data` as fits in the current buffer capacity.
    fn append_to_partial(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.partial_capacity - self.partial.len());
        self.partial.extend_from_slice(&data[..take]);
        self.total_bytes_read += take;
        take
    }

    fn read_magic(&mut self, data: &[u8]) -> usize {
        // the whole file header must arrive in one chunk; anything shorter
        // is a truncated file
        if data.len() < FILE_HEADER_LEN {
            self.handler
                .error("not enough data to read the file magic", false);
            self.state = State::InvalidData;
            return 0;
        }
        if data[..FILE_MAGIC.len()] != FILE_MAGIC {
            self.handler
                .error("invalid file format (incorrect magic bytes)", false);
            self.state = State::InvalidData;
            return 0;
        }
        self.file_version = data[7];
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[8..16]);
        self.file_timestamp = u64::from_le_bytes(raw);
        self.state = State::ReadFlagBits;
        FILE_HEADER_LEN
    }

    fn read_flag_bits(&mut self, data: &[u8]) -> usize {
        if data.len() < MSG_HEADER_LEN + FLAG_BITS_BODY_LEN {
            self.handler
                .error("not enough data to read the file flags", false);
            self.state = State::InvalidData;
            return 0;
        }
        let (msg_size, msg_type) = read_message_header(data);
        if msg_type != MessageType::FlagBits.byte() {
            // the flag-bits message is optional; fall through to regular
            // header parsing without consuming anything
            let header = FileHeader::from_wire(self.file_version, self.file_timestamp, None);
            if let Err(err) = self.handler.file_header(header) {
                self.handle_dispatch_error(err);
                return 0;
            }
            self.state = State::ReadHeader;
            return 0;
        }

        let flags = match FlagBits::from_wire(&data[MSG_HEADER_LEN..]) {
            Ok(flags) => flags,
            Err(_) => {
                self.handler.error("invalid flag bits message", false);
                self.state = State::InvalidData;
                return 0;
            }
        };
        if flags.appended_offsets[0] != 0 {
            self.handler.error(
                "log contains appended data offsets; appended regions are ignored",
                true,
            );
        }
        let unknown_incompat = flags.incompat_flags[0] & !INCOMPAT_FLAG0_DATA_APPENDED != 0
            || flags.incompat_flags[1..].iter().any(|&byte| byte != 0);
        if unknown_incompat {
            self.handler
                .error("unknown incompatible flag set: cannot parse the log", false);
            self.state = State::InvalidData;
            return 0;
        }

        let header = FileHeader::from_wire(self.file_version, self.file_timestamp, Some(flags));
        if let Err(err) = self.handler.file_header(header) {
            self.handle_dispatch_error(err);
            return 0;
        }
        self.state = State::ReadHeader;
        MSG_HEADER_LEN + msg_size as usize
    }

    fn process_message(&mut self, message: &[u8]) {
        let (msg_size, msg_type) = read_message_header(message);
        if msg_size == 0 || msg_type == 0 {
            debug!(
                total_bytes = self.total_bytes_read,
                "message with zero size or type"
            );
            self.corruption_detected();
            return;
        }

        let mut result = Ok(());
        if self.state == State::ReadHeader {
            result = self.read_header_message(message);
        }
        // not an else: the message completing the header is itself the
        // first data-phase message and is dispatched below
        if result.is_ok() && self.state == State::ReadData {
            result = self.read_data_message(message);
        }
        if let Err(err) = result {
            self.handle_dispatch_error(err);
        }
    }

    fn read_header_message(&mut self, message: &[u8]) -> Result<()> {
        let body = &message[MSG_HEADER_LEN..];
        match MessageType::from_byte(message[2]) {
            Some(MessageType::Info) => self.handler.message_info(MessageInfo::from_wire(body, false)?),
            Some(MessageType::InfoMultiple) => {
                self.handler.message_info(MessageInfo::from_wire(body, true)?)
            }
            Some(MessageType::Format) => {
                self.handler.message_format(MessageFormat::from_wire(body)?)
            }
            Some(MessageType::Parameter) => {
                self.handler.parameter(MessageInfo::from_wire(body, false)?)
            }
            Some(MessageType::ParameterDefault) => self
                .handler
                .parameter_default(ParameterDefault::from_wire(body)?),
            Some(
                MessageType::AddLoggedMessage | MessageType::Logging | MessageType::LoggingTagged,
            ) => {
                debug!(total_bytes = self.total_bytes_read, "log header complete");
                self.state = State::ReadData;
                self.handler.header_complete()
            }
            _ => Ok(()),
        }
    }

    fn read_data_message(&mut self, message: &[u8]) -> Result<()> {
        let body = &message[MSG_HEADER_LEN..];
        match MessageType::from_byte(message[2]) {
            Some(MessageType::Info) => self.handler.message_info(MessageInfo::from_wire(body, false)?),
            Some(MessageType::InfoMultiple) => {
                self.handler.message_info(MessageInfo::from_wire(body, true)?)
            }
            Some(MessageType::Parameter) => {
                self.handler.parameter(MessageInfo::from_wire(body, false)?)
            }
            Some(MessageType::ParameterDefault) => self
                .handler
                .parameter_default(ParameterDefault::from_wire(body)?),
            Some(MessageType::AddLoggedMessage) => self
                .handler
                .add_logged_message(AddLoggedMessage::from_wire(body)?),
            Some(MessageType::Logging) => self.handler.logging(Logging::from_wire(body, false)?),
            Some(MessageType::LoggingTagged) => {
                self.handler.logging(Logging::from_wire(body, true)?)
            }
            Some(MessageType::Data) => self.handler.data(Data::from_wire(body)?),
            Some(MessageType::Dropout) => self.handler.dropout(Dropout::from_wire(body)?),
            Some(MessageType::Sync) => self.handler.sync(SyncMessage::from_wire(body)?),
            _ => Ok(()),
        }
    }

    fn handle_dispatch_error(&mut self, err: UlogError) {
        if err.is_fatal() {
            let message = err.to_string();
            warn!(error = %message, "fatal stream error");
            self.handler.error(&message, false);
            self.state = State::InvalidData;
        } else {
            debug!(error = %err, total_bytes = self.total_bytes_read, "message dropped");
            self.corruption_detected();
        }
    }

    fn corruption_detected(&mut self) {
        if !self.corruption_reported {
            warn!(
                total_bytes = self.total_bytes_read,
                "message corruption detected"
            );
            self.handler.error("message corruption detected", true);
            self.corruption_reported = true;
        }
        self.need_recovery = true;
    }

    /// Scan for the next plausible message header, discarding bytes in
    /// front of it. Returns the unconsumed tail of `data`; clears the
    /// recovery flag on success.
    fn try_to_recover<'a>(&mut self, mut data: &'a [u8]) -> &'a [u8] {
        while !data.is_empty() {
            let appended = self.append_to_partial(data);
            data = &data[appended..];

            if self.partial.len() >= MSG_HEADER_LEN {
                let mut found = false;
                // when the buffer was already full nothing new arrived;
                // start at 1 or the same rejected candidate loops forever
                let mut index = if appended == 0 { 1 } else { 0 };
                while index + MSG_HEADER_LEN < self.partial.len() {
                    let (msg_size, msg_type) = read_message_header(&self.partial[index..]);
                    if msg_size != 0
                        && msg_type != 0
                        && msg_size < MAX_PLAUSIBLE_MSG_SIZE
                        && MessageType::from_byte(msg_type).is_some()
                    {
                        found = true;
                        break;
                    }
                    index += 1;
                }
                if index > 0 {
                    self.partial.drain(..index);
                }
                if found {
                    debug!(
                        total_bytes = self.total_bytes_read,
                        remaining = data.len(),
                        "resynchronized after corruption"
                    );
                    self.need_recovery = false;
                    return data;
                }
            }
        }
        data
    }
}
