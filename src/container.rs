//! In-memory log container.
//!
//! [`LogData`] is a [`MessageHandler`] that indexes everything a reader
//! emits: the format registry, subscriptions (keyed both by wire message id
//! and by name + multi id), parameters, info messages, logged text and
//! dropouts. When the log header completes it runs the resolution pass over
//! the format registry, after which every stored value is typed and
//! readable.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Result, UlogError};
use crate::field::BasicType;
use crate::handler::MessageHandler;
use crate::messages::{
    AddLoggedMessage, Data, Dropout, FileHeader, Logging, MessageFormat, MessageInfo, Parameter,
    ParameterDefault,
};
use crate::subscription::Subscription;

/// How much of the log to keep in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Keep the header: formats, info, parameters and subscriptions.
    /// Data-phase traffic (samples, logged text, dropouts, updates) is
    /// discarded.
    HeaderOnly,
    /// Keep everything.
    FullLog,
}

/// Container indexing a full parsed log (or its header).
#[derive(Debug)]
pub struct LogData {
    storage_mode: StorageMode,
    header_complete: bool,
    had_fatal_error: bool,
    parsing_errors: Vec<String>,
    file_header: Option<FileHeader>,
    message_info: BTreeMap<String, MessageInfo>,
    message_info_multi: BTreeMap<String, Vec<Vec<MessageInfo>>>,
    message_formats: BTreeMap<String, Arc<MessageFormat>>,
    initial_parameters: BTreeMap<String, Parameter>,
    default_parameters: BTreeMap<String, ParameterDefault>,
    changed_parameters: Vec<Parameter>,
    subscriptions: Vec<Subscription>,
    by_msg_id: BTreeMap<u16, usize>,
    by_name_and_multi_id: BTreeMap<(String, u8), usize>,
    logging: Vec<Logging>,
    dropouts: Vec<Dropout>,
}

impl LogData {
    /// An empty container with the given storage mode.
    pub fn new(storage_mode: StorageMode) -> LogData {
        LogData {
            storage_mode,
            header_complete: false,
            had_fatal_error: false,
            parsing_errors: Vec::new(),
            file_header: None,
            message_info: BTreeMap::new(),
            message_info_multi: BTreeMap::new(),
            message_formats: BTreeMap::new(),
            initial_parameters: BTreeMap::new(),
            default_parameters: BTreeMap::new(),
            changed_parameters: Vec::new(),
            subscriptions: Vec::new(),
            by_msg_id: BTreeMap::new(),
            by_name_and_multi_id: BTreeMap::new(),
            logging: Vec::new(),
            dropouts: Vec::new(),
        }
    }

    /// True once the first data-phase message was seen and the format
    /// registry was resolved.
    pub fn is_header_complete(&self) -> bool {
        self.header_complete
    }

    /// True when a fatal stream error was reported.
    pub fn had_fatal_error(&self) -> bool {
        self.had_fatal_error
    }

    /// All error strings reported by the reader, in order.
    pub fn parsing_errors(&self) -> &[String] {
        &self.parsing_errors
    }

    /// The file header, once parsed.
    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    /// Single-part info messages by key name.
    pub fn message_info(&self) -> &BTreeMap<String, MessageInfo> {
        &self.message_info
    }

    /// Multi-part info messages: per key name, the list of logical values,
    /// each a list of stitched parts in emission order.
    pub fn message_info_multi(&self) -> &BTreeMap<String, Vec<Vec<MessageInfo>>> {
        &self.message_info_multi
    }

    /// The message format registry.
    pub fn message_formats(&self) -> &BTreeMap<String, Arc<MessageFormat>> {
        &self.message_formats
    }

    /// Parameter values seen before the header completed.
    pub fn initial_parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.initial_parameters
    }

    /// Default parameter values by name.
    pub fn default_parameters(&self) -> &BTreeMap<String, ParameterDefault> {
        &self.default_parameters
    }

    /// Parameter changes seen after the header completed, in order.
    pub fn changed_parameters(&self) -> &[Parameter] {
        &self.changed_parameters
    }

    /// Logged text messages, in order.
    pub fn logging(&self) -> &[Logging] {
        &self.logging
    }

    /// Dropout markers, in order.
    pub fn dropouts(&self) -> &[Dropout] {
        &self.dropouts
    }

    /// All subscriptions, in creation order.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> + '_ {
        self.subscriptions.iter()
    }

    /// The distinct names of all subscribed message formats.
    pub fn subscription_names(&self) -> BTreeSet<String> {
        self.by_name_and_multi_id
            .keys()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Look up a subscription by format name and instance index.
    pub fn subscription(&self, name: &str, multi_id: u8) -> Result<&Subscription> {
        self.by_name_and_multi_id
            .get(&(name.to_string(), multi_id))
            .map(|&index| &self.subscriptions[index])
            .ok_or_else(|| UlogError::access(format!("subscription not found: {name}")))
    }

    /// Look up a subscription by its wire message id.
    pub fn subscription_by_msg_id(&self, msg_id: u16) -> Option<&Subscription> {
        self.by_msg_id
            .get(&msg_id)
            .map(|&index| &self.subscriptions[index])
    }

    /// Resolve the format registry, then every stored info and parameter
    /// field. Idempotent: already resolved definitions keep their offsets.
    fn resolve_definitions(&mut self) -> Result<()> {
        let unresolved = std::mem::take(&mut self.message_formats);
        let mut resolved = BTreeMap::new();
        let mut visiting = BTreeSet::new();
        let names: Vec<String> = unresolved.keys().cloned().collect();
        for name in &names {
            if let Err(err) = resolve_format(name, &unresolved, &mut resolved, &mut visiting) {
                self.message_formats = unresolved;
                return Err(err);
            }
        }
        self.message_formats = resolved;

        for info in self.message_info.values_mut() {
            info.field_mut().resolve(&self.message_formats, 0)?;
        }
        for chunks in self.message_info_multi.values_mut() {
            for parts in chunks.iter_mut() {
                for part in parts.iter_mut() {
                    part.field_mut().resolve(&self.message_formats, 0)?;
                }
            }
        }
        for parameter in self.initial_parameters.values_mut() {
            parameter.field_mut().resolve(&self.message_formats, 0)?;
        }
        for parameter in self.default_parameters.values_mut() {
            parameter.field_mut().resolve(&self.message_formats, 0)?;
        }
        for parameter in self.changed_parameters.iter_mut() {
            parameter.field_mut().resolve(&self.message_formats, 0)?;
        }
        Ok(())
    }
}

/// Resolve one format, recursing into nested references. Already resolved
/// formats are reused as-is; a reference cycle is an error (valid logs
/// cannot contain one).
fn resolve_format(
    name: &str,
    unresolved: &BTreeMap<String, Arc<MessageFormat>>,
    resolved: &mut BTreeMap<String, Arc<MessageFormat>>,
    visiting: &mut BTreeSet<String>,
) -> Result<Arc<MessageFormat>> {
    if let Some(format) = resolved.get(name) {
        return Ok(format.clone());
    }
    let source = unresolved
        .get(name)
        .ok_or_else(|| UlogError::parse(format!("message format not found: {name}")))?;
    if source.is_resolved() {
        resolved.insert(name.to_string(), source.clone());
        return Ok(source.clone());
    }
    if !visiting.insert(name.to_string()) {
        return Err(UlogError::parse(format!(
            "cyclic message format definition: {name}"
        )));
    }

    let mut fields = source.fields().to_vec();
    let mut offset = 0;
    for field in &mut fields {
        if !field.is_resolved() {
            if field.basic_type() == BasicType::Nested {
                let nested = resolve_format(field.type_name(), unresolved, resolved, visiting)?;
                field.attach_nested(nested)?;
            }
            field.set_offset(offset);
        }
        offset += field.size_bytes()?;
    }

    visiting.remove(name);
    let format = Arc::new(MessageFormat::from_resolved_fields(name.to_string(), fields));
    resolved.insert(name.to_string(), format.clone());
    Ok(format)
}

impl MessageHandler for LogData {
    fn header_complete(&mut self) -> Result<()> {
        self.header_complete = true;
        self.resolve_definitions()
            .map_err(|err| UlogError::fatal(err.message().to_string()))
    }

    fn error(&mut self, message: &str, is_recoverable: bool) {
        if !is_recoverable {
            self.had_fatal_error = true;
        }
        self.parsing_errors.push(message.to_string());
    }

    fn file_header(&mut self, header: FileHeader) -> Result<()> {
        self.file_header = Some(header);
        Ok(())
    }

    fn message_info(&mut self, info: MessageInfo) -> Result<()> {
        if self.header_complete && self.storage_mode == StorageMode::HeaderOnly {
            return Ok(());
        }
        let mut info = info;
        if self.header_complete {
            info.field_mut().resolve(&self.message_formats, 0)?;
        }
        if info.is_multi() {
            let chunks = self
                .message_info_multi
                .entry(info.field().name().to_string())
                .or_default();
            if info.is_continued() {
                let parts = chunks.last_mut().ok_or_else(|| {
                    UlogError::parse("continued multi info without a preceding first part")
                })?;
                parts.push(info);
            } else {
                chunks.push(vec![info]);
            }
        } else {
            self.message_info
                .entry(info.field().name().to_string())
                .or_insert(info);
        }
        Ok(())
    }

    fn message_format(&mut self, format: MessageFormat) -> Result<()> {
        if self.message_formats.contains_key(format.name()) {
            return Err(UlogError::parse(format!(
                "duplicate message format: {}",
                format.name()
            )));
        }
        self.message_formats
            .insert(format.name().to_string(), Arc::new(format));
        Ok(())
    }

    fn parameter(&mut self, parameter: Parameter) -> Result<()> {
        if self.header_complete && self.storage_mode == StorageMode::HeaderOnly {
            return Ok(());
        }
        if self.header_complete {
            let mut parameter = parameter;
            parameter.field_mut().resolve(&self.message_formats, 0)?;
            self.changed_parameters.push(parameter);
        } else {
            self.initial_parameters
                .entry(parameter.field().name().to_string())
                .or_insert(parameter);
        }
        Ok(())
    }

    fn parameter_default(&mut self, parameter_default: ParameterDefault) -> Result<()> {
        let mut parameter_default = parameter_default;
        if self.header_complete {
            parameter_default
                .field_mut()
                .resolve(&self.message_formats, 0)?;
        }
        self.default_parameters
            .entry(parameter_default.field().name().to_string())
            .or_insert(parameter_default);
        Ok(())
    }

    fn add_logged_message(&mut self, add_logged: AddLoggedMessage) -> Result<()> {
        if self.by_msg_id.contains_key(&add_logged.msg_id()) {
            return Err(UlogError::parse(format!(
                "duplicate subscription message id: {}",
                add_logged.msg_id()
            )));
        }
        let format = self
            .message_formats
            .get(add_logged.message_name())
            .ok_or_else(|| {
                UlogError::parse(format!(
                    "subscription references unknown message format: {}",
                    add_logged.message_name()
                ))
            })?
            .clone();

        let index = self.subscriptions.len();
        self.by_msg_id.insert(add_logged.msg_id(), index);
        self.by_name_and_multi_id
            .entry((add_logged.message_name().to_string(), add_logged.multi_id()))
            .or_insert(index);
        self.subscriptions.push(Subscription::new(add_logged, format));
        Ok(())
    }

    fn logging(&mut self, logging: Logging) -> Result<()> {
        if self.header_complete && self.storage_mode == StorageMode::HeaderOnly {
            return Ok(());
        }
        self.logging.push(logging);
        Ok(())
    }

    fn data(&mut self, data: Data) -> Result<()> {
        if self.storage_mode == StorageMode::HeaderOnly {
            return Ok(());
        }
        let index = self
            .by_msg_id
            .get(&data.msg_id())
            .copied()
            .ok_or_else(|| {
                UlogError::parse(format!("data for unknown message id: {}", data.msg_id()))
            })?;
        self.subscriptions[index].push_sample(data);
        Ok(())
    }

    fn dropout(&mut self, dropout: Dropout) -> Result<()> {
        if self.header_complete && self.storage_mode == StorageMode::HeaderOnly {
            return Ok(());
        }
        self.dropouts.push(dropout);
        Ok(())
    }
}
