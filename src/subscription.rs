//! Subscriptions and typed access to their samples.
//!
//! A [`Subscription`] binds a wire message id and a `(name, multi_id)` pair
//! to one message format and accumulates the raw [`Data`] samples logged
//! under that id. Samples are stored untyped; [`TypedDataView`] joins one
//! sample with the subscription's format for field access.

use std::sync::Arc;

use crate::error::{Result, UlogError};
use crate::field::Field;
use crate::messages::{AddLoggedMessage, Data, MessageFormat};
use crate::value::Value;

/// A short-lived view binding one data sample to its message format.
///
/// Views borrow the sample bytes and the format metadata; create them,
/// read the fields and drop them. Appending samples while views are alive
/// is prevented by the borrow.
#[derive(Debug, Clone, Copy)]
pub struct TypedDataView<'a> {
    data: &'a Data,
    format: &'a MessageFormat,
}

impl<'a> TypedDataView<'a> {
    /// View `data` through `format`.
    pub fn new(data: &'a Data, format: &'a MessageFormat) -> TypedDataView<'a> {
        TypedDataView { data, format }
    }

    /// Name of the message format backing this sample.
    pub fn name(&self) -> &'a str {
        self.format.name()
    }

    /// The message format backing this sample.
    pub fn format(&self) -> &'a MessageFormat {
        self.format
    }

    /// The raw sample bytes.
    pub fn raw_data(&self) -> &'a [u8] {
        self.data.data()
    }

    /// True when the format has a resolved field of this name.
    pub fn has_field(&self, name: &str) -> bool {
        self.format
            .field(name)
            .map(|field| field.is_resolved())
            .unwrap_or(false)
    }

    /// Access a field of this sample through a field reference.
    pub fn at_field(&self, field: &'a Field) -> Result<Value<'a>> {
        if !field.is_resolved() {
            return Err(UlogError::parse(format!(
                "field '{}' is not resolved",
                field.name()
            )));
        }
        Ok(Value::new(field, self.data.data()))
    }

    /// Access a field of this sample by name.
    pub fn get(&self, name: &str) -> Result<Value<'a>> {
        self.at_field(self.format.field(name)?)
    }
}

/// One logged time series: the subscription message that created it, the
/// resolved message format, and the append-only sample vector.
#[derive(Debug, Clone)]
pub struct Subscription {
    add_logged_message: AddLoggedMessage,
    format: Arc<MessageFormat>,
    samples: Vec<Data>,
}

impl Subscription {
    /// Create an empty subscription for `format`.
    pub fn new(add_logged_message: AddLoggedMessage, format: Arc<MessageFormat>) -> Subscription {
        Subscription {
            add_logged_message,
            format,
            samples: Vec::new(),
        }
    }

    pub(crate) fn push_sample(&mut self, sample: Data) {
        self.samples.push(sample);
    }

    /// The subscription message this series was created from.
    pub fn add_logged_message(&self) -> &AddLoggedMessage {
        &self.add_logged_message
    }

    /// The wire message id of this series.
    pub fn msg_id(&self) -> u16 {
        self.add_logged_message.msg_id()
    }

    /// Instance index among same-named series.
    pub fn multi_id(&self) -> u8 {
        self.add_logged_message.multi_id()
    }

    /// Name of the subscribed message format.
    pub fn message_name(&self) -> &str {
        self.add_logged_message.message_name()
    }

    /// The resolved message format of this series.
    pub fn format(&self) -> &Arc<MessageFormat> {
        &self.format
    }

    /// The raw samples, in logging order.
    pub fn raw_samples(&self) -> &[Data] {
        &self.samples
    }

    /// Look up a field of the message format by name.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.format.field(name)
    }

    /// Field names of the message format, in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.format.field_names()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples were logged.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Typed view of the `index`-th sample.
    pub fn sample(&self, index: usize) -> Result<TypedDataView<'_>> {
        let data = self.samples.get(index).ok_or_else(|| {
            UlogError::access(format!(
                "sample index {index} out of range ({} samples)",
                self.samples.len()
            ))
        })?;
        Ok(TypedDataView::new(data, &self.format))
    }

    /// Iterate over typed views of all samples.
    pub fn iter(&self) -> impl Iterator<Item = TypedDataView<'_>> + '_ {
        let format = self.format.as_ref();
        self.samples
            .iter()
            .map(move |data| TypedDataView::new(data, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved_format() -> Arc<MessageFormat> {
        let mut fields = vec![
            Field::new("uint64_t", "timestamp"),
            Field::new("uint16_t", "x"),
        ];
        fields[0].set_offset(0);
        fields[1].set_offset(8);
        Arc::new(MessageFormat::new("test_msg", fields))
    }

    fn sample_bytes(timestamp: u64, x: u16) -> Vec<u8> {
        let mut bytes = timestamp.to_le_bytes().to_vec();
        bytes.extend_from_slice(&x.to_le_bytes());
        bytes
    }

    #[test]
    fn typed_access_over_samples() {
        let mut subscription = Subscription::new(
            AddLoggedMessage::new(0, 1, "test_msg"),
            resolved_format(),
        );
        subscription.push_sample(Data::new(1, sample_bytes(100, 7)));
        subscription.push_sample(Data::new(1, sample_bytes(200, 8)));

        assert_eq!(subscription.len(), 2);
        assert_eq!(subscription.field_names(), vec!["timestamp", "x"]);

        let view = subscription.sample(1).unwrap();
        assert_eq!(view.get("timestamp").unwrap().cast::<u64>().unwrap(), 200);
        assert_eq!(view.get("x").unwrap().cast::<u16>().unwrap(), 8);
        assert!(view.has_field("x"));
        assert!(!view.has_field("missing"));
        assert!(view.get("missing").is_err());

        let timestamps: Vec<u64> = subscription
            .iter()
            .map(|sample| sample.get("timestamp").unwrap().cast().unwrap())
            .collect();
        assert_eq!(timestamps, vec![100, 200]);

        assert!(subscription.sample(2).is_err());
    }

    #[test]
    fn unresolved_field_is_rejected() {
        let format = Arc::new(MessageFormat::new(
            "raw",
            vec![Field::new("uint8_t", "b")],
        ));
        let mut subscription =
            Subscription::new(AddLoggedMessage::new(0, 2, "raw"), format);
        subscription.push_sample(Data::new(2, vec![1]));
        let view = subscription.sample(0).unwrap();
        assert!(view.get("b").is_err());
        assert!(!view.has_field("b"));
    }
}
