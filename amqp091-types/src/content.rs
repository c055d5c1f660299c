//! Content header and the properties of the `basic` class

use bytes::{BufMut, BytesMut};

use crate::{
    constants::CLASS_BASIC,
    error::Error,
    primitives::{ShortString, Timestamp},
    read::Parser,
    ser::{write_short_string, Encode},
    value::FieldTable,
};

/// Payload of a content header frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentHeader {
    /// Class of the method that carries the content
    pub class_id: u16,
    /// Unused, always zero
    pub weight: u16,
    /// Total size of the body frames that follow
    pub body_size: u64,
    /// Message properties
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Creates a header for a `basic` class message
    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: CLASS_BASIC,
            weight: 0,
            body_size,
            properties,
        }
    }

    /// Decodes a header frame payload. Truncated input yields default fields.
    pub fn decode(parser: &mut Parser<'_>) -> Self {
        let class_id = parser.parse_short();
        let weight = parser.parse_short();
        let body_size = parser.parse_long_long();
        let properties = BasicProperties::decode(parser);
        Self {
            class_id,
            weight,
            body_size,
            properties,
        }
    }
}

impl Encode for ContentHeader {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.class_id);
        dst.put_u16(self.weight);
        dst.put_u64(self.body_size);
        self.properties.encode(dst)
    }
}

/// Properties of a `basic` class message. Absent properties are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicProperties {
    /// MIME content type
    pub content_type: Option<ShortString>,
    /// MIME content encoding
    pub content_encoding: Option<ShortString>,
    /// Message header field table
    pub headers: Option<FieldTable>,
    /// 1 for non-persistent, 2 for persistent
    pub delivery_mode: Option<u8>,
    /// Message priority, 0 to 9
    pub priority: Option<u8>,
    /// Application correlation identifier
    pub correlation_id: Option<ShortString>,
    /// Address to reply to
    pub reply_to: Option<ShortString>,
    /// Message expiration specification
    pub expiration: Option<ShortString>,
    /// Application message identifier
    pub message_id: Option<ShortString>,
    /// Message timestamp
    pub timestamp: Option<Timestamp>,
    /// Message type name
    pub kind: Option<ShortString>,
    /// Creating user id
    pub user_id: Option<ShortString>,
    /// Creating application id
    pub app_id: Option<ShortString>,
    /// Reserved
    pub cluster_id: Option<ShortString>,
}

const CONTENT_TYPE: u16 = 1 << 15;
const CONTENT_ENCODING: u16 = 1 << 14;
const HEADERS: u16 = 1 << 13;
const DELIVERY_MODE: u16 = 1 << 12;
const PRIORITY: u16 = 1 << 11;
const CORRELATION_ID: u16 = 1 << 10;
const REPLY_TO: u16 = 1 << 9;
const EXPIRATION: u16 = 1 << 8;
const MESSAGE_ID: u16 = 1 << 7;
const TIMESTAMP: u16 = 1 << 6;
const TYPE: u16 = 1 << 5;
const USER_ID: u16 = 1 << 4;
const APP_ID: u16 = 1 << 3;
const CLUSTER_ID: u16 = 1 << 2;
const CONTINUATION: u16 = 1;

impl BasicProperties {
    /// Flag word describing which properties are present
    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, bit: u16| {
            if present {
                flags |= bit
            }
        };
        set(self.content_type.is_some(), CONTENT_TYPE);
        set(self.content_encoding.is_some(), CONTENT_ENCODING);
        set(self.headers.is_some(), HEADERS);
        set(self.delivery_mode.is_some(), DELIVERY_MODE);
        set(self.priority.is_some(), PRIORITY);
        set(self.correlation_id.is_some(), CORRELATION_ID);
        set(self.reply_to.is_some(), REPLY_TO);
        set(self.expiration.is_some(), EXPIRATION);
        set(self.message_id.is_some(), MESSAGE_ID);
        set(self.timestamp.is_some(), TIMESTAMP);
        set(self.kind.is_some(), TYPE);
        set(self.user_id.is_some(), USER_ID);
        set(self.app_id.is_some(), APP_ID);
        set(self.cluster_id.is_some(), CLUSTER_ID);
        flags
    }

    /// Decodes the flag words and the properties they announce
    pub fn decode(parser: &mut Parser<'_>) -> Self {
        let flags = parser.parse_short();
        let mut more = flags & CONTINUATION != 0;
        // Properties beyond the first flag word are not defined for `basic`
        while more && !parser.is_exhausted() {
            more = parser.parse_short() & CONTINUATION != 0;
        }

        let short = |parser: &mut Parser<'_>, bit: u16| {
            (flags & bit != 0).then(|| ShortString::from(parser.parse_short_string()))
        };
        let octet = |parser: &mut Parser<'_>, bit: u16| (flags & bit != 0).then(|| parser.parse_octet());

        Self {
            content_type: short(parser, CONTENT_TYPE),
            content_encoding: short(parser, CONTENT_ENCODING),
            headers: (flags & HEADERS != 0).then(|| parser.parse_field_table()),
            delivery_mode: octet(parser, DELIVERY_MODE),
            priority: octet(parser, PRIORITY),
            correlation_id: short(parser, CORRELATION_ID),
            reply_to: short(parser, REPLY_TO),
            expiration: short(parser, EXPIRATION),
            message_id: short(parser, MESSAGE_ID),
            timestamp: (flags & TIMESTAMP != 0).then(|| parser.parse_timestamp()),
            kind: short(parser, TYPE),
            user_id: short(parser, USER_ID),
            app_id: short(parser, APP_ID),
            cluster_id: short(parser, CLUSTER_ID),
        }
    }
}

impl Encode for BasicProperties {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.flags());

        let short = |dst: &mut BytesMut, value: &Option<ShortString>| match value {
            Some(s) => write_short_string(dst, s),
            None => Ok(()),
        };

        short(dst, &self.content_type)?;
        short(dst, &self.content_encoding)?;
        if let Some(headers) = &self.headers {
            headers.encode(dst)?;
        }
        if let Some(mode) = self.delivery_mode {
            dst.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            dst.put_u8(priority);
        }
        short(dst, &self.correlation_id)?;
        short(dst, &self.reply_to)?;
        short(dst, &self.expiration)?;
        short(dst, &self.message_id)?;
        if let Some(timestamp) = self.timestamp {
            dst.put_u64(timestamp.seconds());
        }
        short(dst, &self.kind)?;
        short(dst, &self.user_id)?;
        short(dst, &self.app_id)?;
        short(dst, &self.cluster_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{BasicProperties, ContentHeader};
    use crate::{primitives::Timestamp, read::Parser, ser::Encode, value::FieldTable};

    #[test]
    fn empty_properties_are_a_zero_flag_word() {
        let header = ContentHeader::basic(5, BasicProperties::default());
        let mut dst = BytesMut::new();
        header.encode(&mut dst).unwrap();
        assert_eq!(&dst[..], &[0, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0]);
    }

    #[test]
    fn decode_selected_properties() {
        let properties = BasicProperties {
            content_type: Some("text/plain".into()),
            headers: Some(FieldTable::new().with("x-retry", 2i32)),
            delivery_mode: Some(2),
            timestamp: Some(Timestamp::from_seconds(42)),
            app_id: Some("worker".into()),
            ..Default::default()
        };
        let header = ContentHeader::basic(1024, properties);
        let mut dst = BytesMut::new();
        header.encode(&mut dst).unwrap();

        let mut parser = Parser::new(&dst);
        assert_eq!(ContentHeader::decode(&mut parser), header);
        assert!(parser.is_exhausted());
    }
}
