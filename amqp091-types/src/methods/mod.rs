//! Protocol methods
//!
//! Every method is a plain struct. [`Method`] is the closed union of all of them and
//! [`MethodKind`] is its fieldless descriptor, used to name the reply a caller waits for.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::{
    constants::{CLASS_BASIC, CLASS_CHANNEL, CLASS_CONNECTION, CLASS_EXCHANGE, CLASS_QUEUE},
    error::Error,
    primitives::ShortString,
    read::Parser,
    value::FieldTable,
};

pub mod args;

use args::{Argument, ArgumentReader, ArgumentWriter};

macro_rules! methods {
    (
        $(
            $(#[$meta:meta])*
            $name:ident($class:ident, $id:literal) {
                $(
                    $(#[$fmeta:meta])*
                    $field:ident: $ty:ty
                ),* $(,)?
            }
        ),* $(,)?
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq, Eq)]
            pub struct $name {
                $(
                    $(#[$fmeta])*
                    pub $field: $ty,
                )*
            }

            impl $name {
                /// Class id on the wire
                pub const CLASS_ID: u16 = $class;

                /// Method id on the wire
                pub const METHOD_ID: u16 = $id;

                #[allow(unused_variables)]
                fn read_arguments(reader: &mut ArgumentReader<'_, '_>) -> Self {
                    Self {
                        $($field: <$ty as Argument>::read(reader),)*
                    }
                }

                #[allow(unused_variables)]
                fn write_arguments(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error> {
                    $(self.$field.write(writer)?;)*
                    Ok(())
                }
            }

            impl From<$name> for Method {
                fn from(method: $name) -> Self {
                    Method::$name(method)
                }
            }
        )*

        /// Closed union of every supported method
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Method {
            $(
                #[allow(missing_docs)]
                $name($name),
            )*
        }

        /// Describes a method without its arguments
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MethodKind {
            $(
                #[allow(missing_docs)]
                $name,
            )*
        }

        impl MethodKind {
            /// Human readable name, eg. `ConnectionCloseOk`
            pub fn name(&self) -> &'static str {
                match self {
                    $(MethodKind::$name => stringify!($name),)*
                }
            }

            /// Class id on the wire
            pub fn class_id(&self) -> u16 {
                match self {
                    $(MethodKind::$name => $class,)*
                }
            }

            /// Method id on the wire
            pub fn method_id(&self) -> u16 {
                match self {
                    $(MethodKind::$name => $id,)*
                }
            }
        }

        impl Method {
            /// The descriptor of this method
            pub fn kind(&self) -> MethodKind {
                match self {
                    $(Method::$name(_) => MethodKind::$name,)*
                }
            }

            /// Decodes a method frame payload.
            ///
            /// Truncated arguments decode to their defaults, only unknown ids fail.
            pub fn decode(parser: &mut Parser<'_>) -> Result<Self, Error> {
                let class_id = parser.parse_short();
                let method_id = parser.parse_short();
                let mut reader = ArgumentReader::new(parser);
                match (class_id, method_id) {
                    $(($class, $id) => Ok(Method::$name($name::read_arguments(&mut reader))),)*
                    _ => Err(Error::UnknownMethod { class_id, method_id }),
                }
            }

            /// Encodes the method frame payload
            pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                let kind = self.kind();
                dst.put_u16(kind.class_id());
                dst.put_u16(kind.method_id());
                let mut writer = ArgumentWriter::new(dst);
                match self {
                    $(Method::$name(m) => m.write_arguments(&mut writer)?,)*
                }
                writer.finish();
                Ok(())
            }
        }
    };
}

methods! {
    /// Start connection negotiation
    ConnectionStart(CLASS_CONNECTION, 10) {
        /// Protocol major version
        version_major: u8,
        /// Protocol minor version
        version_minor: u8,
        /// Server properties
        server_properties: FieldTable,
        /// Space separated list of security mechanisms
        mechanisms: String,
        /// Space separated list of message locales
        locales: String,
    },
    /// Select security mechanism and locale
    ConnectionStartOk(CLASS_CONNECTION, 11) {
        /// Client properties
        client_properties: FieldTable,
        /// Selected security mechanism
        mechanism: ShortString,
        /// Security response data
        response: String,
        /// Selected message locale
        locale: ShortString,
    },
    /// Security mechanism challenge
    ConnectionSecure(CLASS_CONNECTION, 20) {
        /// Security challenge data
        challenge: String,
    },
    /// Security mechanism response
    ConnectionSecureOk(CLASS_CONNECTION, 21) {
        /// Security response data
        response: String,
    },
    /// Propose connection tuning parameters
    ConnectionTune(CLASS_CONNECTION, 30) {
        /// Proposed maximum channels
        channel_max: u16,
        /// Proposed maximum frame size
        frame_max: u32,
        /// Desired heartbeat delay in seconds
        heartbeat: u16,
    },
    /// Negotiate connection tuning parameters
    ConnectionTuneOk(CLASS_CONNECTION, 31) {
        /// Negotiated maximum channels
        channel_max: u16,
        /// Negotiated maximum frame size
        frame_max: u32,
        /// Desired heartbeat delay in seconds
        heartbeat: u16,
    },
    /// Open connection to virtual host
    ConnectionOpen(CLASS_CONNECTION, 40) {
        /// Virtual host name
        virtual_host: ShortString,
        /// Reserved
        capabilities: ShortString,
        /// Reserved
        insist: bool,
    },
    /// Signal that connection is ready
    ConnectionOpenOk(CLASS_CONNECTION, 41) {
        /// Reserved
        known_hosts: ShortString,
    },
    /// Request a connection close
    ConnectionClose(CLASS_CONNECTION, 50) {
        /// Reply code
        reply_code: u16,
        /// Localised reply text
        reply_text: ShortString,
        /// Class of the failing method, if any
        class_id: u16,
        /// Failing method, if any
        method_id: u16,
    },
    /// Confirm a connection close
    ConnectionCloseOk(CLASS_CONNECTION, 51) {},
    /// The broker stopped reading from this connection
    ConnectionBlocked(CLASS_CONNECTION, 60) {
        /// Reason for the block
        reason: ShortString,
    },
    /// The broker resumed reading from this connection
    ConnectionUnblocked(CLASS_CONNECTION, 61) {},

    /// Open a channel for use
    ChannelOpen(CLASS_CHANNEL, 10) {
        /// Reserved
        out_of_band: ShortString,
    },
    /// Signal that the channel is ready
    ChannelOpenOk(CLASS_CHANNEL, 11) {
        /// Reserved
        channel_id: String,
    },
    /// Enable or disable flow from peer
    ChannelFlow(CLASS_CHANNEL, 20) {
        /// Start or stop content frames
        active: bool,
    },
    /// Confirm a flow method
    ChannelFlowOk(CLASS_CHANNEL, 21) {
        /// Current flow setting
        active: bool,
    },
    /// Request a channel close
    ChannelClose(CLASS_CHANNEL, 40) {
        /// Reply code
        reply_code: u16,
        /// Localised reply text
        reply_text: ShortString,
        /// Class of the failing method, if any
        class_id: u16,
        /// Failing method, if any
        method_id: u16,
    },
    /// Confirm a channel close
    ChannelCloseOk(CLASS_CHANNEL, 41) {},

    /// Verify exchange exists, create if needed
    ExchangeDeclare(CLASS_EXCHANGE, 10) {
        /// Reserved
        ticket: u16,
        /// Exchange name
        exchange: ShortString,
        /// Exchange type, eg. `direct`, `fanout`, `topic`, `headers`
        kind: ShortString,
        /// Do not create the exchange
        passive: bool,
        /// Request a durable exchange
        durable: bool,
        /// Delete when unused
        auto_delete: bool,
        /// Create internal exchange
        internal: bool,
        /// Do not send a reply method
        no_wait: bool,
        /// Arguments for declaration
        arguments: FieldTable,
    },
    /// Confirm exchange declaration
    ExchangeDeclareOk(CLASS_EXCHANGE, 11) {},
    /// Delete an exchange
    ExchangeDelete(CLASS_EXCHANGE, 20) {
        /// Reserved
        ticket: u16,
        /// Exchange name
        exchange: ShortString,
        /// Delete only if unused
        if_unused: bool,
        /// Do not send a reply method
        no_wait: bool,
    },
    /// Confirm deletion of an exchange
    ExchangeDeleteOk(CLASS_EXCHANGE, 21) {},
    /// Bind exchange to an exchange
    ExchangeBind(CLASS_EXCHANGE, 30) {
        /// Reserved
        ticket: u16,
        /// Name of the destination exchange
        destination: ShortString,
        /// Name of the source exchange
        source: ShortString,
        /// Message routing key
        routing_key: ShortString,
        /// Do not send a reply method
        no_wait: bool,
        /// Arguments for binding
        arguments: FieldTable,
    },
    /// Confirm bind successful
    ExchangeBindOk(CLASS_EXCHANGE, 31) {},
    /// Unbind an exchange from an exchange
    ExchangeUnbind(CLASS_EXCHANGE, 40) {
        /// Reserved
        ticket: u16,
        /// Name of the destination exchange
        destination: ShortString,
        /// Name of the source exchange
        source: ShortString,
        /// Message routing key
        routing_key: ShortString,
        /// Do not send a reply method
        no_wait: bool,
        /// Arguments of the binding
        arguments: FieldTable,
    },
    /// Confirm unbind successful
    ExchangeUnbindOk(CLASS_EXCHANGE, 51) {},

    /// Declare queue, create if needed
    QueueDeclare(CLASS_QUEUE, 10) {
        /// Reserved
        ticket: u16,
        /// Queue name, empty to let the broker pick one
        queue: ShortString,
        /// Do not create the queue
        passive: bool,
        /// Request a durable queue
        durable: bool,
        /// Request an exclusive queue
        exclusive: bool,
        /// Auto-delete queue when unused
        auto_delete: bool,
        /// Do not send a reply method
        no_wait: bool,
        /// Arguments for declaration
        arguments: FieldTable,
    },
    /// Confirms a queue definition
    QueueDeclareOk(CLASS_QUEUE, 11) {
        /// Queue name
        queue: ShortString,
        /// Number of messages in the queue
        message_count: u32,
        /// Number of consumers
        consumer_count: u32,
    },
    /// Bind queue to an exchange
    QueueBind(CLASS_QUEUE, 20) {
        /// Reserved
        ticket: u16,
        /// Queue name
        queue: ShortString,
        /// Name of the exchange to bind to
        exchange: ShortString,
        /// Message routing key
        routing_key: ShortString,
        /// Do not send a reply method
        no_wait: bool,
        /// Arguments for binding
        arguments: FieldTable,
    },
    /// Confirm bind successful
    QueueBindOk(CLASS_QUEUE, 21) {},
    /// Purge a queue
    QueuePurge(CLASS_QUEUE, 30) {
        /// Reserved
        ticket: u16,
        /// Queue name
        queue: ShortString,
        /// Do not send a reply method
        no_wait: bool,
    },
    /// Confirms a queue purge
    QueuePurgeOk(CLASS_QUEUE, 31) {
        /// Number of messages purged
        message_count: u32,
    },
    /// Delete a queue
    QueueDelete(CLASS_QUEUE, 40) {
        /// Reserved
        ticket: u16,
        /// Queue name
        queue: ShortString,
        /// Delete only if unused
        if_unused: bool,
        /// Delete only if empty
        if_empty: bool,
        /// Do not send a reply method
        no_wait: bool,
    },
    /// Confirm deletion of a queue
    QueueDeleteOk(CLASS_QUEUE, 41) {
        /// Number of messages deleted
        message_count: u32,
    },
    /// Unbind a queue from an exchange
    QueueUnbind(CLASS_QUEUE, 50) {
        /// Reserved
        ticket: u16,
        /// Queue name
        queue: ShortString,
        /// Exchange name
        exchange: ShortString,
        /// Routing key of binding
        routing_key: ShortString,
        /// Arguments of binding
        arguments: FieldTable,
    },
    /// Confirm unbind successful
    QueueUnbindOk(CLASS_QUEUE, 51) {},

    /// Specify quality of service
    BasicQos(CLASS_BASIC, 10) {
        /// Prefetch window in octets
        prefetch_size: u32,
        /// Prefetch window in messages
        prefetch_count: u16,
        /// Apply to the entire connection
        global: bool,
    },
    /// Confirm the requested qos
    BasicQosOk(CLASS_BASIC, 11) {},
    /// Publish a message
    BasicPublish(CLASS_BASIC, 40) {
        /// Reserved
        ticket: u16,
        /// Exchange name
        exchange: ShortString,
        /// Message routing key
        routing_key: ShortString,
        /// Indicate mandatory routing
        mandatory: bool,
        /// Request immediate delivery
        immediate: bool,
    },
    /// Return a failed message
    BasicReturn(CLASS_BASIC, 50) {
        /// Reply code
        reply_code: u16,
        /// Localised reply text
        reply_text: ShortString,
        /// Exchange name
        exchange: ShortString,
        /// Message routing key
        routing_key: ShortString,
    },
}

impl Method {
    /// The synchronous reply the peer sends for this method, if any.
    ///
    /// Methods sent with `no_wait` set have no reply.
    pub fn expected_reply(&self) -> Option<MethodKind> {
        let kind = match self {
            Method::ConnectionOpen(_) => MethodKind::ConnectionOpenOk,
            Method::ConnectionClose(_) => MethodKind::ConnectionCloseOk,
            Method::ChannelOpen(_) => MethodKind::ChannelOpenOk,
            Method::ChannelFlow(_) => MethodKind::ChannelFlowOk,
            Method::ChannelClose(_) => MethodKind::ChannelCloseOk,
            Method::ExchangeDeclare(m) if !m.no_wait => MethodKind::ExchangeDeclareOk,
            Method::ExchangeDelete(m) if !m.no_wait => MethodKind::ExchangeDeleteOk,
            Method::ExchangeBind(m) if !m.no_wait => MethodKind::ExchangeBindOk,
            Method::ExchangeUnbind(m) if !m.no_wait => MethodKind::ExchangeUnbindOk,
            Method::QueueDeclare(m) if !m.no_wait => MethodKind::QueueDeclareOk,
            Method::QueueBind(m) if !m.no_wait => MethodKind::QueueBindOk,
            Method::QueuePurge(m) if !m.no_wait => MethodKind::QueuePurgeOk,
            Method::QueueDelete(m) if !m.no_wait => MethodKind::QueueDeleteOk,
            Method::QueueUnbind(_) => MethodKind::QueueUnbindOk,
            Method::BasicQos(_) => MethodKind::BasicQosOk,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether the method may carry content frames after it
    pub fn has_content(&self) -> bool {
        matches!(self, Method::BasicPublish(_) | Method::BasicReturn(_))
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
