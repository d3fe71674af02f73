//! Message set encoding. The actual codec implementations (gzip, snappy) are an
//! out-of-scope collaborator (spec §1c); this module only validates the configured
//! codec id and exposes the `create_message_set` seam the dispatch controller calls
//! immediately before building a [`crate::client::ProduceRequest`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProducerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Gzip,
    Snappy,
}

impl TryFrom<i32> for Codec {
    type Error = ProducerError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Codec::None),
            1 => Ok(Codec::Gzip),
            2 => Ok(Codec::Snappy),
            other => Err(ProducerError::UnsupportedCodecError(other.to_string())),
        }
    }
}

/// Build the encoded message set for one partition's dispatch unit.
///
/// Real compression is delegated to the out-of-scope codec utility; this
/// implementation frames each payload with a length prefix so the byte layout is
/// deterministic and the trigger-engine byte accounting in [`crate::batch`] stays
/// meaningful even without a real encoder wired in.
pub fn create_message_set(messages: &[Bytes], codec: Codec) -> Bytes {
    let mut buf = BytesMut::with_capacity(messages.iter().map(|m| m.len() + 5).sum());
    buf.put_u8(codec as u8);
    for message in messages {
        buf.put_u32(message.len() as u32);
        buf.put_slice(message);
    }
    buf.freeze()
}
