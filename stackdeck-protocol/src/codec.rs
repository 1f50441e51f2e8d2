//! Message codec for pty host framing
//!
//! Each frame is a big-endian `u32` length followed by a bincode payload.

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{ClientMessage, ServerMessage};

/// Largest accepted payload
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = std::mem::size_of::<u32>();

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Length-prefixed bincode framing, encoding `E` and decoding `D`
pub struct MessageCodec<E, D> {
    _marker: PhantomData<fn(E) -> D>,
}

/// Multiplexer side: sends requests, receives replies and pushes
pub type ClientCodec = MessageCodec<ClientMessage, ServerMessage>;

/// Pty host side
pub type ServerCodec = MessageCodec<ServerMessage, ClientMessage>;

impl<E, D> MessageCodec<E, D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E, D> Default for MessageCodec<E, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, D> std::fmt::Debug for MessageCodec<E, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCodec")
            .field("encodes", &std::any::type_name::<E>())
            .field("decodes", &std::any::type_name::<D>())
            .finish()
    }
}

impl<E, D: DeserializeOwned> Decoder for MessageCodec<E, D> {
    type Item = D;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, CodecError> {
        let Some(header) = src.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let frame_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        check_size(frame_len)?;

        let total = HEADER_LEN + frame_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        Ok(Some(bincode::deserialize(&frame[HEADER_LEN..])?))
    }
}

impl<E: Serialize, D> Encoder<E> for MessageCodec<E, D> {
    type Error = CodecError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = bincode::serialize(&item)?;
        check_size(payload.len())?;

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

fn check_size(size: usize) -> Result<(), CodecError> {
    if size > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}
