//! Legacy gossip encodings.
//!
//! Peers below [`HASH_ANNOUNCEMENT_VERSION`](crate::HASH_ANNOUNCEMENT_VERSION)
//! receive blocks and transactions as opaque serialized payloads tagged with a
//! random gossip nonce. Current peers get the structured `V2` variants.

use relay_messages::{NewBlockMessage, NewTransactionMessage};
use relay_types::{Block, Transaction};

use crate::{codec, ProtocolError};

fn nonce() -> [u8; 16] {
    rand::random()
}

pub fn encode_block(block: &Block) -> Result<NewBlockMessage, ProtocolError> {
    Ok(NewBlockMessage {
        nonce: nonce(),
        block: serialize(block)?,
    })
}

pub fn decode_block(msg: &NewBlockMessage) -> Result<Block, ProtocolError> {
    codec::decode(&msg.block)
}

pub fn encode_transaction(transaction: &Transaction) -> Result<NewTransactionMessage, ProtocolError> {
    Ok(NewTransactionMessage {
        nonce: nonce(),
        transaction: serialize(transaction)?,
    })
}

pub fn decode_transaction(msg: &NewTransactionMessage) -> Result<Transaction, ProtocolError> {
    codec::decode(&msg.transaction)
}

fn serialize(value: &impl serde::Serialize) -> Result<Vec<u8>, ProtocolError> {
    let mut framed = codec::encode(value)?;
    Ok(framed.split_off(codec::FRAME_HEADER_LEN))
}
