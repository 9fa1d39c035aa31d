//! Wire protocol of the Casper packet layer.
//!
//! Every message that travels between nodes is wrapped in a [`Packet`]:
//! a routing type id string plus the bincode encoding of the message
//! body. The type id strings are part of the wire contract and must
//! match the identifiers registered with the transport layer on every
//! node of the shard.

use {
  crate::consensus::{ApprovedBlock, ApprovedBlockCandidate, Block, ValidatorSignature},
  multihash::Multihash,
  serde::{Deserialize, Serialize},
  tracing::debug,
};

/// Registered packet type identifiers, one per message variant.
pub mod type_ids {
  pub const BLOCK_MESSAGE: &str = "BlockMessage";
  pub const BLOCK_REQUEST: &str = "BlockRequest";
  pub const FORK_CHOICE_TIP_REQUEST: &str = "ForkChoiceTipRequest";
  pub const APPROVED_BLOCK: &str = "ApprovedBlock";
  pub const APPROVED_BLOCK_REQUEST: &str = "ApprovedBlockRequest";
  pub const UNAPPROVED_BLOCK: &str = "UnapprovedBlock";
  pub const BLOCK_APPROVAL: &str = "BlockApproval";
  pub const NO_APPROVED_BLOCK_AVAILABLE: &str = "NoApprovedBlockAvailable";
}

/// A typed unit of data on the transport's routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
  pub type_id: String,
  pub content: Vec<u8>,
}

/// The decoded form of every packet this node understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CasperMessage {
  /// A block gossiped or streamed by another node.
  BlockMessage(Block),

  /// A request to replay a block with the given hash.
  BlockRequest { hash: Multihash },

  /// A request for the current head of the fork choice rule.
  ForkChoiceTipRequest,

  /// A genesis candidate together with the validator signatures
  /// that approve it.
  ApprovedBlock(ApprovedBlock),

  /// A request for the approved block this node transitioned on.
  ApprovedBlockRequest { identifier: String },

  /// A genesis candidate circulated by the genesis constructor for
  /// validators to sign.
  UnapprovedBlock {
    candidate: ApprovedBlockCandidate,
    timestamp: i64,
    duration_millis: u64,
  },

  /// A single validator's signature over a genesis candidate.
  BlockApproval {
    candidate_hash: Multihash,
    approval: ValidatorSignature,
  },

  /// Reply sent to nodes requesting an approved block before this
  /// node has transitioned.
  NoApprovedBlockAvailable { identifier: String, node_id: String },
}

impl CasperMessage {
  /// The registered type id this message travels under.
  pub fn type_id(&self) -> &'static str {
    match self {
      Self::BlockMessage(_) => type_ids::BLOCK_MESSAGE,
      Self::BlockRequest { .. } => type_ids::BLOCK_REQUEST,
      Self::ForkChoiceTipRequest => type_ids::FORK_CHOICE_TIP_REQUEST,
      Self::ApprovedBlock(_) => type_ids::APPROVED_BLOCK,
      Self::ApprovedBlockRequest { .. } => type_ids::APPROVED_BLOCK_REQUEST,
      Self::UnapprovedBlock { .. } => type_ids::UNAPPROVED_BLOCK,
      Self::BlockApproval { .. } => type_ids::BLOCK_APPROVAL,
      Self::NoApprovedBlockAvailable { .. } => {
        type_ids::NO_APPROVED_BLOCK_AVAILABLE
      }
    }
  }

  /// Wraps this message in a packet with its canonical encoding.
  pub fn to_packet(&self) -> Packet {
    Packet {
      type_id: self.type_id().to_owned(),
      content: bincode::serialize(self).unwrap(),
    }
  }
}

/// Decodes a packet into a protocol message.
///
/// Returns `None` both for unknown type ids (the packet belongs to
/// another handler in the host process) and for malformed content of
/// a known type id (the packet is silently dropped).
pub fn decode(packet: &Packet) -> Option<CasperMessage> {
  let known = matches!(
    packet.type_id.as_str(),
    type_ids::BLOCK_MESSAGE
      | type_ids::BLOCK_REQUEST
      | type_ids::FORK_CHOICE_TIP_REQUEST
      | type_ids::APPROVED_BLOCK
      | type_ids::APPROVED_BLOCK_REQUEST
      | type_ids::UNAPPROVED_BLOCK
      | type_ids::BLOCK_APPROVAL
      | type_ids::NO_APPROVED_BLOCK_AVAILABLE
  );
  if !known {
    return None;
  }

  let message: CasperMessage = match bincode::deserialize(&packet.content) {
    Ok(message) => message,
    Err(e) => {
      debug!("Dropping malformed {} packet: {e}", packet.type_id);
      return None;
    }
  };

  // the content must carry the variant its type id announces,
  // otherwise a peer could smuggle one message kind under another
  // handler's routing id.
  if message.type_id() != packet.type_id {
    debug!(
      "Dropping packet declaring {} but encoding {}",
      packet.type_id,
      message.type_id()
    );
    return None;
  }

  Some(message)
}

#[cfg(test)]
mod test {
  use {
    super::{decode, type_ids, CasperMessage, Packet},
    crate::{
      consensus::{ApprovedBlock, ValidatorSignature},
      test::utils::{genesis_candidate, genesis_params, keypair_default},
    },
  };

  fn sample_messages() -> Vec<CasperMessage> {
    let keypair = keypair_default();
    let candidate = genesis_candidate(&genesis_params(&[&keypair], 1));
    let candidate_hash = candidate.hash();
    let approval = ValidatorSignature {
      validator: keypair.public(),
      signature: keypair.sign(&candidate_hash.to_bytes()),
    };
    vec![
      CasperMessage::BlockMessage(candidate.block.clone()),
      CasperMessage::BlockRequest {
        hash: candidate.block.hash(),
      },
      CasperMessage::ForkChoiceTipRequest,
      CasperMessage::ApprovedBlock(ApprovedBlock {
        candidate: candidate.clone(),
        signatures: vec![approval.clone()],
      }),
      CasperMessage::ApprovedBlockRequest {
        identifier: "ApprovedBlockRequest".to_owned(),
      },
      CasperMessage::UnapprovedBlock {
        candidate,
        timestamp: 1_640_000_000_000,
        duration_millis: 300_000,
      },
      CasperMessage::BlockApproval {
        candidate_hash,
        approval,
      },
      CasperMessage::NoApprovedBlockAvailable {
        identifier: "ApprovedBlockRequest".to_owned(),
        node_id: keypair.public().to_string(),
      },
    ]
  }

  #[test]
  fn every_variant_roundtrips() {
    for message in sample_messages() {
      let packet = message.to_packet();
      assert_eq!(decode(&packet), Some(message));
    }
  }

  #[test]
  fn unknown_type_id_falls_through() {
    let packet = Packet {
      type_id: "HeartbeatPing".to_owned(),
      content: vec![1, 2, 3],
    };
    assert_eq!(decode(&packet), None);
  }

  #[test]
  fn malformed_content_is_dropped() {
    for type_id in [
      type_ids::BLOCK_MESSAGE,
      type_ids::APPROVED_BLOCK,
      type_ids::BLOCK_APPROVAL,
    ] {
      let packet = Packet {
        type_id: type_id.to_owned(),
        content: vec![0xff; 7],
      };
      assert_eq!(decode(&packet), None);
    }
  }

  #[test]
  fn mismatched_type_id_is_dropped() {
    let mut packet = CasperMessage::ForkChoiceTipRequest.to_packet();
    packet.type_id = type_ids::BLOCK_REQUEST.to_owned();
    assert_eq!(decode(&packet), None);
  }
}
