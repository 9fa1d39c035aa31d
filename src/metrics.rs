//! Counters of the packet handler.

use metrics::{counter, describe_counter};

pub const BLOCKS_RECEIVED: &str = "casper_packet_handler_blocks_received";
pub const BLOCKS_RECEIVED_AGAIN: &str =
  "casper_packet_handler_blocks_received_again";

/// Describes the packet handler counters and establishes them with a
/// zero base value. Called once at startup.
pub fn describe() {
  describe_counter!(
    BLOCKS_RECEIVED,
    "Blocks received while fully participating"
  );
  describe_counter!(
    BLOCKS_RECEIVED_AGAIN,
    "Received blocks that were already known"
  );
  counter!(BLOCKS_RECEIVED).absolute(0);
  counter!(BLOCKS_RECEIVED_AGAIN).absolute(0);
}
