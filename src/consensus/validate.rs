use {
  super::block::ApprovedBlock,
  crate::primitives::Pubkey,
  ed25519_dalek::{PublicKey, Verifier},
  std::collections::HashSet,
  tracing::warn,
};

/// Checks that an approved block carries at least `required_sigs`
/// valid signatures from distinct members of the trusted validator
/// set.
///
/// Signatures from unknown validators, duplicate signers and
/// signatures that do not verify over the candidate hash are all
/// ignored rather than rejected outright, so a single bad signature
/// cannot poison an otherwise sufficient approval set.
pub fn approved_block(
  approved: &ApprovedBlock,
  trusted: &HashSet<Pubkey>,
  required_sigs: u32,
) -> bool {
  let candidate_hash = approved.candidate.hash();
  let message = candidate_hash.to_bytes();

  let mut signers: HashSet<Pubkey> = HashSet::new();
  for approval in &approved.signatures {
    if !trusted.contains(&approval.validator) {
      warn!(
        "Ignoring approval from non-trusted validator {}",
        approval.validator
      );
      continue;
    }
    let public = match PublicKey::try_from(&approval.validator) {
      Ok(public) => public,
      Err(_) => continue,
    };
    if public.verify(&message, &approval.signature).is_ok() {
      signers.insert(approval.validator);
    } else {
      warn!(
        "Ignoring approval with invalid signature from {}",
        approval.validator
      );
    }
  }

  signers.len() as u32 >= required_sigs
}
