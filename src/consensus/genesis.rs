use {
  super::block::{ApprovedBlockCandidate, Block, Bond},
  crate::primitives::{Keypair, Pubkey},
  multihash::{Code as MultihashCode, Hasher, MultihashDigest, Sha3_256},
  serde::{Deserialize, Serialize},
  std::{collections::HashSet, fs, path::Path},
  thiserror::Error,
  tracing::info,
};

/// An initial token balance granted in the genesis block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
  pub owner: Pubkey,
  pub balance: u64,
}

/// Everything needed to construct the genesis candidate
/// deterministically.
///
/// Two nodes configured with equal parameters produce candidates
/// with equal hashes; that equality is how a genesis validator
/// decides whether to sign a circulated candidate.
#[derive(Debug, Clone)]
pub struct GenesisParams {
  pub shard_id: String,
  pub timestamp: i64,
  pub bonds: Vec<Bond>,
  pub wallets: Vec<Wallet>,
  pub minimum_bond: u64,
  pub maximum_bond: u64,
  pub has_faucet: bool,
  pub required_sigs: u32,
}

#[derive(Debug, Error)]
pub enum GenesisError {
  #[error("System IO Error: {0}")]
  SystemIO(#[from] std::io::Error),

  #[error("Malformed genesis file: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("Malformed validator key: {0:?}")]
  MalformedKey(bs58::decode::Error),

  #[error("Bond of {0} is outside the [{1}, {2}] stake bounds")]
  BondOutOfBounds(u64, u64, u64),
}

/// Builds the genesis candidate for the given parameters.
pub fn build_candidate(params: &GenesisParams) -> ApprovedBlockCandidate {
  ApprovedBlockCandidate {
    block: genesis_block(params),
    required_sigs: params.required_sigs,
  }
}

/// The deterministic genesis block of a shard.
fn genesis_block(params: &GenesisParams) -> Block {
  // bonds and wallets are sorted so that two configurations that
  // differ only in file ordering hash identically.
  let mut bonds = params.bonds.clone();
  bonds.sort_by_key(|b| b.validator);
  let mut wallets = params.wallets.clone();
  wallets.sort_by_key(|w| w.owner);

  let mut sha3 = Sha3_256::default();
  for wallet in &wallets {
    sha3.update(&wallet.owner);
    sha3.update(&wallet.balance.to_le_bytes());
  }
  sha3.update(&params.minimum_bond.to_le_bytes());
  sha3.update(&params.maximum_bond.to_le_bytes());
  sha3.update(&[params.has_faucet as u8]);
  let state_hash = MultihashCode::Sha3_256.wrap(sha3.finalize()).unwrap();

  Block {
    parents: vec![],
    sender: Pubkey::zero(),
    bonds,
    state_hash,
    shard_id: params.shard_id.clone(),
    timestamp: params.timestamp,
    signature: None,
  }
}

/// Reads the bond table from its JSON serialized form.
pub fn read_bonds(path: &Path) -> Result<Vec<Bond>, GenesisError> {
  let json = fs::read_to_string(path)?;
  let bonds: Vec<Bond> = serde_json::from_str(&json)?;
  Ok(bonds)
}

/// Reads genesis wallets from their JSON serialized form.
pub fn read_wallets(path: &Path) -> Result<Vec<Wallet>, GenesisError> {
  let json = fs::read_to_string(path)?;
  let wallets: Vec<Wallet> = serde_json::from_str(&json)?;
  Ok(wallets)
}

/// Validates every bond against the configured stake bounds.
pub fn check_bonds(
  bonds: &[Bond],
  minimum: u64,
  maximum: u64,
) -> Result<(), GenesisError> {
  for bond in bonds {
    if bond.stake < minimum || bond.stake > maximum {
      return Err(GenesisError::BondOutOfBounds(bond.stake, minimum, maximum));
    }
  }
  Ok(())
}

/// Generates a fresh bond table when the operator supplied none.
///
/// Writes the generated `bonds.json` plus one `<pubkey>.sk` secret
/// key file per validator under the genesis directory, so that the
/// operator can distribute the keys to the ceremony participants.
pub fn generate_bonds(
  genesis_path: &Path,
  num_validators: usize,
  minimum_bond: u64,
) -> Result<Vec<Bond>, GenesisError> {
  fs::create_dir_all(genesis_path)?;
  let mut bonds = Vec::with_capacity(num_validators);
  for i in 0..num_validators {
    let keypair = Keypair::unique();
    let bond = Bond {
      validator: keypair.public(),
      stake: minimum_bond + i as u64,
    };
    let keyfile = genesis_path.join(format!("{}.sk", bond.validator));
    fs::write(&keyfile, bs58::encode(keypair.secret().as_bytes()).into_string())?;
    info!("Generated validator {} with bond {}", bond.validator, bond.stake);
    bonds.push(bond);
  }
  fs::write(
    genesis_path.join("bonds.json"),
    serde_json::to_string_pretty(&bonds)?,
  )?;
  Ok(bonds)
}

/// Reads the set of trusted genesis validators, one base58 public
/// key per line.
pub fn read_known_validators(
  path: &Path,
) -> Result<HashSet<Pubkey>, GenesisError> {
  let contents = fs::read_to_string(path)?;
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(|line| line.parse().map_err(GenesisError::MalformedKey))
    .collect()
}
