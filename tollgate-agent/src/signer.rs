//! Custodial signer and transfer construction.
//!
//! Holds the single Ed25519 keypair the agent pays with and builds the
//! wire-format system-program transfer it submits. The secret is parsed
//! once at boot and never leaves this module in plaintext; only public
//! material and signatures are exposed.

use ed25519_dalek::{Signer, SigningKey};
use rand_core::OsRng;

use base64::Engine;
use tollgate_core::error::{AgentError, AgentResult};

/// System program id (all zeros).
const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// System-program instruction tag for `Transfer`.
const TRANSFER_INSTRUCTION: u32 = 2;

/// Custodial Ed25519 keypair
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Parse from the configured secret: either a base58 64-byte keypair
    /// (secret || public) or a hex/base58 32-byte seed.
    pub fn from_encoded(encoded: &str) -> AgentResult<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .ok()
            .or_else(|| hex::decode(encoded).ok())
            .ok_or_else(|| {
                AgentError::Configuration("signer secret is neither base58 nor hex".to_string())
            })?;

        if bytes.len() != 32 && bytes.len() != 64 {
            return Err(AgentError::Configuration(format!(
                "signer secret has invalid length: expected 32 or 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public key as a base58 address.
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret material stays out of debug output.
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key_base58())
            .finish()
    }
}

/// A signed transfer ready for submission
#[derive(Debug, Clone)]
pub struct BuiltTransfer {
    /// Base64-encoded wire transaction
    pub tx_base64: String,
    /// Base58 signature; doubles as the transaction hash
    pub signature: String,
}

/// Build and sign a system-program transfer of `lamports` from the signer
/// to `recipient`, anchored to `recent_blockhash`.
pub fn build_transfer(
    signer: &Keypair,
    recipient: &str,
    lamports: u64,
    recent_blockhash: &str,
) -> AgentResult<BuiltTransfer> {
    if lamports == 0 {
        return Err(AgentError::ChainRejected(
            "transfer amount must be at least one lamport".to_string(),
        ));
    }

    let to = decode_pubkey(recipient)?;
    let blockhash = decode_pubkey(recent_blockhash)
        .map_err(|_| AgentError::ChainRejected("invalid recent blockhash".to_string()))?;
    let from = signer.public_key_bytes();

    // Legacy message: header, account keys, blockhash, one instruction.
    let mut message = Vec::with_capacity(1 + 2 + 1 + 3 * 32 + 32 + 32);
    message.push(1); // required signatures
    message.push(0); // read-only signed
    message.push(1); // read-only unsigned (the program)

    push_compact_u16(&mut message, 3);
    message.extend_from_slice(&from);
    message.extend_from_slice(&to);
    message.extend_from_slice(&SYSTEM_PROGRAM_ID);

    message.extend_from_slice(&blockhash);

    push_compact_u16(&mut message, 1); // one instruction
    message.push(2); // program id index
    push_compact_u16(&mut message, 2); // two accounts
    message.push(0); // from
    message.push(1); // to
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&TRANSFER_INSTRUCTION.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    push_compact_u16(&mut message, data.len() as u16);
    message.extend_from_slice(&data);

    let signature = signer.sign(&message);

    let mut tx = Vec::with_capacity(1 + 64 + message.len());
    push_compact_u16(&mut tx, 1); // one signature
    tx.extend_from_slice(&signature);
    tx.extend_from_slice(&message);

    Ok(BuiltTransfer {
        tx_base64: base64::engine::general_purpose::STANDARD.encode(&tx),
        signature: bs58::encode(signature).into_string(),
    })
}

fn decode_pubkey(encoded: &str) -> AgentResult<[u8; 32]> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| AgentError::ChainRejected(format!("invalid base58 key: {}", e)))?;
    bytes.try_into().map_err(|_| {
        AgentError::ChainRejected(format!("key {} is not 32 bytes", encoded))
    })
}

/// Solana shortvec length prefix.
fn push_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}
