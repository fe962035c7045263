//! Resumable checksums.
//!
//! Transfers are verified with a streaming digest whose partial state can
//! be checkpointed: the accumulator, any buffered tail bytes and the total
//! length processed so far are laid out as a fixed-width binary record and
//! hex-encoded. A verifier can serialize mid-stream and resume after a
//! process restart, or ship the state to another machine, and still reach
//! the exact digest a single continuous pass would have produced.
//!
//! Two algorithms are supported: CRC32 (cheap, the default for transfer
//! verification) and SHA-256. States and final digests are rendered in a
//! typed form (`crc32:...`, `sha256:...`) so they are self-describing on
//! the wire and in sidecar files.

#[cfg(test)]
mod tests;

use std::str::FromStr;

use crc32fast::Hasher as Crc32Hasher;
use sha2::compress256;
use sha2::digest::generic_array::{typenum::U64, GenericArray};

use crate::error::{DepotError, DepotResult};

/// Serialized CRC32 state: accumulator + total length.
const CRC32_STATE_LEN: usize = 4 + 8;

/// Serialized SHA-256 state: chain value + total length + tail length +
/// zero-padded tail.
const SHA256_STATE_LEN: usize = 32 + 8 + 1 + 63;

/// SHA-256 initial chain value (FIPS 180-4).
const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// A digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// CRC32 (IEEE).
    Crc32,

    /// SHA-256.
    Sha256,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crc32 => "crc32",
            Self::Sha256 => "sha256",
        }
    }
}

impl FromStr for Algorithm {
    type Err = DepotError;

    fn from_str(name: &str) -> DepotResult<Self> {
        match name {
            "crc32" => Ok(Self::Crc32),
            "sha256" => Ok(Self::Sha256),
            _ => Err(DepotError::UnknownDigestAlgorithm {
                name: name.to_owned(),
            }),
        }
    }
}

/// A resumable streaming digest.
#[derive(Debug, Clone)]
pub enum ResumableDigest {
    Crc32(Crc32Digest),
    Sha256(Sha256Digest),
}

impl ResumableDigest {
    /// Creates a fresh digest.
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Crc32 => Self::Crc32(Crc32Digest::new()),
            Algorithm::Sha256 => Self::Sha256(Sha256Digest::new()),
        }
    }

    /// Restores a digest from a serialized state.
    pub fn from_state(state: &str) -> DepotResult<Self> {
        let (algorithm, record) = split_typed(state)?;
        let record = hex::decode(record).map_err(|_| DepotError::InvalidDigest {
            reason: "state is not hexadecimal",
        })?;

        match algorithm {
            Algorithm::Crc32 => Ok(Self::Crc32(Crc32Digest::from_record(&record)?)),
            Algorithm::Sha256 => Ok(Self::Sha256(Sha256Digest::from_record(&record)?)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Crc32(_) => Algorithm::Crc32,
            Self::Sha256(_) => Algorithm::Sha256,
        }
    }

    /// Total number of bytes processed so far.
    pub fn bytes_seen(&self) -> u64 {
        match self {
            Self::Crc32(d) => d.length,
            Self::Sha256(d) => d.length,
        }
    }

    /// Feeds bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Crc32(d) => d.update(bytes),
            Self::Sha256(d) => d.update(bytes),
        }
    }

    /// Serializes the partial accumulator state, typed and hex-encoded.
    pub fn serialize_state(&self) -> String {
        let record = match self {
            Self::Crc32(d) => d.to_record(),
            Self::Sha256(d) => d.to_record(),
        };

        format!("{}:{}", self.algorithm().as_str(), hex::encode(record))
    }

    /// Consumes the digest and returns the typed final value.
    pub fn finalize(self) -> String {
        match self {
            Self::Crc32(d) => format!("crc32:{:08x}", d.finalize()),
            Self::Sha256(d) => format!("sha256:{}", hex::encode(d.finalize())),
        }
    }
}

/// Splits a typed state/digest string into its algorithm and payload.
fn split_typed(s: &str) -> DepotResult<(Algorithm, &str)> {
    let colon = s.find(':').ok_or(DepotError::InvalidDigest {
        reason: "missing algorithm prefix",
    })?;

    let (name, rest) = s.split_at(colon);
    Ok((name.parse()?, &rest[1..]))
}

/// Streaming CRC32.
///
/// The accumulator is the running CRC itself, so resumption maps directly
/// onto `crc32fast`'s support for an initial state.
#[derive(Debug, Clone)]
pub struct Crc32Digest {
    hasher: Crc32Hasher,
    length: u64,
}

impl Crc32Digest {
    fn new() -> Self {
        Self {
            hasher: Crc32Hasher::new(),
            length: 0,
        }
    }

    fn from_record(record: &[u8]) -> DepotResult<Self> {
        if record.len() != CRC32_STATE_LEN {
            return Err(DepotError::InvalidDigest {
                reason: "wrong record length",
            });
        }

        let crc = u32::from_be_bytes(record[0..4].try_into().unwrap());
        let length = u64::from_be_bytes(record[4..12].try_into().unwrap());

        Ok(Self {
            hasher: Crc32Hasher::new_with_initial(crc),
            length,
        })
    }

    fn to_record(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(CRC32_STATE_LEN);
        record.extend_from_slice(&self.hasher.clone().finalize().to_be_bytes());
        record.extend_from_slice(&self.length.to_be_bytes());
        record
    }

    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.length += bytes.len() as u64;
    }

    fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Streaming SHA-256 with an exported chain value.
///
/// `sha2` does not expose its internal hasher state, so full 64-byte blocks
/// are fed through the crate's public compression function and the chain
/// value, buffered tail and total length live in this struct, where they
/// can be serialized. Length padding is applied only at finalization.
#[derive(Debug, Clone)]
pub struct Sha256Digest {
    state: [u32; 8],
    tail: Vec<u8>,
    length: u64,
}

impl Sha256Digest {
    fn new() -> Self {
        Self {
            state: SHA256_IV,
            tail: Vec::with_capacity(64),
            length: 0,
        }
    }

    fn from_record(record: &[u8]) -> DepotResult<Self> {
        if record.len() != SHA256_STATE_LEN {
            return Err(DepotError::InvalidDigest {
                reason: "wrong record length",
            });
        }

        let mut state = [0u32; 8];
        for (i, word) in state.iter_mut().enumerate() {
            *word = u32::from_be_bytes(record[i * 4..i * 4 + 4].try_into().unwrap());
        }

        let length = u64::from_be_bytes(record[32..40].try_into().unwrap());
        let tail_len = record[40] as usize;
        if tail_len >= 64 {
            return Err(DepotError::InvalidDigest {
                reason: "buffered tail too long",
            });
        }

        Ok(Self {
            state,
            tail: record[41..41 + tail_len].to_vec(),
            length,
        })
    }

    fn to_record(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(SHA256_STATE_LEN);
        for word in &self.state {
            record.extend_from_slice(&word.to_be_bytes());
        }
        record.extend_from_slice(&self.length.to_be_bytes());
        record.push(self.tail.len() as u8);
        record.extend_from_slice(&self.tail);
        record.resize(SHA256_STATE_LEN, 0);
        record
    }

    fn compress(state: &mut [u32; 8], block: &[u8]) {
        let block: &GenericArray<u8, U64> = GenericArray::from_slice(block);
        compress256(state, std::slice::from_ref(block));
    }

    fn update(&mut self, mut bytes: &[u8]) {
        self.length += bytes.len() as u64;

        if !self.tail.is_empty() {
            let need = 64 - self.tail.len();
            if bytes.len() < need {
                self.tail.extend_from_slice(bytes);
                return;
            }

            self.tail.extend_from_slice(&bytes[..need]);
            bytes = &bytes[need..];

            let block = std::mem::take(&mut self.tail);
            Self::compress(&mut self.state, &block);
        }

        let mut blocks = bytes.chunks_exact(64);
        for block in blocks.by_ref() {
            Self::compress(&mut self.state, block);
        }

        self.tail.extend_from_slice(blocks.remainder());
    }

    fn finalize(mut self) -> [u8; 32] {
        let bit_length = self.length.wrapping_mul(8);

        let mut padded = self.tail;
        padded.push(0x80);
        while padded.len() % 64 != 56 {
            padded.push(0);
        }
        padded.extend_from_slice(&bit_length.to_be_bytes());

        for block in padded.chunks_exact(64) {
            Self::compress(&mut self.state, block);
        }

        let mut out = [0u8; 32];
        for (i, word) in self.state.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}
