use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

// Deterministic draw stream using a provably-fair HMAC construction:
// server_seed (secret) + client_seed + nonce + block -> HMAC-SHA256 -> floats in [0,1)
// Publishing the server seed hash before a ceremony lets anyone replay it afterwards.

pub type HmacSha256 = Hmac<Sha256>;

const FLOATS_PER_BLOCK: usize = 8;

pub fn derive_hash_hex(input: &[u8]) -> String {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Map successive big-endian 4-byte chunks onto [0,1).
pub fn derive_floats(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let v = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            (v as f64) / (u32::MAX as f64 + 1.0)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ProvablyFairRng {
    server_seed: String, // secret
    client_seed: String,
    nonce: u64,
    block: u64,
    buffer: Vec<f64>,
}

impl ProvablyFairRng {
    pub fn new(server_seed: impl Into<String>, client_seed: impl Into<String>, nonce: u64) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
            block: 0,
            buffer: Vec::with_capacity(FLOATS_PER_BLOCK),
        }
    }

    /// Fresh 32-byte server seed from OS entropy.
    pub fn from_entropy(client_seed: impl Into<String>) -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self::new(hex::encode(seed), client_seed, 0)
    }

    pub fn server_seed(&self) -> &str {
        &self.server_seed
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn server_seed_hash_hex(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    pub fn hmac_bytes(&self, block: u64) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(self.server_seed.as_bytes()).expect("HMAC key");
        let msg = format!("{}:{}:{}", self.client_seed, self.nonce, block);
        mac.update(msg.as_bytes());
        let res = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&res);
        out
    }

    /// Next float in [0,1).
    pub fn next_f64(&mut self) -> f64 {
        if self.buffer.is_empty() {
            let bytes = self.hmac_bytes(self.block);
            self.block += 1;
            self.buffer = derive_floats(&bytes);
            self.buffer.reverse();
        }
        self.buffer.pop().unwrap_or_default()
    }

    pub fn next_floats(&mut self, count: usize) -> Vec<f64> {
        (0..count).map(|_| self.next_f64()).collect()
    }

    /// Uniform in [low, high); bounds may be given in either order.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        low + (high - low) * self.next_f64()
    }

    /// Uniform index in [0, n). Returns 0 for n == 0.
    pub fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        ((self.next_f64() * n as f64).floor() as usize).min(n - 1)
    }

    /// `count` distinct items drawn without replacement, in draw order.
    pub fn sample(&mut self, pool: &[usize], count: usize) -> Vec<usize> {
        let mut items = pool.to_vec();
        let count = count.min(items.len());
        for i in 0..count {
            let j = i + self.below(items.len() - i);
            items.swap(i, j);
        }
        items.truncate(count);
        items
    }
}
