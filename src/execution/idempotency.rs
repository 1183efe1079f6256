use sha2::{Digest, Sha256};

/// Deterministic client order ids within the exchange's 36-char
/// `[A-Za-z0-9._-]` constraint: a 4-char action prefix plus the first
/// 16 bytes of SHA-256(originId|userId|walletId) as hex.
fn keyed(prefix: &str, origin_id: &str, user_id: &str, wallet_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(origin_id.as_bytes());
    hasher.update(b"|");
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(wallet_id.as_bytes());
    let digest = hasher.finalize();

    format!("{prefix}{}", hex::encode(&digest[..16]))
}

pub fn open_client_order_id(origin_id: &str, user_id: &str, wallet_id: &str) -> String {
    keyed("cpO_", origin_id, user_id, wallet_id)
}

pub fn close_client_order_id(origin_id: &str, user_id: &str, wallet_id: &str) -> String {
    keyed("cpC_", origin_id, user_id, wallet_id)
}
