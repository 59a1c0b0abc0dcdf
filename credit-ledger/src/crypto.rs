//! Journal integrity hashing
//!
//! Every ledger entry is hash-chained to its predecessor within one
//! (account, pool) journal: `entry_hash = SHA-256(content || prev_hash)`.
//! The store keeps the chain head next to the sequence counter, and the
//! conservation checker re-derives the whole chain, so an after-the-fact
//! UPDATE or DELETE of any entry is detectable even though the storage
//! interface never offers one.

use crate::{
    store::JournalHead,
    types::LedgerEntry,
};
use sha2::{Digest, Sha256};

/// Compute the content hash of an entry. Covers every field except
/// `entry_hash` itself; `prev_hash` is included, which is what links the
/// chain.
pub fn entry_hash(entry: &LedgerEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.id.as_bytes());
    hasher.update(entry.account_id.as_bytes());
    hasher.update(entry.pool_id.as_str().as_bytes());
    hasher.update(entry.entry_seq.to_be_bytes());
    hasher.update([entry.entry_type.code()]);
    hasher.update(entry.amount.to_be_bytes());
    hasher.update((entry.idempotency_key.len() as u64).to_be_bytes());
    hasher.update(entry.idempotency_key.as_bytes());
    match entry.reference {
        Some(reference) => hasher.update(reference.as_bytes()),
        None => hasher.update([0u8; 16]),
    }
    hasher.update(
        entry
            .created_at
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_be_bytes(),
    );
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}

/// Verify one (account, pool) chain: gapless 1-based sequences, intact
/// hash links, and a final link matching the stored head. `entries` must be
/// in entry_seq order (the store contract). Returns a description of the
/// first divergence found.
pub fn verify_chain(entries: &[LedgerEntry], head: &JournalHead) -> Result<(), String> {
    let mut prev = JournalHead::default();

    for entry in entries {
        if entry.entry_seq != prev.seq + 1 {
            return Err(format!(
                "sequence gap: entry {} has seq {}, expected {}",
                entry.id,
                entry.entry_seq,
                prev.seq + 1
            ));
        }
        if entry.prev_hash != prev.hash {
            return Err(format!(
                "broken chain link at seq {}: prev_hash does not match predecessor",
                entry.entry_seq
            ));
        }
        let recomputed = entry_hash(entry);
        if entry.entry_hash != recomputed {
            return Err(format!(
                "entry {} at seq {} does not hash to its recorded entry_hash",
                entry.id, entry.entry_seq
            ));
        }
        prev.seq = entry.entry_seq;
        prev.hash = entry.entry_hash;
    }

    if prev.seq != head.seq || prev.hash != head.hash {
        return Err(format!(
            "journal head mismatch: chain ends at seq {}, head records seq {}",
            prev.seq, head.seq
        ));
    }

    Ok(())
}
