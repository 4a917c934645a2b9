//! The change log: pending local mutations.
//!
//! Entries live in a framed log next to the record log. Two frame kinds are
//! written:
//!
//! - an entry frame holding one CBOR-encoded [`ChangeEntry`]
//! - an ack frame holding the highest seq the server has acknowledged
//! - an ack-set frame holding the seqs of one acknowledged push batch
//!
//! Replaying the log yields the entries not covered by any ack. When an ack
//! leaves nothing pending, the log is truncated to zero instead.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use rentsync_protocol::{from_cbor, to_cbor, ChangeEntry};
use rentsync_storage::FramedLog;

const FRAME_ENTRY: u8 = 1;
const FRAME_ACK: u8 = 2;
const FRAME_ACK_SET: u8 = 3;

/// Magic of change log frames.
pub const CHANGE_LOG_MAGIC: [u8; 4] = *b"RCHG";

/// Durable, ordered ledger of unsynchronized local mutations.
#[derive(Debug)]
pub struct ChangeLog {
    log: FramedLog,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    pending: Vec<ChangeEntry>,
    next_seq: u64,
}

impl ChangeLog {
    /// Opens a change log, dropping a torn tail and replaying the rest.
    pub fn open(log: FramedLog) -> CoreResult<Self> {
        let replay = log.recover()?;

        let mut pending: Vec<ChangeEntry> = Vec::new();
        let mut last_seq = 0u64;
        for frame in replay.frames {
            match frame.kind {
                FRAME_ENTRY => {
                    let entry: ChangeEntry = from_cbor(&frame.payload)?;
                    last_seq = last_seq.max(entry.seq);
                    pending.push(entry);
                }
                FRAME_ACK => {
                    let upto: u64 = from_cbor(&frame.payload)?;
                    last_seq = last_seq.max(upto);
                    pending.retain(|e| e.seq > upto);
                }
                FRAME_ACK_SET => {
                    let seqs: Vec<u64> = from_cbor(&frame.payload)?;
                    pending.retain(|e| !seqs.contains(&e.seq));
                }
                other => {
                    return Err(CoreError::invalid_format(format!(
                        "unknown change log frame kind {other} at offset {}",
                        frame.offset
                    )));
                }
            }
        }
        pending.sort_by_key(|e| e.seq);

        tracing::debug!(pending = pending.len(), last_seq, "change log opened");

        Ok(Self {
            log,
            state: Mutex::new(State {
                pending,
                next_seq: last_seq + 1,
            }),
        })
    }

    /// Appends an entry, assigning its seq.
    ///
    /// The entry is on disk when this returns. The stored entry (with its
    /// seq) is returned.
    pub fn append(&self, mut entry: ChangeEntry) -> CoreResult<ChangeEntry> {
        let mut state = self.state.lock();
        entry.seq = state.next_seq;
        let bytes = to_cbor(&entry)?;
        self.log.append(FRAME_ENTRY, &bytes)?;
        state.next_seq += 1;
        state.pending.push(entry.clone());
        Ok(entry)
    }

    /// Returns every pending entry in seq order.
    ///
    /// The log is not modified; entries stay until [`clear`](Self::clear).
    #[must_use]
    pub fn drain(&self) -> Vec<ChangeEntry> {
        self.state.lock().pending.clone()
    }

    /// Removes entries with `seq <= upto_seq` and returns how many were removed.
    ///
    /// Only called after the server acknowledged those entries. Entries
    /// appended after the matching [`drain`](Self::drain) have a higher seq
    /// and survive.
    pub fn clear(&self, upto_seq: u64) -> CoreResult<usize> {
        let mut state = self.state.lock();
        let removed = state.pending.iter().filter(|e| e.seq <= upto_seq).count();
        if removed == 0 {
            return Ok(0);
        }

        if removed == state.pending.len() {
            self.log.reset()?;
        } else {
            self.log.append(FRAME_ACK, &to_cbor(&upto_seq)?)?;
        }
        state.pending.retain(|e| e.seq > upto_seq);

        tracing::debug!(
            removed,
            upto_seq,
            remaining = state.pending.len(),
            "change log cleared"
        );
        Ok(removed)
    }

    /// Removes the entries whose seq is in `seqs` and returns how many were
    /// removed.
    ///
    /// Used when a push was split into batches: each acknowledged batch
    /// clears exactly the entries it carried, whatever their seq.
    pub fn clear_entries(&self, seqs: &[u64]) -> CoreResult<usize> {
        let mut state = self.state.lock();
        let removed = state.pending.iter().filter(|e| seqs.contains(&e.seq)).count();
        if removed == 0 {
            return Ok(0);
        }

        if removed == state.pending.len() {
            self.log.reset()?;
        } else {
            let mut acked: Vec<u64> = state
                .pending
                .iter()
                .map(|e| e.seq)
                .filter(|seq| seqs.contains(seq))
                .collect();
            acked.sort_unstable();
            self.log.append(FRAME_ACK_SET, &to_cbor(&acked)?)?;
        }
        state.pending.retain(|e| !seqs.contains(&e.seq));

        tracing::debug!(
            removed,
            remaining = state.pending.len(),
            "change log entries cleared"
        );
        Ok(removed)
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Returns the seq the next appended entry will get.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.state.lock().next_seq
    }
}
