//! CRC-framed append-only logs.
//!
//! Every frame is laid out as:
//!
//! ```text
//! magic (4) | version (2, LE) | kind (1) | len (4, LE) | payload (len) | crc32 (4, LE)
//! ```
//!
//! The CRC covers everything before it. On replay, a frame that is cut short
//! or fails its CRC at the very end of the log is a torn write from a crash
//! and is dropped; the same failure anywhere earlier is corruption.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;

/// Current frame format version.
const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4).
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Bytes added to every payload by framing.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame header in the log.
    pub offset: u64,
    /// Caller-defined frame kind.
    pub kind: u8,
    /// Frame payload.
    pub payload: Vec<u8>,
}

/// Outcome of reading a log from the start.
#[derive(Debug, Clone, Default)]
pub struct Replay {
    /// Valid frames in log order.
    pub frames: Vec<Frame>,
    /// Length of the log prefix made of valid frames.
    pub valid_len: u64,
    /// Bytes after `valid_len` belonging to a torn frame.
    pub torn_bytes: u64,
}

/// An append-only log of CRC-checked frames over a [`StorageBackend`].
///
/// Appends are serialized by an internal lock, so a frame is always written
/// with a single backend `append` and is either fully present or torn.
pub struct FramedLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    magic: [u8; 4],
    sync_on_write: bool,
    read_only: bool,
}

impl FramedLog {
    /// Creates a log over `backend` whose frames carry `magic`.
    pub fn new(backend: Box<dyn StorageBackend>, magic: [u8; 4]) -> Self {
        Self {
            backend: Mutex::new(backend),
            magic,
            sync_on_write: false,
            read_only: false,
        }
    }

    /// Calls `sync` (not just `flush`) after every append.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// Refuses appends and resets, and leaves torn tails in place on
    /// [`recover`](Self::recover).
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Appends one frame and makes it durable before returning.
    ///
    /// Returns the offset of the frame.
    pub fn append(&self, kind: u8, payload: &[u8]) -> StorageResult<u64> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let len =
            u32::try_from(payload.len()).map_err(|_| StorageError::FrameTooLarge(payload.len()))?;

        let mut data = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
        data.extend_from_slice(&self.magic);
        data.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        data.push(kind);
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        if self.sync_on_write {
            backend.sync()?;
        } else {
            backend.flush()?;
        }
        Ok(offset)
    }

    /// Reads every valid frame from the start of the log.
    pub fn replay(&self) -> StorageResult<Replay> {
        let bytes = self.backend.lock().read_all()?;
        decode_frames(&bytes, self.magic)
    }

    /// Replays the log and cuts off a torn tail, if any.
    ///
    /// A read-only log keeps the tail; only the valid frames are returned.
    pub fn recover(&self) -> StorageResult<Replay> {
        let mut backend = self.backend.lock();
        let bytes = backend.read_all()?;
        let replay = decode_frames(&bytes, self.magic)?;
        if replay.torn_bytes > 0 && self.read_only {
            tracing::warn!(
                valid_len = replay.valid_len,
                torn_bytes = replay.torn_bytes,
                "torn frame at end of read-only log left in place"
            );
        } else if replay.torn_bytes > 0 {
            tracing::warn!(
                valid_len = replay.valid_len,
                torn_bytes = replay.torn_bytes,
                "dropping torn frame at end of log"
            );
            backend.truncate(replay.valid_len)?;
        }
        Ok(replay)
    }

    /// Drops every frame.
    pub fn reset(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.backend.lock().truncate(0)
    }

    /// Returns the log size in bytes.
    pub fn size(&self) -> StorageResult<u64> {
        self.backend.lock().size()
    }
}

impl std::fmt::Debug for FramedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedLog")
            .field("magic", &String::from_utf8_lossy(&self.magic))
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

fn decode_frames(bytes: &[u8], magic: [u8; 4]) -> StorageResult<Replay> {
    let total = bytes.len();
    let mut frames = Vec::new();
    let mut pos = 0usize;

    while pos < total {
        let offset = pos as u64;
        let torn = |pos: usize| Replay {
            frames: Vec::new(),
            valid_len: pos as u64,
            torn_bytes: (total - pos) as u64,
        };

        if total - pos < HEADER_SIZE {
            return Ok(Replay { frames, ..torn(pos) });
        }
        let header = &bytes[pos..pos + HEADER_SIZE];
        if header[0..4] != magic {
            return Err(StorageError::corrupted(offset, "bad frame magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != FRAME_VERSION {
            return Err(StorageError::corrupted(
                offset,
                format!("unsupported frame version {version}"),
            ));
        }
        let kind = header[6];
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let end = pos + HEADER_SIZE + len + CRC_SIZE;
        if end > total {
            return Ok(Replay { frames, ..torn(pos) });
        }

        let body_end = pos + HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        if compute_crc32(&bytes[pos..body_end]) != stored {
            if end == total {
                return Ok(Replay { frames, ..torn(pos) });
            }
            return Err(StorageError::corrupted(offset, "frame checksum mismatch"));
        }

        frames.push(Frame {
            offset,
            kind,
            payload: bytes[pos + HEADER_SIZE..body_end].to_vec(),
        });
        pos = end;
    }

    Ok(Replay {
        frames,
        valid_len: total as u64,
        torn_bytes: 0,
    })
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}
