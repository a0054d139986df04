//! Recording file format
//!
//! All fields little-endian, no padding:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | magic `0x504F5352` ("POSR") |
//! | 4 | 4 | version |
//! | 8 | 4 | frame count `n` |
//! | 12 | 24·n | frames |
//! | 12+24·n | 4 | CRC-32 of bytes `0..12+24·n` (version 2 only) |
//!
//! Each frame:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | x (f32) |
//! | 4 | 4 | y (f32) |
//! | 8 | 4 | theta (f32) |
//! | 12 | 8 | timestamp µs (u64) |
//! | 20 | 1 | intake power (i8) |
//! | 21 | 1 | outtake power (i8) |
//! | 22 | 1 | buttons (u8) |
//! | 23 | 1 | has_action (0 or 1) |

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use crc32fast::Hasher;
use std::io::{self, Read};
use std::path::Path;

use super::{ButtonSet, FrameStore, ReplayError, StoreError, Waypoint};
use crate::robot::Storage;

/// File magic, "POSR" read as a little-endian u32
pub const MAGIC: u32 = 0x504F_5352;

/// Version written by [`encode`]
pub const FORMAT_VERSION: u32 = 2;

/// Versions [`read_from`] accepts
pub const SUPPORTED_VERSIONS: &[u32] = &[1, 2];

/// Header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Encoded size of one frame in bytes
pub const RECORD_SIZE: usize = 24;

/// Hard ceiling on the frame count of any file we will read
pub const MAX_FILE_FRAMES: u32 = 20_000;

/// Encode frames as a complete current-version file
pub fn encode(frames: &[Waypoint]) -> Vec<u8> {
    encode_as(frames, FORMAT_VERSION)
}

fn encode_as(frames: &[Waypoint], version: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + frames.len() * RECORD_SIZE + 4);

    let mut header = [0u8; HEADER_SIZE];
    LittleEndian::write_u32(&mut header[0..4], MAGIC);
    LittleEndian::write_u32(&mut header[4..8], version);
    LittleEndian::write_u32(&mut header[8..12], frames.len() as u32);
    bytes.extend_from_slice(&header);

    for frame in frames {
        bytes.extend_from_slice(&encode_frame(frame));
    }

    if version >= 2 {
        let mut hasher = Hasher::new();
        hasher.update(&bytes);
        let mut crc = [0u8; 4];
        LittleEndian::write_u32(&mut crc, hasher.finalize());
        bytes.extend_from_slice(&crc);
    }

    bytes
}

fn encode_frame(frame: &Waypoint) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    LittleEndian::write_f32(&mut buf[0..4], frame.x);
    LittleEndian::write_f32(&mut buf[4..8], frame.y);
    LittleEndian::write_f32(&mut buf[8..12], frame.theta);
    LittleEndian::write_u64(&mut buf[12..20], frame.timestamp);
    buf[20] = frame.intake_power as u8;
    buf[21] = frame.outtake_power as u8;
    buf[22] = frame.buttons.bits();
    buf[23] = frame.has_action as u8;
    buf
}

/// Read a complete file from `reader`
///
/// The magic is checked before any other field is trusted, and the declared
/// frame count is checked against `limit` (and [`MAX_FILE_FRAMES`]) before
/// any frame body is allocated or read. A short read anywhere rejects the
/// whole file.
pub fn read_from<R: Read>(mut reader: R, limit: usize) -> Result<Vec<Waypoint>, ReplayError> {
    let magic = reader.read_u32::<LittleEndian>().map_err(truncated("header"))?;
    if magic != MAGIC {
        return Err(ReplayError::CorruptFormat(format!(
            "bad magic {magic:#010x}, expected {MAGIC:#010x}"
        )));
    }

    let version = reader.read_u32::<LittleEndian>().map_err(truncated("header"))?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ReplayError::VersionMismatch {
            found: version,
            supported: SUPPORTED_VERSIONS,
        });
    }

    let count = reader.read_u32::<LittleEndian>().map_err(truncated("header"))?;
    let limit = (limit as u64).min(MAX_FILE_FRAMES as u64) as u32;
    if count > limit {
        return Err(ReplayError::TooLarge { count, limit });
    }

    let mut body = vec![0u8; count as usize * RECORD_SIZE];
    reader.read_exact(&mut body).map_err(truncated("frames"))?;

    if version >= 2 {
        let stored = reader.read_u32::<LittleEndian>().map_err(truncated("checksum"))?;
        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut header[0..4], magic);
        LittleEndian::write_u32(&mut header[4..8], version);
        LittleEndian::write_u32(&mut header[8..12], count);

        let mut hasher = Hasher::new();
        hasher.update(&header);
        hasher.update(&body);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(ReplayError::CorruptFormat(format!(
                "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }
    }

    let frames = body
        .chunks_exact(RECORD_SIZE)
        .enumerate()
        .map(|(index, chunk)| decode_frame(index, chunk))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(index) = frames
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
    {
        return Err(ReplayError::CorruptFormat(format!(
            "frame {} goes back in time",
            index + 1
        )));
    }

    Ok(frames)
}

/// Decode a complete file held in memory
pub fn decode(bytes: &[u8], limit: usize) -> Result<Vec<Waypoint>, ReplayError> {
    read_from(bytes, limit)
}

fn decode_frame(index: usize, chunk: &[u8]) -> Result<Waypoint, ReplayError> {
    let corrupt = |what: &str| ReplayError::CorruptFormat(format!("frame {index}: {what}"));

    let frame = Waypoint {
        x: LittleEndian::read_f32(&chunk[0..4]),
        y: LittleEndian::read_f32(&chunk[4..8]),
        theta: LittleEndian::read_f32(&chunk[8..12]),
        timestamp: LittleEndian::read_u64(&chunk[12..20]),
        intake_power: chunk[20] as i8,
        outtake_power: chunk[21] as i8,
        buttons: ButtonSet::from_bits(chunk[22]),
        has_action: match chunk[23] {
            0 => false,
            1 => true,
            _ => return Err(corrupt("action flag is not a bool")),
        },
    };

    frame.check().map_err(corrupt)?;
    Ok(frame)
}

fn truncated(section: &'static str) -> impl Fn(io::Error) -> ReplayError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ReplayError::CorruptFormat(format!("truncated {section}"))
        } else {
            ReplayError::ReadFailed(e)
        }
    }
}

/// Persist the store's frames to `path`
///
/// The file is encoded in full before the storage commits it, so a failed
/// save never leaves a half-written recording behind. Returns the number of
/// bytes written.
pub fn save<S: Storage + ?Sized>(
    store: &FrameStore,
    storage: &mut S,
    path: &Path,
) -> Result<usize, ReplayError> {
    if !storage.is_available() {
        return Err(ReplayError::StorageUnavailable);
    }

    let bytes = encode(store.frames());
    storage
        .commit(path, &bytes)
        .map_err(ReplayError::WriteFailed)?;

    tracing::info!(
        path = %path.display(),
        frames = store.len(),
        bytes = bytes.len(),
        "saved recording"
    );
    Ok(bytes.len())
}

/// Read frames from `path`, rejecting files with more than `limit` frames
pub fn load<S: Storage + ?Sized>(
    storage: &S,
    path: &Path,
    limit: usize,
) -> Result<Vec<Waypoint>, ReplayError> {
    if !storage.is_available() {
        return Err(ReplayError::StorageUnavailable);
    }

    let reader = storage.open_read(path).map_err(ReplayError::ReadFailed)?;
    let frames = read_from(reader, limit)?;

    tracing::info!(path = %path.display(), frames = frames.len(), "loaded recording");
    Ok(frames)
}

/// Load `path` into `store`, replacing its contents only if the whole file is valid
pub fn load_into<S: Storage + ?Sized>(
    store: &mut FrameStore,
    storage: &S,
    path: &Path,
) -> Result<usize, ReplayError> {
    let frames = load(storage, path, store.capacity())?;
    let count = frames.len();
    store.replace_all(frames).map_err(|e| match e {
        StoreError::CapacityExceeded { capacity } => ReplayError::TooLarge {
            count: count as u32,
            limit: capacity as u32,
        },
        StoreError::OutOfOrder { index } => {
            ReplayError::CorruptFormat(format!("frame {index} goes back in time"))
        }
    })?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::Button;
    use crate::robot::MemoryStorage;

    fn sample_frames() -> Vec<Waypoint> {
        vec![
            Waypoint::default(),
            Waypoint {
                x: 5.0,
                y: -1.25,
                theta: 12.5,
                timestamp: 100_000,
                intake_power: 127,
                outtake_power: -127,
                buttons: ButtonSet::EMPTY.with(Button::Descore),
                has_action: true,
            },
            Waypoint {
                x: 5.0,
                y: 5.0,
                theta: 90.0,
                timestamp: 250_000,
                ..Waypoint::default()
            },
        ]
    }

    #[test]
    fn test_layout() {
        let frames = sample_frames();
        let bytes = encode(&frames);

        assert_eq!(bytes.len(), HEADER_SIZE + 3 * RECORD_SIZE + 4);
        assert_eq!(&bytes[0..4], &[0x52, 0x53, 0x4F, 0x50]);
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), FORMAT_VERSION);
        assert_eq!(LittleEndian::read_u32(&bytes[8..12]), 3);

        let second = &bytes[HEADER_SIZE + RECORD_SIZE..HEADER_SIZE + 2 * RECORD_SIZE];
        assert_eq!(LittleEndian::read_f32(&second[0..4]), 5.0);
        assert_eq!(LittleEndian::read_u64(&second[12..20]), 100_000);
        assert_eq!(second[20], 127);
        assert_eq!(second[21], 0x81);
        assert_eq!(second[22], 0b0010_0000);
        assert_eq!(second[23], 1);
    }

    #[test]
    fn test_decode_matches_encode() {
        let frames = sample_frames();
        let decoded = decode(&encode(&frames), 100).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_version_one_has_no_trailer() {
        let frames = sample_frames();
        let bytes = encode_as(&frames, 1);
        assert_eq!(bytes.len(), HEADER_SIZE + 3 * RECORD_SIZE);
        assert_eq!(decode(&bytes, 100).unwrap(), frames);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample_frames());
        bytes[0] ^= 0xFF;
        assert!(matches!(
            decode(&bytes, 100),
            Err(ReplayError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut bytes = encode(&sample_frames());
        LittleEndian::write_u32(&mut bytes[4..8], 7);
        assert!(matches!(
            decode(&bytes, 100),
            Err(ReplayError::VersionMismatch { found: 7, .. })
        ));
    }

    #[test]
    fn test_count_checked_before_body() {
        // Header only: a body read would hit EOF, TooLarge proves we never tried
        let mut bytes = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], MAGIC);
        LittleEndian::write_u32(&mut bytes[4..8], FORMAT_VERSION);
        LittleEndian::write_u32(&mut bytes[8..12], 10_000_000);

        assert!(matches!(
            decode(&bytes, usize::MAX),
            Err(ReplayError::TooLarge {
                count: 10_000_000,
                limit: MAX_FILE_FRAMES
            })
        ));
        assert!(matches!(
            decode(&encode(&sample_frames()), 2),
            Err(ReplayError::TooLarge { count: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = encode(&sample_frames());
        for cut in [3, HEADER_SIZE, HEADER_SIZE + RECORD_SIZE + 5, bytes.len() - 1] {
            assert!(
                matches!(decode(&bytes[..cut], 100), Err(ReplayError::CorruptFormat(_))),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_checksum_detects_flipped_bit() {
        let mut bytes = encode(&sample_frames());
        bytes[HEADER_SIZE + 2] ^= 0x01;
        let err = decode(&bytes, 100).unwrap_err();
        assert!(err.to_string().contains("checksum"), "{err}");
    }

    #[test]
    fn test_rejects_invalid_fields() {
        let mut frames = sample_frames();
        frames[1].intake_power = i8::MIN;
        assert!(decode(&encode_as(&frames, 1), 100).is_err());

        let mut bytes = encode_as(&sample_frames(), 1);
        bytes[HEADER_SIZE + 23] = 2;
        assert!(decode(&bytes, 100).is_err());

        let mut frames = sample_frames();
        frames[2].timestamp = 50_000;
        assert!(matches!(
            decode(&encode(&frames), 100),
            Err(ReplayError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_save_and_load_into() {
        let mut storage = MemoryStorage::new();
        let path = Path::new("rec.bin");
        let mut store = FrameStore::with_capacity(10);
        store.replace_all(sample_frames()).unwrap();

        let written = save(&store, &mut storage, path).unwrap();
        assert_eq!(written, HEADER_SIZE + 3 * RECORD_SIZE + 4);

        let mut loaded = FrameStore::with_capacity(10);
        assert_eq!(load_into(&mut loaded, &storage, path).unwrap(), 3);
        assert_eq!(loaded.frames(), store.frames());
    }

    #[test]
    fn test_failed_load_leaves_store_untouched() {
        let mut storage = MemoryStorage::new();
        let path = Path::new("rec.bin");
        let mut bytes = encode(&sample_frames());
        bytes[1] = 0;
        storage.insert(path, bytes);

        let mut store = FrameStore::with_capacity(10);
        store.append(Waypoint::default()).unwrap();
        let before = store.clone();

        assert!(load_into(&mut store, &storage, path).is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn test_storage_errors() {
        let mut storage = MemoryStorage::new();
        let path = Path::new("rec.bin");
        let store = FrameStore::default();

        assert!(matches!(
            load(&storage, path, 10),
            Err(ReplayError::ReadFailed(_))
        ));

        storage.set_fail_writes(true);
        assert!(matches!(
            save(&store, &mut storage, path),
            Err(ReplayError::WriteFailed(_))
        ));

        storage.set_available(false);
        assert!(matches!(
            save(&store, &mut storage, path),
            Err(ReplayError::StorageUnavailable)
        ));
        assert!(matches!(
            load(&storage, path, 10),
            Err(ReplayError::StorageUnavailable)
        ));
    }
}
