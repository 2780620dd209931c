//! On-disk encoding for one `snapshot.bin` file:
//!
//! ```text
//! magic:    4 bytes   b"SNP1"
//! version:  u32 LE
//! meta_len: u32 LE
//! meta:     meta_len bytes, JSON
//! crc32:    u32 LE    (of `data`)
//! data_len: u64 LE
//! data:     data_len bytes, JSON
//! ```
//!
//! `read_meta` only ever needs the first three fields plus `meta`; it never touches
//! `data`, which may be arbitrarily large.

use std::io::Cursor;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use snapshot_core::error::ErrorSubject;
use snapshot_core::error::ErrorVerb;
use snapshot_core::error::MetaError;
use snapshot_core::error::Result;
use snapshot_core::error::StorageIOError;
use snapshot_core::Meta;

pub const MAGIC: &[u8; 4] = b"SNP1";
pub const FORMAT_VERSION: u32 = 1;

pub const FILE_NAME: &str = "snapshot.bin";

/// Just enough of the file to satisfy `read_meta`: magic, version, and the `Meta` value.
pub struct Header {
    pub meta: Meta,
}

/// The full file content, parsed.
pub struct Envelope {
    pub meta: Meta,
    pub crc: u32,
    pub data: serde_json::Value,
}

pub fn encode(meta: &Meta, data: &serde_json::Value) -> std::result::Result<Vec<u8>, serde_json::Error> {
    let meta_json = serde_json::to_vec(meta)?;
    let data_json = serde_json::to_vec(data)?;
    let crc = crc32fast::hash(&data_json);

    let mut out = Vec::with_capacity(4 + 4 + 4 + meta_json.len() + 4 + 8 + data_json.len());
    out.extend_from_slice(MAGIC);
    out.write_u32::<LittleEndian>(FORMAT_VERSION).expect("write to Vec cannot fail");
    out.write_u32::<LittleEndian>(meta_json.len() as u32).expect("write to Vec cannot fail");
    out.extend_from_slice(&meta_json);
    out.write_u32::<LittleEndian>(crc).expect("write to Vec cannot fail");
    out.write_u64::<LittleEndian>(data_json.len() as u64).expect("write to Vec cannot fail");
    out.extend_from_slice(&data_json);
    Ok(out)
}

/// Parse only the header: magic, version, and `Meta`. Cheap even against a large file
/// because it never looks past the end of the `meta` field.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    let mut cur = Cursor::new(bytes);
    check_magic_and_version(&mut cur)?;

    let meta_len = read_u32(&mut cur)? as usize;
    let meta_bytes = read_slice(&mut cur, meta_len)?;
    let meta: Meta = serde_json::from_slice(meta_bytes).map_err(|e| MetaError::Io(io_err(e)))?;

    Ok(Header { meta })
}

/// Parse the full envelope, verifying the data checksum.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    let mut cur = Cursor::new(bytes);
    check_magic_and_version(&mut cur)?;

    let meta_len = read_u32(&mut cur)? as usize;
    let meta_bytes = read_slice(&mut cur, meta_len)?;
    let meta: Meta = serde_json::from_slice(meta_bytes).map_err(|e| MetaError::Io(io_err(e)))?;

    let crc = read_u32(&mut cur)?;
    let data_len = read_u64(&mut cur)? as usize;
    let data_bytes = read_slice(&mut cur, data_len)?;

    if crc32fast::hash(data_bytes) != crc {
        return Err(MetaError::ChecksumError.into());
    }

    let data: serde_json::Value = serde_json::from_slice(data_bytes).map_err(|e| MetaError::Io(io_err(e)))?;

    Ok(Envelope { meta, crc, data })
}

fn check_magic_and_version(cur: &mut Cursor<&[u8]>) -> Result<()> {
    let magic = read_slice(cur, 4)?;
    if magic != MAGIC {
        return Err(MetaError::InvalidFormat.into());
    }
    let version = read_u32(cur)?;
    if version != FORMAT_VERSION {
        return Err(MetaError::InvalidVersion(version).into());
    }
    Ok(())
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32> {
    cur.read_u32::<LittleEndian>().map_err(|_| MetaError::InvalidFormat.into())
}

fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64> {
    cur.read_u64::<LittleEndian>().map_err(|_| MetaError::InvalidFormat.into())
}

fn read_slice<'a>(cur: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8]> {
    let start = cur.position() as usize;
    let end = start.checked_add(len).ok_or(MetaError::InvalidFormat)?;
    let bytes = *cur.get_ref();
    if end > bytes.len() {
        return Err(MetaError::InvalidFormat.into());
    }
    cur.set_position(end as u64);
    Ok(&bytes[start..end])
}

fn io_err(e: serde_json::Error) -> StorageIOError {
    StorageIOError::new(ErrorSubject::SnapshotMeta, ErrorVerb::Read, anyerror::AnyError::new(&e))
}
