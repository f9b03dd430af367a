use tracing::warn;

use crate::error::{Error, Result};

/// 'BDFF' magic, written little-endian (`46 46 44 42` on disk).
pub const PATCH_MAGIC: u32 = 0x4244_4646;
pub const FORMAT_VERSION: u32 = 1;

/// Fixed-size portion of one serialized operation: tag + offset + length.
const OP_RECORD_SIZE: usize = 1 + 8 + 8;

/// Operation kind, serialized as a one-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    Copy = 0x01,
    Insert = 0x02,
    Replace = 0x03,
    Match = 0x04,
    Delete = 0x05,
}

impl OpKind {
    pub fn from_tag(tag: u8) -> Option<OpKind> {
        match tag {
            0x01 => Some(OpKind::Copy),
            0x02 => Some(OpKind::Insert),
            0x03 => Some(OpKind::Replace),
            0x04 => Some(OpKind::Match),
            0x05 => Some(OpKind::Delete),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Insert and Replace carry their payload inline; the other kinds only
    /// reference the source buffer.
    pub fn carries_data(self) -> bool {
        matches!(self, OpKind::Insert | OpKind::Replace)
    }
}

/// One edit in the patch stream.
///
/// `offset` is the position in the reconstruction stream at which the
/// operation begins; the applier uses it to synchronize its read cursor into
/// the source buffer. `data` is non-empty iff the kind carries data, and then
/// `data.len() == length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOp {
    pub kind: OpKind,
    pub offset: i64,
    pub length: i64,
    pub data: Vec<u8>,
}

impl PatchOp {
    pub fn copy(offset: i64, length: i64) -> Self {
        Self {
            kind: OpKind::Copy,
            offset,
            length,
            data: Vec::new(),
        }
    }

    pub fn insert(offset: i64, data: Vec<u8>) -> Self {
        Self {
            kind: OpKind::Insert,
            offset,
            length: data.len() as i64,
            data,
        }
    }

    pub fn replace(offset: i64, data: Vec<u8>) -> Self {
        Self {
            kind: OpKind::Replace,
            offset,
            length: data.len() as i64,
            data,
        }
    }

    pub fn delete(offset: i64, length: i64) -> Self {
        Self {
            kind: OpKind::Delete,
            offset,
            length,
            data: Vec::new(),
        }
    }

    /// Bytes this operation contributes to the reconstructed output.
    pub fn output_len(&self) -> i64 {
        match self.kind {
            OpKind::Copy | OpKind::Match | OpKind::Insert | OpKind::Replace => self.length,
            OpKind::Delete => 0,
        }
    }
}

/// The decoded patch container.
///
/// Wire layout (all scalars little-endian):
///
/// ```text
/// magic        u32      0x42444646 ('BDFF')
/// version      u32      1
/// old_name_len u32
/// old_name     bytes
/// new_name_len u32
/// new_name     bytes
/// old_size     u32
/// new_size     u32
/// old_hash     32 bytes SHA-256 of the source
/// new_hash     32 bytes SHA-256 of the target
/// offset       i32      aligner shift estimate
/// diff_len     u32
/// diff_data    bytes    concatenated operations
/// ```
///
/// Operation encoding: `kind:u8 | offset:i64 | length:i64 | data?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFile {
    pub old_name: Vec<u8>,
    pub new_name: Vec<u8>,
    pub old_size: u32,
    pub new_size: u32,
    pub old_hash: [u8; 32],
    pub new_hash: [u8; 32],
    /// Shift estimate from the aligner; 0 when FFT alignment was disabled.
    pub offset: i32,
    pub ops: Vec<PatchOp>,
}

/// Serialize the operation stream.
pub fn encode_ops(ops: &[PatchOp]) -> Vec<u8> {
    let payload: usize = ops.iter().map(|op| op.data.len()).sum();
    let mut out = Vec::with_capacity(ops.len() * OP_RECORD_SIZE + payload);
    for op in ops {
        out.push(op.kind.tag());
        out.extend_from_slice(&op.offset.to_le_bytes());
        out.extend_from_slice(&op.length.to_le_bytes());
        if op.kind.carries_data() {
            out.extend_from_slice(&op.data);
        }
    }
    out
}

/// Deserialize an operation stream. Records with an unrecognized tag are
/// skipped with a warning; a stream that ends mid-record is rejected.
pub fn decode_ops(data: &[u8]) -> Result<Vec<PatchOp>> {
    let mut reader = Reader::new(data);
    let mut ops = Vec::new();

    while !reader.is_empty() {
        let tag = reader.read_u8()?;
        let offset = reader.read_i64()?;
        let length = reader.read_i64()?;

        let Some(kind) = OpKind::from_tag(tag) else {
            warn!(tag, "skipping operation with unrecognized kind");
            continue;
        };

        let data = if kind.carries_data() {
            if length < 0 {
                return Err(Error::BadPatch(format!(
                    "operation data length is negative: {length}"
                )));
            }
            reader.read_bytes(length as usize)?.to_vec()
        } else {
            Vec::new()
        };

        ops.push(PatchOp {
            kind,
            offset,
            length,
            data,
        });
    }

    Ok(ops)
}

/// Serialize the full container. `diff_len` is recomputed from the encoded
/// operation stream, never trusted from the caller.
pub fn encode(patch: &PatchFile) -> Vec<u8> {
    let diff_data = encode_ops(&patch.ops);

    let mut out = Vec::with_capacity(
        4 + 4 + 4 + patch.old_name.len() + 4 + patch.new_name.len() + 4 + 4 + 32 + 32 + 4 + 4
            + diff_data.len(),
    );
    out.extend_from_slice(&PATCH_MAGIC.to_le_bytes());
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(patch.old_name.len() as u32).to_le_bytes());
    out.extend_from_slice(&patch.old_name);
    out.extend_from_slice(&(patch.new_name.len() as u32).to_le_bytes());
    out.extend_from_slice(&patch.new_name);
    out.extend_from_slice(&patch.old_size.to_le_bytes());
    out.extend_from_slice(&patch.new_size.to_le_bytes());
    out.extend_from_slice(&patch.old_hash);
    out.extend_from_slice(&patch.new_hash);
    out.extend_from_slice(&patch.offset.to_le_bytes());
    out.extend_from_slice(&(diff_data.len() as u32).to_le_bytes());
    out.extend_from_slice(&diff_data);
    out
}

/// Deserialize a container. Magic and version are checked before anything
/// else is read.
pub fn decode(data: &[u8]) -> Result<PatchFile> {
    let mut reader = Reader::new(data);

    let magic = reader.read_u32()?;
    if magic != PATCH_MAGIC {
        return Err(Error::BadPatch(format!(
            "bad magic 0x{magic:08x}, expected 0x{PATCH_MAGIC:08x}"
        )));
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(Error::BadPatch(format!(
            "unsupported version {version}, expected {FORMAT_VERSION}"
        )));
    }

    let old_name_len = reader.read_u32()? as usize;
    let old_name = reader.read_bytes(old_name_len)?.to_vec();
    let new_name_len = reader.read_u32()? as usize;
    let new_name = reader.read_bytes(new_name_len)?.to_vec();

    let old_size = reader.read_u32()?;
    let new_size = reader.read_u32()?;

    let mut old_hash = [0u8; 32];
    old_hash.copy_from_slice(reader.read_bytes(32)?);
    let mut new_hash = [0u8; 32];
    new_hash.copy_from_slice(reader.read_bytes(32)?);

    let offset = reader.read_i32()?;

    let diff_len = reader.read_u32()? as usize;
    let diff_data = reader.read_bytes(diff_len)?;
    let ops = decode_ops(diff_data)?;

    Ok(PatchFile {
        old_name,
        new_name,
        old_size,
        new_size,
        old_hash,
        new_hash,
        offset,
        ops,
    })
}

/// Bounds-checked little-endian reader over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(Error::BadPatch(format!(
                "truncated stream: need {len} bytes at position {}, only {remaining} remain",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(buf))
    }
}
