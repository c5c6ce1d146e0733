use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rkyv::Deserialize;
use tracing::{error, warn};

use crate::model::StoredRecord;

// Largest frame body either written or replayed.
pub const MAX_FRAME_BYTES: u32 = 1 << 30;

/// Append-only log of stored records.
///
/// Frame format: `[Length (4b LE)][rkyv archive (N bytes)]`.
#[derive(Debug)]
pub struct Segment {
    pub file_path: PathBuf,
    file: File,
    current_offset: u64,
    strict: bool,
    max_frame: u32,
}

impl Segment {
    pub fn new(path: &Path, strict: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;

        let metadata = file.metadata()?;
        let current_offset = metadata.len();

        Ok(Self {
            file_path: path.to_path_buf(),
            file,
            current_offset,
            strict,
            max_frame: MAX_FRAME_BYTES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_frame_limit(mut self, max_frame: u32) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Writes one frame. On failure the file is cut back to where it was.
    pub fn append(&mut self, record: &StoredRecord) -> io::Result<()> {
        let bytes = rkyv::to_bytes::<_, 4096>(record)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let len = frame_len(bytes.len(), self.max_frame)?;
        let start = self.current_offset;

        // One write per frame so a crash leaves at most a truncated tail.
        let mut frame = Vec::with_capacity(4 + bytes.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&bytes);

        if let Err(e) = self.write_at(start, &frame) {
            self.rollback(start)?;
            return Err(e);
        }

        self.current_offset += frame.len() as u64;
        Ok(())
    }

    /// Appends every record or none of them.
    pub fn append_batch<'a, I>(&mut self, records: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a StoredRecord>,
    {
        let mark = self.current_offset;
        for record in records {
            if let Err(e) = self.append(record) {
                error!("Batch append to {} failed: {}; rolling back to offset {}", self.file_path.display(), e, mark);
                self.rollback(mark)?;
                return Err(e);
            }
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u64, frame: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(frame)?;
        if self.strict {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn rollback(&mut self, offset: u64) -> io::Result<()> {
        self.file.set_len(offset)?;
        self.current_offset = offset;
        Ok(())
    }

    /// Reads every complete frame from the start of the file.
    ///
    /// A truncated or unreadable tail is dropped and the write offset moves back
    /// to the end of the last good frame.
    pub fn replay(&mut self) -> io::Result<Vec<StoredRecord>> {
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut good_offset = 0u64;

        while good_offset < self.current_offset {
            match read_frame(&mut reader, self.max_frame) {
                Ok(record) => {
                    good_offset = reader.stream_position()?;
                    records.push(record);
                }
                Err(e) => {
                    warn!(
                        "Segment {} has a bad frame at offset {} ({}); truncating {} bytes",
                        self.file_path.display(),
                        good_offset,
                        e,
                        self.current_offset - good_offset
                    );
                    self.rollback(good_offset)?;
                    break;
                }
            }
        }

        Ok(records)
    }
}

fn frame_len(body_len: usize, max_frame: u32) -> io::Result<u32> {
    match u32::try_from(body_len) {
        Ok(len) if len <= max_frame => Ok(len),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("record of {} bytes exceeds the {} byte frame limit", body_len, max_frame),
        )),
    }
}

fn read_frame<R: Read>(reader: &mut R, max_frame: u32) -> io::Result<StoredRecord> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);
    if len > max_frame {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("frame length {} out of range", len)));
    }

    let mut raw = vec![0u8; len as usize];
    reader.read_exact(&mut raw)?;

    let mut aligned = rkyv::AlignedVec::with_capacity(raw.len());
    aligned.extend_from_slice(&raw);

    let archived = rkyv::check_archived_root::<StoredRecord>(&aligned)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let record: StoredRecord = archived
    .deserialize(&mut rkyv::Infallible)
    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record deserialization failed"))?;

    Ok(record)
}
