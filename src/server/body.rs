use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem::replace;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use super::response::Cleanup;


enum Storage {
    /// Buffered in memory, never grows past `RequestBody::memory_limit`
    Memory(Vec<u8>),
    /// Spilled to a temporary file, never goes back to memory
    Disk(NamedTempFile),
    /// The cleanup action has been taken out
    Released,
}

/// Entity body of a single request
///
/// Bytes are kept in memory until the next append would overflow the
/// in-memory region, after that everything (including the bytes buffered
/// so far) lives in a temporary file in `temp_dir`.
pub struct RequestBody {
    storage: Storage,
    memory_limit: usize,
    received: u64,
    declared: Option<u64>,
    temp_dir: PathBuf,
    done: bool,
}

/// A readable view of a finalized body
pub enum BodyReader<'a> {
    Memory(&'a [u8]),
    File(&'a mut File),
}

impl RequestBody {
    pub fn new(memory_limit: usize, temp_dir: PathBuf) -> RequestBody {
        RequestBody {
            storage: Storage::Memory(Vec::with_capacity(memory_limit)),
            memory_limit: memory_limit,
            received: 0,
            declared: None,
            temp_dir: temp_dir,
            done: false,
        }
    }
    /// Sets the ceiling taken from `Content-Length`
    pub fn set_declared(&mut self, length: u64) {
        self.declared = Some(length);
    }
    /// Total number of bytes appended, regardless of storage
    pub fn received(&self) -> u64 {
        self.received
    }
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.received += data.len() as u64;
        let spill = match self.storage {
            Storage::Memory(ref mut buf) => {
                if buf.len() + data.len() <= self.memory_limit {
                    buf.extend_from_slice(data);
                    return Ok(());
                }
                replace(buf, Vec::new())
            }
            Storage::Disk(ref mut file) => return file.write_all(data),
            Storage::Released => {
                return Err(io::Error::new(io::ErrorKind::Other,
                    "request body is already released"));
            }
        };
        let mut file = Builder::new()
            .prefix("body-")
            .suffix(".tmp")
            .tempfile_in(&self.temp_dir)?;
        debug!("Spilling request body of {} bytes to {:?}",
            self.received, file.path());
        file.write_all(&spill)?;
        file.write_all(data)?;
        self.storage = Storage::Disk(file);
        Ok(())
    }
    /// The declared number of bytes has arrived
    pub fn should_finish(&self) -> bool {
        self.declared.map_or(false, |d| self.received >= d)
    }
    /// More bytes than declared have arrived
    pub fn is_over_limit(&self) -> bool {
        self.declared.map_or(false, |d| self.received > d)
    }
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::Disk(_))
    }
    pub fn temp_path(&self) -> Option<&Path> {
        match self.storage {
            Storage::Disk(ref file) => Some(file.path()),
            _ => None,
        }
    }
    /// Marks the body done and rewinds it for reading
    pub fn finalize(&mut self) -> io::Result<()> {
        if let Storage::Disk(ref mut file) = self.storage {
            file.flush()?;
            file.seek(SeekFrom::Start(0))?;
        }
        self.done = true;
        Ok(())
    }
    /// Returns a reader positioned at the start of the body
    ///
    /// Only available after `finalize()` and before `cleanup()`. The file
    /// reader shares its position with the body, so read it once.
    pub fn reader(&mut self) -> Option<BodyReader<'_>> {
        if !self.done {
            return None;
        }
        match self.storage {
            Storage::Memory(ref buf) => Some(BodyReader::Memory(&buf[..])),
            Storage::Disk(ref mut file) => {
                Some(BodyReader::File(file.as_file_mut()))
            }
            Storage::Released => None,
        }
    }
    /// Takes the resource-release action out of the body
    ///
    /// The returned action closes and deletes the temporary file, if any.
    /// The body is unreadable afterwards.
    pub fn cleanup(&mut self) -> Cleanup {
        match replace(&mut self.storage, Storage::Released) {
            Storage::Disk(file) => Box::new(move || {
                let path = file.path().to_path_buf();
                match file.close() {
                    Ok(()) => debug!("Removed temporary file {:?}", path),
                    Err(e) => {
                        warn!("Can't remove temporary file {:?}: {}", path, e);
                    }
                }
            }),
            Storage::Memory(_) | Storage::Released => Box::new(|| {}),
        }
    }
}

impl<'a> Read for BodyReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            BodyReader::Memory(ref mut data) => data.read(buf),
            BodyReader::File(ref mut file) => file.read(buf),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = match self.storage {
            Storage::Memory(_) => "memory",
            Storage::Disk(_) => "disk",
            Storage::Released => "released",
        };
        f.debug_struct("RequestBody")
            .field("storage", &mode)
            .field("received", &self.received)
            .field("declared", &self.declared)
            .field("done", &self.done)
            .finish()
    }
}
