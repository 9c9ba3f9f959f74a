use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::ResourceLocation;

use super::cache_key::safe_path_segment;

const HEADER_LEN: usize = 128;
const MAGIC: &[u8; 8] = b"armoryc~";
const FORMAT_VERSION: u64 = 0;

const TAG_TYPED: u8 = 0;
const TAG_RAW: u8 = 1;

/// Validity duration encoding for records that never expire.
const VALID_FOREVER: u64 = u64::MAX;

/// Payload of a persisted resource.
///
/// `Raw` holds the verbatim response body for resources whose decoding
/// failed at store time: keeping the bytes around lets a later load retry
/// decoding without re-issuing the rate-limited network request.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    Typed(T),
    Raw(Vec<u8>),
}

/// A TTL-stamped resource as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskRecord<T> {
    pub last_updated: SystemTime,
    /// `None` means the record never expires.
    pub expires_at: Option<SystemTime>,
    /// Provider-assigned build number, informational only.
    pub build: u64,
    pub payload: Payload<T>,
}

/// Binary file store for one resource category.
///
/// Files live at `<root>/<region>/<version>/<category>/<name>` and consist
/// of a fixed 128-byte header followed by the serialized payload. Anything
/// unexpected on load, from a truncated file to a stale validity window, is
/// reported as a miss and never as an error.
pub struct DiskCache<T> {
    root: PathBuf,
    category: &'static str,
    lock: RwLock<()>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> DiskCache<T> {
    pub fn new(root: PathBuf, category: &'static str) -> Self {
        Self {
            root,
            category,
            lock: RwLock::new(()),
            _payload: PhantomData,
        }
    }

    fn entry_path(&self, location: &ResourceLocation, name: &str) -> PathBuf {
        self.root
            .join(safe_path_segment(&location.region_code))
            .join(location.version.dir_name())
            .join(self.category)
            .join(safe_path_segment(name))
    }
}

impl<T: DeserializeOwned> DiskCache<T> {
    /// Loads a record, or `None` on any kind of miss: absent, truncated or
    /// corrupt file, unknown format, or an elapsed validity window.
    pub fn load(&self, location: &ResourceLocation, name: &str) -> Option<DiskRecord<T>> {
        let path = self.entry_path(location, name);
        let _guard = self.lock.read().unwrap();

        match read_record(&path) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = &err as &dyn std::error::Error,
                    "failed to read cache file, treating as miss",
                );
                None
            }
        }
    }
}

impl<T: Serialize> DiskCache<T> {
    /// Persists a record, creating the destination directory on first write.
    pub fn save(
        &self,
        location: &ResourceLocation,
        name: &str,
        record: &DiskRecord<T>,
    ) -> io::Result<()> {
        let path = self.entry_path(location, name);
        let _guard = self.lock.write().unwrap();

        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other("cache path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;

        let mut header = [0u8; HEADER_LEN];
        header[..8].copy_from_slice(MAGIC);
        put_u64(&mut header, 8, FORMAT_VERSION);
        let last_updated = record
            .last_updated
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        put_u64(&mut header, 16, last_updated);
        let valid_for = match record.expires_at {
            Some(expires_at) => expires_at
                .duration_since(record.last_updated)
                .unwrap_or_default()
                .as_secs()
                .min(VALID_FOREVER - 1),
            None => VALID_FOREVER,
        };
        put_u64(&mut header, 24, valid_for);
        header[32] = match record.payload {
            Payload::Typed(_) => TAG_TYPED,
            Payload::Raw(_) => TAG_RAW,
        };
        put_u64(&mut header, 33, record.build);

        // Write to a sibling temp file and rename into place, so that a
        // concurrent process never observes a half-written record.
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(&header)?;
        match &record.payload {
            Payload::Typed(value) => {
                let body = rmp_serde::to_vec(value).map_err(io::Error::other)?;
                file.write_all(&body)?;
            }
            Payload::Raw(bytes) => file.write_all(bytes)?,
        }
        file.persist(&path).map_err(|err| err.error)?;

        Ok(())
    }
}

impl<T> DiskCache<T> {
    /// Drops the record for `name`, if any.
    pub fn remove(&self, location: &ResourceLocation, name: &str) -> io::Result<()> {
        let path = self.entry_path(location, name);
        let _guard = self.lock.write().unwrap();

        match std::fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

fn read_record<T: DeserializeOwned>(path: &Path) -> io::Result<Option<DiskRecord<T>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    if bytes.len() < HEADER_LEN {
        return Ok(None);
    }

    let header = &bytes[..HEADER_LEN];
    if &header[..8] != MAGIC {
        return Ok(None);
    }
    if get_u64(header, 8) > FORMAT_VERSION {
        return Ok(None);
    }

    let last_updated = SystemTime::UNIX_EPOCH + Duration::from_secs(get_u64(header, 16));
    let expires_at = match get_u64(header, 24) {
        VALID_FOREVER => None,
        valid_for => match last_updated.checked_add(Duration::from_secs(valid_for)) {
            Some(expires_at) => Some(expires_at),
            None => return Ok(None),
        },
    };
    if let Some(expires_at) = expires_at {
        if expires_at <= SystemTime::now() {
            return Ok(None);
        }
    }

    let payload_bytes = &bytes[HEADER_LEN..];
    let payload = match header[32] {
        TAG_TYPED => match rmp_serde::from_slice(payload_bytes) {
            Ok(value) => Payload::Typed(value),
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = &err as &dyn std::error::Error,
                    "stored payload does not decode, treating as miss",
                );
                return Ok(None);
            }
        },
        TAG_RAW => Payload::Raw(payload_bytes.to_vec()),
        _ => return Ok(None),
    };

    Ok(Some(DiskRecord {
        last_updated,
        expires_at,
        build: get_u64(header, 33),
        payload,
    }))
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn get_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}
