//! Byte transfer of a single resolved stream to a local file.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{
    blocking::Client,
    header::{HeaderMap, CONTENT_RANGE, RANGE},
    StatusCode,
};
use tracing::{debug, warn};

use crate::{error::TransferError, model::CancelFlag, model::StreamDescriptor};

/// Media hosts throttle open-ended requests, so streams are fetched in ranges of this size.
pub const DEFAULT_RANGE_SIZE: u64 = 9 * 1024 * 1024;

const BUFFER_SIZE: usize = 64 * 1024;

/// Moves the bytes of one stream into `target`.
///
/// `on_chunk` is called after every write with `(total_size, bytes_remaining)`,
/// and not at all while the size is unknown.
/// Implementations must not leave a file at `target` when they fail.
pub trait Transfer: Send + Sync {
    fn fetch(
        &self,
        stream: &StreamDescriptor,
        target: &Path,
        cancel: &CancelFlag,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, TransferError>;
}

/// Plain HTTP(S) transfer over a blocking `reqwest` client.
pub struct HttpTransfer {
    client: Client,
    range_size: u64,
}

impl HttpTransfer {
    pub fn new(connect_timeout: Duration) -> Result<Self, TransferError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            client,
            range_size: DEFAULT_RANGE_SIZE,
        })
    }

    fn fetch_into(
        &self,
        stream: &StreamDescriptor,
        part: &Path,
        cancel: &CancelFlag,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, TransferError> {
        let mut file = BufWriter::new(File::create(part)?);
        let mut buf = vec![0u8; BUFFER_SIZE];
        // size announced by the server; the resolver's figure may be an estimate
        let mut exact: Option<u64> = None;
        let mut done = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let end = done + self.range_size - 1;
            let mut request = self
                .client
                .get(&stream.url)
                .header(RANGE, format!("bytes={}-{}", done, end));
            for (name, value) in &stream.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let mut response = request.send()?;

            let status = response.status();
            if status == StatusCode::RANGE_NOT_SATISFIABLE {
                // previous range ended exactly on the last byte
                break;
            }
            if !status.is_success() {
                return Err(TransferError::Status(status.as_u16()));
            }

            // a plain 200 means the server ignored the range and sent everything
            let whole = status != StatusCode::PARTIAL_CONTENT;
            if let Some(total) = content_range_total(response.headers()) {
                exact = Some(total);
            } else if whole {
                exact = response.content_length();
            }
            let total = exact.or(stream.filesize).filter(|t| *t > 0);

            let mut got = 0u64;
            loop {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                let n = match response.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                file.write_all(&buf[..n])?;
                got += n as u64;
                done += n as u64;
                if let Some(total) = total {
                    on_chunk(total.max(done), total.saturating_sub(done));
                }
            }

            debug!(format_id = %stream.format_id, got, done, ?exact, "range finished");
            if whole || got == 0 {
                break;
            }
            // servers may answer a range with fewer bytes than asked for
            match exact {
                Some(total) if done >= total => break,
                Some(_) => {}
                None if got < self.range_size => break,
                None => {}
            }
        }

        if let Some(total) = exact {
            if done < total {
                return Err(TransferError::Incomplete { done, total });
            }
        }
        file.flush()?;
        Ok(done)
    }
}

impl Transfer for HttpTransfer {
    fn fetch(
        &self,
        stream: &StreamDescriptor,
        target: &Path,
        cancel: &CancelFlag,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, TransferError> {
        let part = part_path(target);
        let result = self
            .fetch_into(stream, &part, cancel, on_chunk)
            .and_then(|written| {
                fs::rename(&part, target)?;
                Ok(written)
            });

        if result.is_err() {
            discard(&part);
        }
        result
    }
}

/// `<target>.part`, where bytes accumulate until the transfer completes.
pub fn part_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
}

/// Total size announced by a `Content-Range: bytes a-b/total` header.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    value.rsplit_once('/')?.1.trim().parse().ok()
}
