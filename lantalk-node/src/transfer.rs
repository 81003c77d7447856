//! File transfer engine. Sender side: FILE handshake, CHUNK streaming, END finalization.
//! Receiver side: write a finished reassembly buffer to disk and verify its hash.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lantalk_core::chunk::ReassemblyBuffer;
use lantalk_core::integrity::ContentHasher;
use lantalk_core::protocol::{REASON_HASH_MISMATCH, REASON_WRITE_FAILED};
use lantalk_core::{new_request_id, Finalize, Frame, Reply, Verdict};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

use crate::error::NodeError;
use crate::exchange::{request, resolve};
use crate::node::{NodeEvent, Shared};

/// Summary of a successful outgoing transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub transfer_id: String,
    pub bytes: u64,
    pub chunks: u32,
    pub hash: String,
}

pub(crate) async fn send_file(
    shared: &Shared,
    identity: &str,
    local_path: &Path,
) -> Result<TransferReport, NodeError> {
    let to = resolve(shared, identity).await?;
    let dest = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a file", local_path.display()),
            )
        })?;
    let mut file = File::open(local_path).await?;

    let _one_at_a_time = shared.transfer_lock.lock().await;
    let id = new_request_id();
    let path = local_path.to_string_lossy().into_owned();

    handshake(shared, to, &id, &path).await?;
    info!(peer = identity, %to, id = %id, path = %path, "transfer accepted; streaming");

    let mut hasher = ContentHasher::new();
    let mut block = vec![0u8; shared.config.chunk_size];
    let mut seq: u32 = 0;
    let mut bytes: u64 = 0;
    loop {
        let n = read_block(&mut file, &mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
        let chunk = Frame::Chunk {
            seq,
            payload: block[..n].to_vec(),
        };
        shared.send_frame(to, &chunk).await?;
        seq += 1;
        bytes += n as u64;
        tokio::task::yield_now().await;
    }

    let hash = hasher.finalize_hex();
    let end = Frame::End {
        id: id.clone(),
        hash: hash.clone(),
        dest,
    };
    match request(shared, to, &id, &end).await? {
        Reply::Ack { .. } => {
            info!(peer = identity, id = %id, bytes, chunks = seq, "transfer verified by receiver");
            Ok(TransferReport {
                transfer_id: id,
                bytes,
                chunks: seq,
                hash,
            })
        }
        Reply::Nack { reason, .. } if reason == REASON_HASH_MISMATCH => {
            warn!(peer = identity, id = %id, "receiver reported hash mismatch");
            Err(NodeError::HashMismatch)
        }
        Reply::Nack { reason, .. } => {
            warn!(peer = identity, id = %id, reason = %reason, "transfer rejected");
            Err(NodeError::Rejected(reason))
        }
    }
}

/// FILE request; the peer must echo the path back in its ACK.
async fn handshake(shared: &Shared, to: SocketAddr, id: &str, path: &str) -> Result<(), NodeError> {
    let frame = Frame::File {
        id: id.to_string(),
        path: path.to_string(),
    };
    match request(shared, to, id, &frame).await {
        Ok(Reply::Ack {
            path: Some(echoed), ..
        }) if echoed == path => Ok(()),
        Ok(Reply::Ack { path: echoed, .. }) => Err(NodeError::HandshakeFailed(format!(
            "peer acknowledged path {echoed:?}, expected {path:?}"
        ))),
        Ok(Reply::Nack { reason, .. }) => Err(NodeError::HandshakeFailed(reason)),
        Err(NodeError::NoAcknowledgment) => Err(NodeError::HandshakeFailed(
            "no acknowledgment to FILE request".to_string(),
        )),
        Err(e) => Err(e),
    }
}

/// Fill `block` unless the reader hits end of file first. Returns bytes read.
async fn read_block<R: AsyncRead + Unpin>(reader: &mut R, block: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        let n = reader.read(&mut block[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Where an inbound file named `dest` is stored. Only the last path component is used so a
/// peer cannot write outside the download directory.
pub fn destination(download_dir: &Path, dest: &str, id: &str) -> PathBuf {
    let name = Path::new(dest)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| format!("transfer-{id}").into());
    download_dir.join(name)
}

/// Write chunks in ascending sequence order to a private part file next to `path`, hash it,
/// then rename it over `path`. Transfers racing for the same name never interleave; the
/// last one to finish owns the name. The part file is removed on any error.
async fn store(path: &Path, buffer: ReassemblyBuffer, block_len: usize) -> io::Result<String> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir).await?;
    let (std_file, part) = tempfile::Builder::new()
        .prefix(".lantalk-")
        .suffix(".part")
        .tempfile_in(dir)?
        .into_parts();

    let mut file = File::from_std(std_file);
    for chunk in buffer.into_ordered() {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let hash = hash_file(&part, block_len).await?;
    part.persist(path).map_err(|e| e.error)?;
    Ok(hash)
}

/// SHA-256 of a file on disk, read in `block_len` blocks.
pub async fn hash_file(path: &Path, block_len: usize) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = ContentHasher::new();
    let mut block = vec![0u8; block_len.max(1)];
    loop {
        let n = file.read(&mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Receiver side of END: store the file, compare hashes, answer the sender.
pub(crate) async fn finalize(shared: Arc<Shared>, mut fin: Finalize) {
    let path = destination(&shared.config.download_dir, &fin.dest, &fin.id);
    let buffer = std::mem::take(&mut fin.buffer);
    let verdict = match store(&path, buffer, shared.config.chunk_size).await {
        Ok(actual) => {
            let verdict = fin.verdict_for_hash(&actual);
            let verified = verdict.is_accepted();
            if verified {
                info!(
                    from = %fin.peer,
                    requested = %fin.path,
                    path = %path.display(),
                    "file received"
                );
            } else {
                warn!(
                    from = %fin.peer,
                    requested = %fin.path,
                    path = %path.display(),
                    "file received but hash does not match"
                );
            }
            shared.emit(NodeEvent::FileReceived {
                from: fin.peer,
                path,
                verified,
            });
            verdict
        }
        Err(e) => {
            warn!(path = %path.display(), id = %fin.id, error = %e, "cannot store received file");
            shared.emit(NodeEvent::TransferFailed {
                from: fin.peer,
                id: fin.id.clone(),
                reason: REASON_WRITE_FAILED.to_string(),
            });
            Verdict::WriteFailed
        }
    };

    let reply = shared
        .core
        .lock()
        .await
        .finish_transfer(&fin.id, fin.peer, verdict);
    if let lantalk_core::Action::Send { to, frame } = reply {
        if let Err(e) = shared.send_frame(to, &frame).await {
            warn!(%to, id = %fin.id, error = %e, "cannot answer END");
        }
    }
}
