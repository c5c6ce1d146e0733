use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::coordinate::{Coordinate, COORDINATE_BYTES};
use crate::AddressService;

// --- OpCodes ---
pub const OP_ENCODE: u8 = 0x01;
pub const OP_DECODE: u8 = 0x02;
pub const OP_HAS: u8    = 0x03;
pub const OP_META: u8   = 0x04;
pub const OP_SIZE: u8   = 0x05;

pub const FOUND: u8     = 1;
pub const MISSING: u8   = 0;

pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Serves one shared `AddressService` over `[op u8][len u32 LE][body]` frames.
pub struct TetradServer {
    service: Arc<AddressService>,
    max_frame: usize,
}

impl TetradServer {
    pub fn new(service: Arc<AddressService>, max_frame: usize) -> Self {
        Self { service, max_frame }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Tetrad listening on {}", addr);
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let service = self.service.clone();
                    let max_frame = self.max_frame;
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(socket, service, max_frame).await {
                            // Ignore expected disconnections to keep logs clean
                            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                                warn!("Client {} error: {}", peer, e);
                            }
                        }
                    });
                }
                Err(e) => error!("Connection failed: {}", e),
            }
        }
    }
}

async fn handle_client(mut stream: TcpStream, service: Arc<AddressService>, max_frame: usize) -> std::io::Result<()> {
    let (mut reader, writer) = stream.split();
    let mut writer = BufWriter::new(writer);

    while let Some((op_code, body)) = read_frame(&mut reader, max_frame).await? {
        match op_code {
            OP_ENCODE => handle_encode(&mut writer, body, &service).await?,
            OP_DECODE => handle_decode(&mut writer, &body, &service).await?,
            OP_HAS    => handle_has(&mut writer, &body, &service).await?,
            OP_META   => handle_meta(&mut writer, &body, &service).await?,
            OP_SIZE   => handle_size(&mut writer).await?,
            _ => {
                warn!("Unknown OpCode: 0x{:02X}", op_code);
                return Ok(());
            }
        }
        writer.flush().await?;
    }
    Ok(())
}

/// `None` on a clean disconnect or an oversized frame.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_frame: usize) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    // 1. Read OpCode
    let mut op_buf = [0u8; 1];
    if reader.read_exact(&mut op_buf).await.is_err() {
        return Ok(None);
    }

    // 2. Read Length
    let mut len_buf = [0u8; 4];
    if reader.read_exact(&mut len_buf).await.is_err() {
        return Ok(None);
    }
    let length = u32::from_le_bytes(len_buf) as usize;

    // 3. Read Body
    if length > max_frame {
        warn!("Payload too large: {} bytes (Max {})", length, max_frame);
        return Ok(None);
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    Ok(Some((op_buf[0], body)))
}

fn parse_coordinate(body: &[u8]) -> Option<Coordinate> {
    if body.len() != COORDINATE_BYTES {
        return None;
    }
    Coordinate::from_bytes(body).ok()
}

async fn write_blob<W: AsyncWrite + Unpin>(writer: &mut W, blob: &[u8]) -> std::io::Result<()> {
    writer.write_all(&[FOUND]).await?;
    let len = u32::try_from(blob.len())
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "reply too large"))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(blob).await
}

async fn handle_encode<W: AsyncWrite + Unpin>(writer: &mut W, payload: Vec<u8>, service: &Arc<AddressService>) -> std::io::Result<()> {
    // Hashing is CPU-bound; keep it off the reactor.
    let service = service.clone();
    let res = tokio::task::spawn_blocking(move || service.encode(&payload)).await;

    match res {
        Ok(Ok(coordinate)) => {
            writer.write_all(&[FOUND]).await?;
            writer.write_all(&coordinate.to_bytes()).await?;
        }
        Ok(Err(e)) => {
            error!("Encode failed: {}", e);
            writer.write_all(&[MISSING]).await?;
        }
        Err(e) => {
            error!("Encode task error: {}", e);
            writer.write_all(&[MISSING]).await?;
        }
    }
    Ok(())
}

async fn handle_decode<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8], service: &Arc<AddressService>) -> std::io::Result<()> {
    match parse_coordinate(body).map(|c| service.decode(&c)) {
        Some(Ok(payload)) => write_blob(writer, &payload).await,
        _ => writer.write_all(&[MISSING]).await,
    }
}

async fn handle_has<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8], service: &Arc<AddressService>) -> std::io::Result<()> {
    let found = parse_coordinate(body).map_or(false, |c| service.has_coordinate(&c));
    writer.write_all(&[if found { FOUND } else { MISSING }]).await
}

async fn handle_meta<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8], service: &Arc<AddressService>) -> std::io::Result<()> {
    match parse_coordinate(body).and_then(|c| service.get_metadata(&c)) {
        Some(meta) => {
            let json = serde_json::to_vec(&meta)?;
            write_blob(writer, &json).await
        }
        None => writer.write_all(&[MISSING]).await,
    }
}

async fn handle_size<W: AsyncWrite + Unpin>(writer: &mut W) -> std::io::Result<()> {
    let size = AddressService::coordinate_size();
    writer.write_all(&(size.bits as u32).to_le_bytes()).await?;
    writer.write_all(&(size.bytes as u32).to_le_bytes()).await
}
