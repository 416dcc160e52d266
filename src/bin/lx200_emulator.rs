//! LX200 device emulator served over TCP
//!
//! Each accepted connection gets its own emulated mount, so `lx200r
//! --address 127.0.0.1:4030` can be run end to end without hardware.
//!
//! Usage: lx200_emulator [address]   (default 127.0.0.1:4030)

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lx200r::Lx200Emulator;

const DEFAULT_ADDRESS: &str = "127.0.0.1:4030";

async fn serve_connection(mut socket: TcpStream, peer: std::net::SocketAddr) -> anyhow::Result<()> {
    let mut device = Lx200Emulator::new();
    let mut buffer = [0u8; 256];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            log::info!("{peer} disconnected after {} commands", device.commands().len());
            return Ok(());
        }

        let reply = device.feed(&buffer[..n]);
        if !reply.is_empty() {
            socket.write_all(&reply).await?;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let address = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    log::info!("LX200 emulator listening on {}", listener.local_addr()?);

    loop {
        let (socket, peer) = listener.accept().await?;
        log::info!("Connection from {peer}");
        if let Err(e) = socket.set_nodelay(true) {
            log::debug!("set_nodelay failed for {peer}: {e}");
        }

        tokio::spawn(async move {
            if let Err(e) = serve_connection(socket, peer).await {
                log::warn!("{peer}: {e}");
            }
        });
    }
}
