//! The virtual-HID bridge process: the concrete Linux realization of the
//! virtual HID collaborator as an external endpoint. Listens on the same
//! datagram-with-stream-fallback sockets `remap-hid-transport::ConnectionPool`
//! dials, decodes each payload back into a `remap_core::post_processor::Frame`,
//! and applies it to a `uinput` device via `remap-virtual-device`.

use std::sync::Arc;

use anyhow::{Context, Result};
use remap_core::post_processor::{Frame, TimedFrame};
use remap_core::EventTimeStamp;
use remap_virtual_device::VirtualHidDevice;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixDatagram, UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::settings::DaemonSettings;

pub async fn run(settings: &DaemonSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.socket_dir)
        .with_context(|| format!("creating socket directory {}", settings.socket_dir.display()))?;
    let datagram_path = settings.datagram_path();
    let stream_path = settings.stream_path();
    let _ = std::fs::remove_file(&datagram_path);
    let _ = std::fs::remove_file(&stream_path);

    let datagram = UnixDatagram::bind(&datagram_path).with_context(|| format!("binding datagram socket {}", datagram_path.display()))?;
    let listener = UnixListener::bind(&stream_path).with_context(|| format!("binding stream socket {}", stream_path.display()))?;

    let device = Arc::new(Mutex::new(
        VirtualHidDevice::new(&settings.device_name).context("creating uinput virtual device")?,
    ));

    info!(
        datagram = %datagram_path.display(),
        stream = %stream_path.display(),
        "virtual-HID bridge listening",
    );

    let mut datagram_buf = [0u8; 4096];
    loop {
        tokio::select! {
            received = datagram.recv(&mut datagram_buf) => {
                match received {
                    Ok(count) => apply_frame(&device, &datagram_buf[..count]).await,
                    Err(error) => warn!(%error, "datagram recv failed"),
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let device = Arc::clone(&device);
                        tokio::spawn(async move {
                            if let Err(error) = serve_stream(stream, device).await {
                                warn!(%error, "stream connection ended");
                            }
                        });
                    }
                    Err(error) => warn!(%error, "stream accept failed"),
                }
            }
        }
    }
}

async fn serve_stream(mut stream: UnixStream, device: Arc<Mutex<VirtualHidDevice>>) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.context("reading frame payload")?;
        apply_frame(&device, &payload).await;
    }
}

async fn apply_frame(device: &Arc<Mutex<VirtualHidDevice>>, bytes: &[u8]) {
    let Some(frame) = Frame::decode(bytes) else {
        warn!(len = bytes.len(), "dropping undecodable frame");
        return;
    };
    let timed_frame = TimedFrame {
        time: EventTimeStamp::ZERO,
        frame,
    };
    let mut device = device.lock().await;
    if let Err(error) = device.apply(&timed_frame) {
        warn!(%error, "failed to apply frame to virtual device");
    }
}
