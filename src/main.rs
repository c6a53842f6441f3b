mod cli;
mod preview;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use tello_video::decoder::DecoderFacade;
use tello_video::frame::{make_default_test_frame, DecodedFrame};
use tello_video::network::receiver_task;
use tello_video::pipeline::decode_loop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();
    let config = args
        .decoder_config()
        .context("failed to load decoder configuration")?;
    let preview = !args.headless && cfg!(feature = "vision");

    if args.test_frame {
        let frame = make_default_test_frame();
        info!(
            "Synthetic frame {}x{} (stride {})",
            frame.width(),
            frame.height(),
            frame.stride()
        );
        if preview {
            preview::show_until_key(&frame)?;
        }
        return Ok(());
    }

    let socket = UdpSocket::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind video socket on {}", args.bind))?;
    info!("Socket bound to {}", socket.local_addr()?);

    let (tx_packets, rx_packets) = mpsc::channel::<Vec<u8>>(256);
    let (tx_frames, mut rx_frames) = mpsc::channel::<DecodedFrame>(4);

    let receiver_handle = tokio::spawn(receiver_task(Arc::new(socket), tx_packets));
    // The facade lives and dies on the decode thread; the subprocess backend
    // owns a runtime that must not be dropped from async context.
    let decode_handle =
        std::thread::spawn(move || decode_loop(DecoderFacade::new(&config), rx_packets, tx_frames));

    if preview {
        preview::run(&mut rx_frames).await?;
    } else {
        log_loop(&mut rx_frames).await;
    }

    info!("Exiting main loop...");
    // Dropping the socket task closes the packet channel, which ends the decode thread.
    receiver_handle.abort();
    drop(rx_frames);
    let stats = tokio::task::spawn_blocking(move || decode_handle.join())
        .await?
        .map_err(|_| anyhow::anyhow!("decode thread panicked"))?;
    info!("Application finished after {} decoded frames.", stats.frames);
    Ok(())
}

pub(crate) async fn log_loop(rx_frames: &mut mpsc::Receiver<DecodedFrame>) {
    let mut count: u64 = 0;
    loop {
        tokio::select! {
            frame = rx_frames.recv() => match frame {
                Some(frame) => {
                    count += 1;
                    if count % 30 == 1 {
                        info!("Frame {}: {}x{}", count, frame.width(), frame.height());
                    }
                }
                None => {
                    warn!("Decode thread closed the frame channel.");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}
