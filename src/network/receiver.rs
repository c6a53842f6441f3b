use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time;

use super::MAX_DATAGRAM;

/// Counters kept by [`receiver_task`], returned when it exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStats {
    pub packets: u64,
    pub bytes: u64,
    /// Datagrams dropped because the decode side was behind.
    pub dropped: u64,
}

/// Asynchronous task that forwards raw video datagrams to the decode thread.
///
/// Payloads are passed on untouched: reassembly is the decoder's job. When the
/// channel is full the datagram is dropped rather than stalling the socket,
/// since a lost packet only costs a frame.
///
/// # Arguments
///
/// * `socket` - An `Arc`-wrapped `UdpSocket` bound to the video port.
/// * `tx_packets` - Bounded channel to the thread that owns the decoder.
///
/// # Returns
///
/// Receive counters, once the decode side has hung up.
pub async fn receiver_task(socket: Arc<UdpSocket>, tx_packets: mpsc::Sender<Vec<u8>>) -> ReceiveStats {
    let mut stats = ReceiveStats::default();
    let mut recv_buf = vec![0u8; MAX_DATAGRAM];

    info!("Receiver task started, listening for video packets...");

    loop {
        let (num_bytes, src_addr) = match socket.recv_from(&mut recv_buf).await {
            Ok(result) => result,
            Err(e) => {
                if tx_packets.is_closed() {
                    break;
                }
                warn!("Failed to receive UDP packet: {}. Retrying...", e);
                time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        stats.packets += 1;
        stats.bytes += num_bytes as u64;
        debug!("{} bytes from {}", num_bytes, src_addr);

        match tx_packets.try_send(recv_buf[..num_bytes].to_vec()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                stats.dropped += 1;
                if stats.dropped % 100 == 1 {
                    warn!("Decoder falling behind, {} packets dropped so far", stats.dropped);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                info!("Decode channel closed. Exiting receiver task.");
                break;
            }
        }
    }

    info!(
        "Receiver task finished: {} packets, {} bytes, {} dropped",
        stats.packets, stats.bytes, stats.dropped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_datagrams_verbatim() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(receiver_task(socket, tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[0, 0, 0, 1, 0x67], addr).await.unwrap();
        sender.send_to(&[0x42, 0xC0], addr).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), vec![0, 0, 0, 1, 0x67]);
        assert_eq!(rx.recv().await.unwrap(), vec![0x42, 0xC0]);

        // closing the channel ends the task on the next datagram
        drop(rx);
        sender.send_to(&[1], addr).await.unwrap();
        let stats = time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.bytes, 8);
    }
}
