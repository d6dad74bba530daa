use embassy_executor::task;
use embassy_stm32::usart::RingBufferedUartRx;
use embedded_io_async::Read;

use crate::link::bridge::{FrameDecoder, FrameKind};
use crate::link::{ConnectionState, DatagramInbox, ThreePhaseCurrentPacket};

/// Receive context for the coprocessor UART: turns incoming frames into
/// mailbox writes and connection-state transitions.
#[task]
pub async fn bridge_rx_task(
    mut rx: RingBufferedUartRx<'static>,
    mut inbox: DatagramInbox<'static, ThreePhaseCurrentPacket>,
    connection: &'static ConnectionState,
) {
    info!("bridge rx task started");
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 64];
    let mut bad_frames = 0u32;

    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                // DMA overrun: whatever was mid-frame is gone
                warn!("bridge uart error: {:?}", e);
                decoder.reset();
                continue;
            }
        };

        for &byte in &buf[..n] {
            let frame = match decoder.push(byte) {
                None => continue,
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    bad_frames += 1;
                    debug!("bridge frame rejected ({}): {:?}", bad_frames, e);
                    continue;
                }
            };

            match frame.kind {
                FrameKind::DatagramRx => {
                    if let Some((sender, data)) = frame.datagram() {
                        inbox.on_receive(&sender, data);
                    }
                }
                FrameKind::Connected => {
                    info!("central connected");
                    connection.on_connect();
                }
                FrameKind::Disconnected => {
                    info!("central disconnected");
                    connection.on_disconnect();
                }
                other => debug!("unexpected frame from bridge: {:?}", other),
            }
        }
    }
}
