//! OpenCV preview window; a no-op shell when built without `vision`.

use tokio::sync::mpsc;

use tello_video::frame::DecodedFrame;

#[cfg(feature = "vision")]
const WINDOW: &str = "Tello";

/// Shows frames as they arrive until ESC is pressed or the decoder goes away.
#[cfg(feature = "vision")]
pub async fn run(rx_frames: &mut mpsc::Receiver<DecodedFrame>) -> anyhow::Result<()> {
    use std::time::Duration;

    use log::warn;
    use opencv::highgui;
    use tello_video::decoder::frame_to_mat;

    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;
    loop {
        match rx_frames.try_recv() {
            Ok(frame) => {
                let mat = frame_to_mat(&frame)?;
                highgui::imshow(WINDOW, &mat)?;
            }
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => {
                warn!("Decode thread closed the frame channel.");
                break;
            }
        }

        // Exit on ESC key (ASCII 27)
        if highgui::wait_key(1)? == 27 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    highgui::destroy_all_windows()?;
    Ok(())
}

#[cfg(not(feature = "vision"))]
pub async fn run(rx_frames: &mut mpsc::Receiver<DecodedFrame>) -> anyhow::Result<()> {
    crate::log_loop(rx_frames).await;
    Ok(())
}

#[cfg(feature = "vision")]
pub fn show_until_key(frame: &DecodedFrame) -> anyhow::Result<()> {
    use opencv::highgui;
    use tello_video::decoder::frame_to_mat;

    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;
    highgui::imshow(WINDOW, &frame_to_mat(frame)?)?;
    highgui::wait_key(0)?;
    highgui::destroy_all_windows()?;
    Ok(())
}

#[cfg(not(feature = "vision"))]
pub fn show_until_key(_frame: &DecodedFrame) -> anyhow::Result<()> {
    log::warn!("Built without the `vision` feature; no window to show the frame in");
    Ok(())
}
