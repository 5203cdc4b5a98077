//! ALSA PCM device wrappers for audio capture and playback.
//!
//! Both directions are opened mono, interleaved, 32-bit float so that the
//! bridge sees the same sample format the capture/playback seams use.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};

use crate::error::BridgeError;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Period size in frames
    pub period_size: usize,
}

/// Open a PCM device for capture (recording).
pub fn open_capture(device: &str, sample_rate: u32) -> Result<(PCM, AlsaParams), BridgeError> {
    open_pcm(device, Direction::Capture, sample_rate, None, "Capture")
}

/// Open a PCM device for playback.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams), BridgeError> {
    open_pcm(device, Direction::Playback, sample_rate, period_size, "Playback")
}

/// Map an ALSA error, telling a refused device apart from other failures.
pub fn map_alsa_error(context: &str, e: alsa::Error) -> BridgeError {
    let kind = std::io::Error::from_raw_os_error(e.errno().abs()).kind();
    if kind == std::io::ErrorKind::PermissionDenied {
        BridgeError::PermissionDenied(format!("{}: {}", context, e))
    } else {
        BridgeError::device(format!("{}: {}", context, e))
    }
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    period_size: Option<usize>,
    dir_name: &str,
) -> Result<(PCM, AlsaParams), BridgeError> {
    let pcm = PCM::new(device, direction, false).map_err(|e| {
        map_alsa_error(&format!("open PCM device '{}' for {}", device, dir_name), e)
    })?;

    let hw_err = |e| map_alsa_error(&format!("{} hw params", dir_name), e);

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).map_err(hw_err)?;
        hwp.set_access(Access::RWInterleaved).map_err(hw_err)?;
        hwp.set_format(Format::FloatLE).map_err(hw_err)?;
        hwp.set_channels(1).map_err(hw_err)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest).map_err(hw_err)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)
                .map_err(hw_err)?;
        }
        pcm.hw_params(&hwp).map_err(hw_err)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, period_size) = {
        let hwp = pcm.hw_params_current().map_err(hw_err)?;
        let rate = hwp.get_rate().map_err(hw_err)?;
        let ps = hwp.get_period_size().map_err(hw_err)? as usize;
        (rate, ps)
    };

    if actual_rate != sample_rate {
        // plughw / pipewire 会自动重采样，直连硬件时可能协商出别的采样率
        return Err(BridgeError::device(format!(
            "{} device '{}' negotiated {} Hz instead of {} Hz",
            dir_name, device, actual_rate, sample_rate
        )));
    }

    log::info!(
        "ALSA {}: device={}, rate={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        period_size,
    );

    Ok((
        pcm,
        AlsaParams {
            sample_rate: actual_rate,
            period_size,
        },
    ))
}
