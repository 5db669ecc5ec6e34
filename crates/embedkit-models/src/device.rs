use candle_core::Device;
use embedkit_core::{Error, Result};
use tracing::info;

/// Pick the best available device: CUDA, then Metal, then CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(dev) = Device::new_cuda(0) { info!("Device: CUDA:0"); return dev; }
    }
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) { info!("Device: Metal (MPS)"); return dev; }
    }
    info!("Device: CPU");
    Device::Cpu
}

/// Parse a device name: `cpu`, `cuda`, `cuda:N`, `metal`, `metal:N` or `mps`.
/// `None` picks automatically.
pub fn parse_device(name: Option<&str>) -> Result<Device> {
    let Some(name) = name.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(select_device());
    };
    let (kind, ordinal) = match name.split_once(':') {
        Some((kind, n)) => {
            let ordinal = n.parse::<usize>().map_err(|_| Error::InvalidConfig(format!("invalid device ordinal in '{name}'")))?;
            (kind, ordinal)
        }
        None => (name, 0),
    };
    match kind.to_ascii_lowercase().as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Device::new_cuda(ordinal).map_err(|e| Error::InvalidConfig(format!("device '{name}' unavailable: {e}"))),
        "metal" | "mps" => Device::new_metal(ordinal).map_err(|e| Error::InvalidConfig(format!("device '{name}' unavailable: {e}"))),
        _ => Err(Error::InvalidConfig(format!("unknown device '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_and_rejects_garbage() {
        assert!(matches!(parse_device(Some("cpu")), Ok(Device::Cpu)));
        assert!(matches!(parse_device(Some(" CPU ")), Ok(Device::Cpu)));
        assert!(matches!(parse_device(Some("tpu")), Err(Error::InvalidConfig(_))));
        assert!(matches!(parse_device(Some("cuda:x")), Err(Error::InvalidConfig(_))));
    }
}
