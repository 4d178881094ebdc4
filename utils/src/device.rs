use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

/// Why an audio device could not be used. Each category maps to its own
/// user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("no audio {0} device found")]
    NotFound(String),
    #[error("access to the audio device was denied: {0}")]
    PermissionDenied(String),
    #[error("audio device does not support the required configuration: {0}")]
    Unsupported(String),
    #[error("audio device unavailable: {0}")]
    Unavailable(String),
}

impl DeviceError {
    fn from_backend(err: &cpal::BackendSpecificError) -> Self {
        let description = err.description.to_lowercase();
        if description.contains("permission")
            || description.contains("denied")
            || description.contains("not authorized")
        {
            DeviceError::PermissionDenied(err.description.clone())
        } else {
            DeviceError::Unavailable(err.description.clone())
        }
    }
}

impl From<cpal::BuildStreamError> for DeviceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NotFound("stream".to_string()),
            cpal::BuildStreamError::StreamConfigNotSupported => DeviceError::Unsupported(err.to_string()),
            cpal::BuildStreamError::BackendSpecific { ref err } => DeviceError::from_backend(err),
            other => DeviceError::Unavailable(other.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for DeviceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::NotFound("stream".to_string()),
            cpal::DefaultStreamConfigError::BackendSpecific { ref err } => DeviceError::from_backend(err),
            other => DeviceError::Unsupported(other.to_string()),
        }
    }
}

impl From<cpal::SupportedStreamConfigsError> for DeviceError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        match err {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => DeviceError::NotFound("stream".to_string()),
            cpal::SupportedStreamConfigsError::BackendSpecific { ref err } => DeviceError::from_backend(err),
            other => DeviceError::Unsupported(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for DeviceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::BackendSpecific { ref err } => DeviceError::from_backend(err),
            other => DeviceError::Unavailable(other.to_string()),
        }
    }
}

impl From<cpal::DevicesError> for DeviceError {
    fn from(err: cpal::DevicesError) -> Self {
        DeviceError::Unavailable(err.to_string())
    }
}

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the input device called `device_name`, or the host's default input
/// device when no name is given.
pub fn get_or_default_input(device_name: Option<&str>) -> Result<Device, DeviceError> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::NotFound("input".to_string())),
        Some(target) => host
            .input_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| DeviceError::NotFound(format!("input named {:?}", target))),
    }
}

/// Finds the output device called `device_name`, or the host's default
/// output device when no name is given.
pub fn get_or_default_output(device_name: Option<&str>) -> Result<Device, DeviceError> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .ok_or_else(|| DeviceError::NotFound("output".to_string())),
        Some(target) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| DeviceError::NotFound(format!("output named {:?}", target))),
    }
}

/// Picks an output config running at `sample_rate` if the device supports
/// it, preferring mono then stereo; falls back to the device default.
pub fn output_config_for_rate(device: &Device, sample_rate: u32) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let rate = cpal::SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.sample_format() == cpal::SampleFormat::F32
            && c.min_sample_rate() <= rate
            && c.max_sample_rate() >= rate
    };
    let configs: Vec<_> = device.supported_output_configs()?.collect();
    let preferred = configs
        .iter()
        .find(|c| supports(*c, 1))
        .or_else(|| configs.iter().find(|c| supports(*c, 2)));
    match preferred {
        Some(range) => Ok(range.clone().with_sample_rate(rate)),
        None => {
            tracing::debug!("output device has no f32 config at {}hz, using default", sample_rate);
            Ok(device.default_output_config()?)
        }
    }
}

fn describe(device: &Device, config: Result<cpal::SupportedStreamConfig, cpal::DefaultStreamConfigError>, default_name: Option<&str>) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut d = match config {
        Ok(cfg) => format!(" * {}({}ch, {}hz)", name, cfg.channels(), cfg.sample_rate().0),
        Err(_) => format!(" * {}(no default config)", name),
    };
    if default_name == Some(name.as_str()) {
        d.push_str(" [default]");
    }
    d
}

pub fn get_available_inputs() -> Result<String, DeviceError> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host.default_input_device().and_then(|d| d.name().ok());
    let device_names: Vec<String> = host
        .input_devices()?
        .map(|d| {
            let config = d.default_input_config();
            describe(&d, config, default_device.as_deref())
        })
        .collect();
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> Result<String, DeviceError> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host.default_output_device().and_then(|d| d.name().ok());
    let device_names: Vec<String> = host
        .output_devices()?
        .map(|d| {
            let config = d.default_output_config();
            describe(&d, config, default_device.as_deref())
        })
        .collect();
    Ok(device_names.join("\n"))
}
