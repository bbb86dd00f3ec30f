use anyhow::{Context, anyhow};
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

//takes a device name and finds that input device on the host,
//or falls back to the host's default input device
pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());

    let Some(target) = device_name else {
        return host
            .default_input_device()
            .context("No default input device");
    };

    host.input_devices()?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow!("No input device named {}", target))
}

//does the same as the input device above
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();

    let Some(target) = device_name else {
        return host
            .default_output_device()
            .context("No default output device");
    };

    host.output_devices()?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow!("No output device named {}", target))
}

/// One line per input device with channel count and rate; the default is marked.
pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for device in host.input_devices()? {
        let name = device.name()?;
        let config = device.default_input_config()?;
        let mut line = format!(
            " * {}({}ch, {}hz)",
            name,
            config.channels(),
            config.sample_rate().0
        );
        if default_name.as_deref() == Some(name.as_str()) {
            line.push_str(" [default]");
        }
        device_names.push(line);
    }
    Ok(device_names.join("\n"))
}

//does the same as the input function above
pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for device in host.output_devices()? {
        let name = device.name()?;
        let config = device.default_output_config()?;
        let mut line = format!(
            " * {}({}ch, {}hz)",
            name,
            config.channels(),
            config.sample_rate().0
        );
        if default_name.as_deref() == Some(name.as_str()) {
            line.push_str(" [default]");
        }
        device_names.push(line);
    }
    Ok(device_names.join("\n"))
}
