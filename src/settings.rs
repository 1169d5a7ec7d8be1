// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recording: RecordingSettings,
    pub encoder: EncoderSettings,
    pub signaling: SignalingSettings,
    pub timeouts: TimeoutSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recording: RecordingSettings::default(),
            encoder: EncoderSettings::default(),
            signaling: SignalingSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl Settings {
    /// Load from the given TOML file (optional) and `LECTURE_REC__*`
    /// environment overrides.
    pub fn load(file_name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::new(file_name, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("LECTURE_REC").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory all recording files are placed in.
    pub directory: PathBuf,
    /// Container file extension.
    pub container: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("videos_recorded"),
            container: "mkv".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// x264 constant rate factor
    pub crf: u8,
    /// x264 encoder preset
    pub preset: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            crf: 18,
            preset: "ultrafast".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalingSettings {
    /// Listen address of the room websocket endpoint.
    pub listen: SocketAddr,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8090)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Seconds a session may stay in negotiation before it is abandoned.
    pub negotiation_secs: u64,
    /// Seconds the encoder gets to flush and close the file.
    pub flush_secs: u64,
    /// Seconds of participant silence before the hub drops the connection.
    pub ping_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            negotiation_secs: 30,
            flush_secs: 10,
            ping_secs: 30,
        }
    }
}

impl TimeoutSettings {
    #[must_use]
    pub fn negotiation(&self) -> Duration {
        Duration::from_secs(self.negotiation_secs)
    }

    #[must_use]
    pub fn flush(&self) -> Duration {
        Duration::from_secs(self.flush_secs)
    }

    #[must_use]
    pub fn ping(&self) -> Duration {
        Duration::from_secs(self.ping_secs)
    }
}
