use anyhow::{Context, Result};
use directories::ProjectDirs;
use pomo_ipc::SOCKET_PATH;
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "pomo.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub theme: Theme,
    pub icons: Icons,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub selection: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub black: Color,
    /// Work phase accents.
    #[serde(deserialize_with = "hex_to_color")]
    pub work: Color,
    /// Break phase accents.
    #[serde(deserialize_with = "hex_to_color")]
    pub rest: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub yellow: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub blue: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub magenta: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub cyan: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Icons {
    pub timer: String,
    pub schedule: String,
    pub settings: String,
    pub play: String,
    pub pause: String,
    pub stop: String,
    pub done: String,
    pub current: String,
    pub pending: String,
    pub select: String,
    pub input_cursor: String,
    pub separator: String,
    pub header_left: String,
    pub header_right: String,
}

/// `[runtime]`: where the daemon side of pomo lives.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub socket_path: PathBuf,
    /// Overrides the platform data directory for settings, schedule and log.
    pub data_dir: Option<PathBuf>,
    pub notifications: bool,
    pub auto_start_planned: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            selection: Color::Rgb(230, 195, 132),
            black: Color::Rgb(13, 12, 12),
            work: Color::Rgb(228, 104, 118),
            rest: Color::Rgb(138, 154, 123),
            yellow: Color::Rgb(196, 178, 138),
            blue: Color::Rgb(127, 180, 202),
            magenta: Color::Rgb(162, 146, 163),
            cyan: Color::Rgb(122, 168, 159),
            gray: Color::Rgb(164, 167, 164),
        }
    }
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            timer: "◷".to_string(),
            schedule: "⬢".to_string(),
            settings: "⚙".to_string(),
            play: "▶".to_string(),
            pause: "⏸".to_string(),
            stop: "■".to_string(),
            done: "☑".to_string(),
            current: "◉".to_string(),
            pending: "☐".to_string(),
            select: "▸".to_string(),
            input_cursor: "▊".to_string(),
            separator: "│".to_string(),
            header_left: "⟪ ".to_string(),
            header_right: " ⟫".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(SOCKET_PATH),
            data_dir: None,
            notifications: true,
            auto_start_planned: true,
        }
    }
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if !s.starts_with('#') || s.len() != 7 {
        return Err(serde::de::Error::custom("invalid hex color format"));
    }
    let r = u8::from_str_radix(&s[1..3], 16).map_err(serde::de::Error::custom)?;
    let g = u8::from_str_radix(&s[3..5], 16).map_err(serde::de::Error::custom)?;
    let b = u8::from_str_radix(&s[5..7], 16).map_err(serde::de::Error::custom)?;
    Ok(Color::Rgb(r, g, b))
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "pomo", "pomo").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Loads `path` when given (it must exist), otherwise the platform config
/// file if there is one.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file at {:?}", path))
}
