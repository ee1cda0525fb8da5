//! Embed configuration read from the embedding tag's `data-*` attributes.

use std::fmt;
use std::str::FromStr;

use url::Url;

#[cfg(test)]
#[path = "embed_test.rs"]
mod embed_test;

pub const DEFAULT_WIDGET_URL: &str = "http://localhost:4200/widget";
pub const DEFAULT_BUTTON_TEXT: &str = "Chat with AIDA";
pub const DEFAULT_BUTTON_COLOR: &str = "#2E008B";
pub const DEFAULT_BUTTON_HOVER_COLOR: &str = "#00B7F1";
pub const DEFAULT_Z_INDEX: u32 = 999_999;
pub const DEFAULT_WIDTH: &str = "380px";
pub const DEFAULT_HEIGHT: &str = "600px";
/// Distance of the launcher and frame from the viewport edges.
pub const DOCK_OFFSET: &str = "20px";
pub const DEFAULT_MAX_HEIGHT: &str = "80vh";

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("invalid widget URL `{url}`: {source}")]
    InvalidWidgetUrl { url: String, source: url::ParseError },
    #[error("unsupported position `{0}` (expected bottom-right, bottom-left, top-right or top-left)")]
    InvalidPosition(String),
}

/// Corner of the viewport the launcher button docks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
}

impl Position {
    #[must_use]
    pub fn is_right(self) -> bool {
        matches!(self, Self::BottomRight | Self::TopRight)
    }

    #[must_use]
    pub fn is_bottom(self) -> bool {
        matches!(self, Self::BottomRight | Self::BottomLeft)
    }
}

impl FromStr for Position {
    type Err = EmbedError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "bottom-right" => Ok(Self::BottomRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "top-right" => Ok(Self::TopRight),
            "top-left" => Ok(Self::TopLeft),
            other => Err(EmbedError::InvalidPosition(other.to_owned())),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BottomRight => "bottom-right",
            Self::BottomLeft => "bottom-left",
            Self::TopRight => "top-right",
            Self::TopLeft => "top-left",
        };
        f.write_str(name)
    }
}

/// Launcher and frame settings for one embedded widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedConfig {
    pub widget_url: Url,
    pub button_text: String,
    pub button_color: String,
    pub button_hover_color: String,
    pub position: Position,
    pub z_index: u32,
    pub width: String,
    pub height: String,
    pub max_height: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            // Safety: the constant is a valid absolute URL.
            widget_url: Url::parse(DEFAULT_WIDGET_URL).unwrap_or_else(|_| unreachable!()),
            button_text: DEFAULT_BUTTON_TEXT.to_owned(),
            button_color: DEFAULT_BUTTON_COLOR.to_owned(),
            button_hover_color: DEFAULT_BUTTON_HOVER_COLOR.to_owned(),
            position: Position::default(),
            z_index: DEFAULT_Z_INDEX,
            width: DEFAULT_WIDTH.to_owned(),
            height: DEFAULT_HEIGHT.to_owned(),
            max_height: DEFAULT_MAX_HEIGHT.to_owned(),
        }
    }
}

impl EmbedConfig {
    /// Build a config from `data-*` attribute pairs, e.g.
    /// `("data-position", "top-left")`.
    ///
    /// Attributes with an empty value keep their default. Unknown attributes
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable widget URL or an unknown position.
    pub fn from_attributes<'a, I>(attributes: I) -> Result<Self, EmbedError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (name, value) in attributes {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.trim() {
                "data-widget-url" => {
                    config.widget_url = Url::parse(value).map_err(|source| EmbedError::InvalidWidgetUrl {
                        url: value.to_owned(),
                        source,
                    })?;
                }
                "data-button-text" => value.clone_into(&mut config.button_text),
                "data-button-color" => value.clone_into(&mut config.button_color),
                "data-position" => config.position = value.parse()?,
                "data-width" => value.clone_into(&mut config.width),
                "data-height" => value.clone_into(&mut config.height),
                _ => {}
            }
        }
        Ok(config)
    }

    /// Edge offsets for the docked launcher, e.g. `right: 20px; bottom: 20px`.
    #[must_use]
    pub fn dock(&self) -> String {
        let horizontal = if self.position.is_right() { "right" } else { "left" };
        let vertical = if self.position.is_bottom() { "bottom" } else { "top" };
        format!("{horizontal}: {DOCK_OFFSET}; {vertical}: {DOCK_OFFSET}")
    }

    /// Serialized origin of the widget URL; messages from any other origin
    /// are ignored by the host.
    #[must_use]
    pub fn widget_origin(&self) -> String {
        self.widget_url.origin().ascii_serialization()
    }
}
