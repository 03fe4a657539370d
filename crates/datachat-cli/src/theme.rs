use crossterm::style::Color;

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: &'static str,
    pub accent: Color,
    pub muted: Color,
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub user_color: Color,
    pub assistant_color: Color,
    pub system_color: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            name: "dark",
            accent: Color::Rgb { r: 122, g: 162, b: 247 },
            muted: Color::Rgb { r: 100, g: 100, b: 100 },
            success: Color::Rgb { r: 158, g: 206, b: 106 },
            error: Color::Rgb { r: 247, g: 118, b: 142 },
            warning: Color::Rgb { r: 224, g: 175, b: 104 },
            user_color: Color::Cyan,
            assistant_color: Color::Green,
            system_color: Color::Yellow,
        }
    }

    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night",
            accent: Color::Rgb { r: 122, g: 162, b: 247 },
            muted: Color::Rgb { r: 86, g: 95, b: 137 },
            success: Color::Rgb { r: 158, g: 206, b: 106 },
            error: Color::Rgb { r: 247, g: 118, b: 142 },
            warning: Color::Rgb { r: 224, g: 175, b: 104 },
            user_color: Color::Rgb { r: 122, g: 162, b: 247 },
            assistant_color: Color::Rgb { r: 158, g: 206, b: 106 },
            system_color: Color::Rgb { r: 224, g: 175, b: 104 },
        }
    }

    pub fn dracula() -> Self {
        Self {
            name: "dracula",
            accent: Color::Rgb { r: 255, g: 121, b: 198 },
            muted: Color::Rgb { r: 98, g: 114, b: 164 },
            success: Color::Rgb { r: 80, g: 250, b: 123 },
            error: Color::Rgb { r: 255, g: 85, b: 85 },
            warning: Color::Rgb { r: 241, g: 250, b: 140 },
            user_color: Color::Rgb { r: 139, g: 233, b: 253 },
            assistant_color: Color::Rgb { r: 80, g: 250, b: 123 },
            system_color: Color::Rgb { r: 241, g: 250, b: 140 },
        }
    }

    /// Plain terminal colours, for terminals without truecolor.
    pub fn basic() -> Self {
        Self {
            name: "basic",
            accent: Color::Blue,
            muted: Color::DarkGrey,
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            user_color: Color::Cyan,
            assistant_color: Color::Green,
            system_color: Color::Yellow,
        }
    }

    pub fn by_name(name: &str) -> Self {
        match name {
            "tokyo-night" => Self::tokyo_night(),
            "dracula" => Self::dracula(),
            "basic" => Self::basic(),
            _ => Self::dark(),
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["dark", "tokyo-night", "dracula", "basic"]
    }
}
