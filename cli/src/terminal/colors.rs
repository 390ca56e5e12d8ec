use colored::Color;

pub const PRIMARY: Color = Color::BrightWhite;
pub const SECONDARY: Color = Color::Cyan;
pub const ACCENT: Color = Color::BrightGreen;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;
