/// An RGBA color with 8-bit channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Rgba {
    /// Parses `RRGGBB` or `RRGGBBAA`, with or without a leading `#`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let trimmed = hex.trim();
        let cleaned = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = match cleaned.len() {
            6 => u32::from_str_radix(cleaned, 16).ok()? << 8 | 0xFF,
            8 => u32::from_str_radix(cleaned, 16).ok()?,
            _ => return None,
        };
        let [red, green, blue, alpha] = value.to_be_bytes();
        Some(Self {
            red,
            green,
            blue,
            alpha,
        })
    }

    pub fn to_hex(&self) -> String {
        format!(
            "#{:02X}{:02X}{:02X}{:02X}",
            self.red, self.green, self.blue, self.alpha
        )
    }
}
