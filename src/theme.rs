use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "Phosphor",
    bg: Color::Rgb(11, 14, 20),
    fg: Color::Rgb(192, 202, 245),
    accent: Color::Rgb(0, 255, 136),
    muted: Color::Rgb(102, 255, 204),
    border: Color::Rgb(0, 170, 95),
    highlight_fg: Color::Rgb(0, 255, 136),
    highlight_bg: Color::Rgb(0, 51, 34),
    stripe_bg: Color::Rgb(16, 20, 28),
    status: Color::Rgb(0, 255, 136),
    error: Color::Rgb(255, 95, 95),
    key_fg: Color::Rgb(0, 0, 0),
    key_bg: Color::Rgb(0, 255, 136),
  },
  Theme {
    name: "Dusk",
    bg: Color::Rgb(26, 27, 38),
    fg: Color::Rgb(169, 177, 214),
    accent: Color::Rgb(187, 154, 247),
    muted: Color::Rgb(86, 95, 137),
    border: Color::Rgb(59, 66, 97),
    highlight_fg: Color::Rgb(26, 27, 38),
    highlight_bg: Color::Rgb(122, 162, 247),
    stripe_bg: Color::Rgb(31, 32, 45),
    status: Color::Rgb(224, 175, 104),
    error: Color::Rgb(247, 118, 142),
    key_fg: Color::Rgb(26, 27, 38),
    key_bg: Color::Rgb(86, 95, 137),
  },
  Theme {
    name: "Paper",
    bg: Color::Rgb(250, 248, 240),
    fg: Color::Rgb(40, 40, 40),
    accent: Color::Rgb(175, 58, 3),
    muted: Color::Rgb(124, 111, 100),
    border: Color::Rgb(189, 174, 147),
    highlight_fg: Color::Rgb(250, 248, 240),
    highlight_bg: Color::Rgb(7, 102, 120),
    stripe_bg: Color::Rgb(242, 238, 222),
    status: Color::Rgb(121, 116, 14),
    error: Color::Rgb(157, 0, 6),
    key_fg: Color::Rgb(250, 248, 240),
    key_bg: Color::Rgb(124, 111, 100),
  },
];

pub fn index_of(name: &str) -> Option<usize> {
  THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(name))
}
