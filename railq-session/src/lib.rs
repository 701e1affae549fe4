pub mod persisted;
pub mod session;
pub mod theme;

pub use session::{SearchOutcome, SearchSession, SessionOptions, SessionSnapshot, StopsOutcome};
pub use theme::{
    Clock, FixedClock, SystemClock, ThemeController, ThemeError, ThemePalette, ThemeSettings,
    ThemeSnapshot,
};
