use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use railq_core::KeyValueStore;
use railq_store::app_config::ThemeConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DARK_MODE_KEY: &str = "theme-dark-mode";
pub const MANUAL_CONTROL_KEY: &str = "theme-manual-control";
pub const PRIMARY_COLOR_KEY: &str = "theme-primary-color";
/// Local time at which stored manual control lapses.
pub const MANUAL_UNTIL_KEY: &str = "theme-manual-until";

const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: StdMutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: StdMutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeSettings {
    pub dark_from_hour: u32,
    pub dark_until_hour: u32,
    pub auto_check: Duration,
    pub default_primary_color: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self::from(&ThemeConfig::default())
    }
}

impl From<&ThemeConfig> for ThemeSettings {
    fn from(config: &ThemeConfig) -> Self {
        Self {
            dark_from_hour: config.dark_from_hour,
            dark_until_hour: config.dark_until_hour,
            auto_check: Duration::from_secs(config.auto_check_seconds.max(1)),
            default_primary_color: config.default_primary_color.clone(),
        }
    }
}

impl ThemeSettings {
    /// Whether `hour` falls in the automatic dark window; the window may wrap midnight.
    pub fn is_dark_hour(&self, hour: u32) -> bool {
        if self.dark_from_hour > self.dark_until_hour {
            hour >= self.dark_from_hour || hour < self.dark_until_hour
        } else {
            hour >= self.dark_from_hour && hour < self.dark_until_hour
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeSnapshot {
    pub is_dark: bool,
    pub manual_control: bool,
    pub primary_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThemeError {
    #[error("invalid colour '{0}', expected #rrggbb")]
    InvalidColor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rgb([u8; 3]);

impl Rgb {
    const WHITE: Rgb = Rgb([0xff, 0xff, 0xff]);
    const BLACK: Rgb = Rgb([0x00, 0x00, 0x00]);

    fn parse(raw: &str) -> Result<Self, ThemeError> {
        let invalid = || ThemeError::InvalidColor(raw.to_string());
        let hex = raw.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut channels = [0u8; 3];
        for (i, channel) in channels.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Rgb(channels))
    }

    /// Per-channel blend: `self * weight + other * (1 - weight)`.
    fn mix(self, other: Rgb, weight: f64) -> Rgb {
        let mut channels = [0u8; 3];
        for (i, channel) in channels.iter_mut().enumerate() {
            let blended = self.0[i] as f64 * weight + other.0[i] as f64 * (1.0 - weight);
            *channel = blended.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(channels)
    }

    fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

/// Shades derived from the primary colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemePalette {
    pub primary: String,
    /// `light[i - 1]` is light level `i`, 1 through 9
    pub light: Vec<String>,
    pub dark_2: String,
}

impl ThemePalette {
    pub fn derive(color: &str) -> Result<Self, ThemeError> {
        let primary = Rgb::parse(color)?;
        let light = (1..=9)
            .map(|i| primary.mix(Rgb::WHITE, i as f64 * 0.1).to_hex())
            .collect();

        Ok(Self {
            primary: primary.to_hex(),
            light,
            dark_2: primary.mix(Rgb::BLACK, 0.2).to_hex(),
        })
    }

    /// CSS custom properties for the palette.
    pub fn css_variables(&self) -> Vec<(String, String)> {
        let mut vars = vec![("--el-color-primary".to_string(), self.primary.clone())];
        for (i, shade) in self.light.iter().enumerate() {
            vars.push((format!("--el-color-primary-light-{}", i + 1), shade.clone()));
        }
        vars.push(("--el-color-primary-dark-2".to_string(), self.dark_2.clone()));
        vars
    }
}

fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    now.date()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .unwrap_or(now)
}

fn until(deadline: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

struct ThemeShared {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: ThemeSettings,
    state: Mutex<ThemeSnapshot>,
}

impl ThemeShared {
    async fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value).await {
            warn!("Failed to persist '{}': {}", key, err);
        }
    }

    async fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).await.unwrap_or_else(|err| {
            warn!("Failed to read '{}': {}", key, err);
            None
        })
    }

    /// Apply the time-of-day rule unless the user has taken manual control.
    async fn auto_switch(&self) {
        let mut state = self.state.lock().await;
        if state.manual_control {
            return;
        }

        let dark = self.settings.is_dark_hour(self.clock.now().hour());
        if state.is_dark != dark {
            state.is_dark = dark;
            info!("Automatic theme switch to {}", if dark { "dark" } else { "light" });
            self.write(DARK_MODE_KEY, mode_value(dark)).await;
        }
    }

    async fn release_manual_control(&self) {
        {
            let mut state = self.state.lock().await;
            state.manual_control = false;
            for key in [MANUAL_CONTROL_KEY, MANUAL_UNTIL_KEY] {
                if let Err(err) = self.store.remove(key).await {
                    warn!("Failed to clear '{}': {}", key, err);
                }
            }
        }
        debug!("Manual theme control expired");
        self.auto_switch().await;
    }
}

fn mode_value(dark: bool) -> &'static str {
    if dark {
        "dark"
    } else {
        "light"
    }
}

/// Dark-mode toggle and primary colour, persisted across runs.
///
/// Owns its timers: a periodic task re-applying the automatic rule and a
/// one-shot task ending manual control at the next local midnight. Both are
/// aborted by [`ThemeController::shutdown`] or on drop.
pub struct ThemeController {
    shared: Arc<ThemeShared>,
    auto_switch: Option<JoinHandle<()>>,
    manual_reset: Option<JoinHandle<()>>,
}

impl ThemeController {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: ThemeSettings,
    ) -> Self {
        let state = ThemeSnapshot {
            is_dark: false,
            manual_control: false,
            primary_color: settings.default_primary_color.clone(),
        };
        Self {
            shared: Arc::new(ThemeShared {
                store,
                clock,
                settings,
                state: Mutex::new(state),
            }),
            auto_switch: None,
            manual_reset: None,
        }
    }

    /// Load stored preferences, apply the automatic rule and start the periodic check.
    ///
    /// Stored manual control lapses at its recorded deadline, and never later
    /// than the coming midnight; a deadline already passed is cleared here.
    pub async fn init(&mut self) {
        let manual = self.shared.read(MANUAL_CONTROL_KEY).await.as_deref() == Some("true");
        let stored_until = self.shared.read(MANUAL_UNTIL_KEY).await;
        let stored_dark = self.shared.read(DARK_MODE_KEY).await;
        let stored_color = self.shared.read(PRIMARY_COLOR_KEY).await;

        let now = self.shared.clock.now();
        let deadline = manual.then(|| {
            let midnight = next_midnight(now);
            stored_until
                .as_deref()
                .and_then(|raw| {
                    NaiveDateTime::parse_from_str(raw, DEADLINE_FORMAT)
                        .map_err(|e| warn!("Ignoring stored manual deadline '{}': {}", raw, e))
                        .ok()
                })
                .map_or(midnight, |stored| stored.min(midnight))
        });

        {
            let mut state = self.shared.state.lock().await;
            state.manual_control = manual;
            if let Some(mode) = stored_dark {
                state.is_dark = mode == "dark";
            }
            if let Some(color) = stored_color.filter(|c| Rgb::parse(c).is_ok()) {
                state.primary_color = color;
            }
        }
        match deadline {
            Some(deadline) if deadline <= now => self.shared.release_manual_control().await,
            Some(deadline) => self.schedule_release(until(deadline, now)),
            None => {}
        }
        self.shared.auto_switch().await;

        if let Some(handle) = self.auto_switch.take() {
            handle.abort();
        }
        let shared = Arc::clone(&self.shared);
        let period = shared.settings.auto_check;
        self.auto_switch = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                shared.auto_switch().await;
            }
        }));
        info!(
            "Theme initialised (manual control: {})",
            deadline.is_some_and(|d| d > now)
        );
    }

    /// Set the mode by hand; automatic switching resumes at the next midnight.
    pub async fn toggle_dark_mode(&mut self, dark: bool) {
        {
            let mut state = self.shared.state.lock().await;
            state.is_dark = dark;
            state.manual_control = true;
        }
        let now = self.shared.clock.now();
        let deadline = next_midnight(now);
        self.shared.write(DARK_MODE_KEY, mode_value(dark)).await;
        self.shared.write(MANUAL_CONTROL_KEY, "true").await;
        self.shared
            .write(MANUAL_UNTIL_KEY, &deadline.format(DEADLINE_FORMAT).to_string())
            .await;

        let delay = until(deadline, now);
        self.schedule_release(delay);
        info!(
            "Theme set to {} by hand, automatic switching resumes in {}s",
            mode_value(dark),
            delay.as_secs()
        );
    }

    fn schedule_release(&mut self, delay: Duration) {
        if let Some(handle) = self.manual_reset.take() {
            handle.abort();
        }
        let shared = Arc::clone(&self.shared);
        self.manual_reset = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.release_manual_control().await;
        }));
    }

    /// Change the primary colour and return the derived palette.
    pub async fn update_primary_color(&self, color: &str) -> Result<ThemePalette, ThemeError> {
        let palette = ThemePalette::derive(color)?;
        self.shared.state.lock().await.primary_color = palette.primary.clone();
        self.shared.write(PRIMARY_COLOR_KEY, &palette.primary).await;
        Ok(palette)
    }

    pub async fn palette(&self) -> Result<ThemePalette, ThemeError> {
        let color = self.shared.state.lock().await.primary_color.clone();
        ThemePalette::derive(&color)
    }

    pub async fn snapshot(&self) -> ThemeSnapshot {
        self.shared.state.lock().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.auto_switch.is_some()
    }

    /// Stop both timers.
    pub fn shutdown(&mut self) {
        for handle in [self.auto_switch.take(), self.manual_reset.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

impl Drop for ThemeController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use railq_store::MemoryStore;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn controller(store: Arc<MemoryStore>, clock: Arc<FixedClock>) -> ThemeController {
        ThemeController::new(store, clock, ThemeSettings::default())
    }

    #[test]
    fn test_dark_window_wraps_midnight() {
        let settings = ThemeSettings::default();
        assert!(settings.is_dark_hour(18));
        assert!(settings.is_dark_hour(23));
        assert!(settings.is_dark_hour(0));
        assert!(settings.is_dark_hour(7));
        assert!(!settings.is_dark_hour(8));
        assert!(!settings.is_dark_hour(17));

        let daytime = ThemeSettings { dark_from_hour: 9, dark_until_hour: 17, ..settings };
        assert!(daytime.is_dark_hour(12));
        assert!(!daytime.is_dark_hour(20));
    }

    #[test]
    fn test_palette_matches_reference_shades() {
        let palette = ThemePalette::derive("#409EFF").unwrap();
        assert_eq!(palette.primary, "#409eff");
        assert_eq!(palette.light[0], "#ecf5ff");
        assert_eq!(palette.light[4], "#a0cfff");
        assert_eq!(palette.light[8], "#53a8ff");
        assert_eq!(palette.dark_2, "#0d2033");

        let vars = palette.css_variables();
        assert_eq!(vars.len(), 11);
        assert_eq!(vars[1], ("--el-color-primary-light-1".to_string(), "#ecf5ff".to_string()));
    }

    #[test]
    fn test_invalid_colours_are_rejected() {
        for bad in ["", "#fff", "#12345g", "409eff00"] {
            assert!(ThemePalette::derive(bad).is_err(), "{bad} should be rejected");
        }
        assert!(ThemePalette::derive("409eff").is_ok());
    }

    #[test]
    fn test_midnight_delay() {
        let delay = |now| until(next_midnight(now), now);
        assert_eq!(delay(at(23, 30)), Duration::from_secs(30 * 60));
        assert_eq!(delay(at(0, 0)), Duration::from_secs(24 * 3600));
        assert_eq!(until(at(8, 0), at(9, 0)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_applies_time_of_day_rule() {
        let store = Arc::new(MemoryStore::new());
        let mut theme = controller(store.clone(), Arc::new(FixedClock::new(at(20, 0))));

        theme.init().await;
        assert!(theme.snapshot().await.is_dark);
        assert!(theme.is_running());
        assert_eq!(store.get(DARK_MODE_KEY).await.unwrap().as_deref(), Some("dark"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_manual_control_wins_over_rule() {
        let store = Arc::new(MemoryStore::new());
        store.set(MANUAL_CONTROL_KEY, "true").await.unwrap();
        store.set(DARK_MODE_KEY, "light").await.unwrap();
        let mut theme = controller(store, Arc::new(FixedClock::new(at(22, 0))));

        theme.init().await;
        let snapshot = theme.snapshot().await;
        assert!(snapshot.manual_control);
        assert!(!snapshot.is_dark);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_follows_the_clock() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(17, 58)));
        let mut theme = controller(store, clock.clone());

        theme.init().await;
        assert!(!theme.snapshot().await.is_dark);

        clock.set(at(18, 0));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(theme.snapshot().await.is_dark);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_control_expires_at_midnight() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(23, 30)));
        let mut theme = controller(store.clone(), clock);

        theme.init().await;
        theme.toggle_dark_mode(false).await;
        let snapshot = theme.snapshot().await;
        assert!(snapshot.manual_control);
        assert!(!snapshot.is_dark);
        assert_eq!(store.get(MANUAL_CONTROL_KEY).await.unwrap().as_deref(), Some("true"));

        // Periodic checks before midnight leave the manual choice alone
        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        assert!(!theme.snapshot().await.is_dark);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        let snapshot = theme.snapshot().await;
        assert!(!snapshot.manual_control);
        assert!(snapshot.is_dark);
        assert!(store.get(MANUAL_CONTROL_KEY).await.unwrap().is_none());
        assert!(store.get(MANUAL_UNTIL_KEY).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_control_expires_after_restart() {
        let store = Arc::new(MemoryStore::new());
        let mut first = controller(store.clone(), Arc::new(FixedClock::new(at(23, 30))));
        first.init().await;
        first.toggle_dark_mode(false).await;
        assert_eq!(
            store.get(MANUAL_UNTIL_KEY).await.unwrap().as_deref(),
            Some("2024-06-02T00:00:00")
        );
        drop(first);

        let mut second = controller(store.clone(), Arc::new(FixedClock::new(at(23, 45))));
        second.init().await;
        assert!(second.snapshot().await.manual_control);
        assert!(!second.snapshot().await.is_dark);

        tokio::time::sleep(Duration::from_secs(16 * 60)).await;
        let snapshot = second.snapshot().await;
        assert!(!snapshot.manual_control);
        assert!(snapshot.is_dark);
        assert!(store.get(MANUAL_CONTROL_KEY).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lapsed_manual_control_is_cleared_on_init() {
        let store = Arc::new(MemoryStore::new());
        store.set(MANUAL_CONTROL_KEY, "true").await.unwrap();
        store.set(MANUAL_UNTIL_KEY, "2024-06-01T00:00:00").await.unwrap();
        store.set(DARK_MODE_KEY, "dark").await.unwrap();
        let mut theme = controller(store.clone(), Arc::new(FixedClock::new(at(9, 0))));

        theme.init().await;
        let snapshot = theme.snapshot().await;
        assert!(!snapshot.manual_control);
        assert!(!snapshot.is_dark);
        assert!(store.get(MANUAL_CONTROL_KEY).await.unwrap().is_none());
        assert_eq!(store.get(DARK_MODE_KEY).await.unwrap().as_deref(), Some("light"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flag_without_deadline_lapses_at_midnight() {
        let store = Arc::new(MemoryStore::new());
        store.set(MANUAL_CONTROL_KEY, "true").await.unwrap();
        store.set(DARK_MODE_KEY, "light").await.unwrap();
        let mut theme = controller(store, Arc::new(FixedClock::new(at(23, 30))));

        theme.init().await;
        assert!(theme.snapshot().await.manual_control);

        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        let snapshot = theme.snapshot().await;
        assert!(!snapshot.manual_control);
        assert!(snapshot.is_dark);
    }

    #[tokio::test(start_paused = true)]
    async fn test_colour_update_persists() {
        let store = Arc::new(MemoryStore::new());
        let theme = controller(store.clone(), Arc::new(FixedClock::new(at(12, 0))));

        let palette = theme.update_primary_color("#67C23A").await.unwrap();
        assert_eq!(palette.primary, "#67c23a");
        assert_eq!(theme.snapshot().await.primary_color, "#67c23a");
        assert_eq!(store.get(PRIMARY_COLOR_KEY).await.unwrap().as_deref(), Some("#67c23a"));

        assert!(theme.update_primary_color("teal").await.is_err());
        assert_eq!(theme.snapshot().await.primary_color, "#67c23a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timers() {
        let store = Arc::new(MemoryStore::new());
        let mut theme = controller(store, Arc::new(FixedClock::new(at(12, 0))));
        theme.init().await;
        theme.toggle_dark_mode(true).await;

        theme.shutdown();
        assert!(!theme.is_running());
    }
}
