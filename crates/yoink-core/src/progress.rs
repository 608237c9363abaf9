use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub const PROGRESS_ENV: &str = "YOINK_PROGRESS";

pub(crate) fn progress_enabled() -> bool {
    match env::var(PROGRESS_ENV) {
        Ok(value) => value != "0",
        Err(_) => io::stderr().is_terminal(),
    }
}

static OUTPUT_LOCK: Mutex<()> = Mutex::new(());
static MANAGER: OnceLock<ProgressManager> = OnceLock::new();

fn manager() -> &'static ProgressManager {
    MANAGER.get_or_init(ProgressManager::new)
}

fn clear_progress_line() {
    let _guard = OUTPUT_LOCK.lock().ok();
    let _ = io::stderr().write_all(b"\r\x1b[2K");
    let _ = io::stderr().flush();
}

#[derive(Clone)]
struct Spinner {
    id: u64,
    label: String,
    started_at: Instant,
}

struct ProgressManager {
    state: Mutex<ProgressState>,
}

struct ProgressState {
    next_id: u64,
    suspend_count: usize,
    spinners: Vec<Spinner>,
    renderer_started: bool,
}

impl ProgressManager {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProgressState {
                next_id: 1,
                suspend_count: 0,
                spinners: Vec::new(),
                renderer_started: false,
            }),
        }
    }

    // The state is plain counters; a panicking holder cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_renderer(&self) {
        let mut state = self.lock();
        if state.renderer_started {
            return;
        }
        state.renderer_started = true;
        drop(state);

        thread::spawn(|| {
            const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
            const TICK: Duration = Duration::from_millis(80);
            const START_DELAY: Duration = Duration::from_millis(120);
            let mut idx = 0usize;
            let mut rendered = false;
            loop {
                let visible = {
                    let state = manager().lock();
                    if state.suspend_count > 0 {
                        None
                    } else {
                        state.spinners.last().cloned()
                    }
                };

                let Some(spinner) = visible.filter(|spinner| {
                    Instant::now().saturating_duration_since(spinner.started_at) >= START_DELAY
                }) else {
                    if rendered {
                        clear_progress_line();
                        rendered = false;
                    }
                    thread::sleep(TICK);
                    continue;
                };

                let frame = FRAMES[idx % FRAMES.len()];
                idx = idx.wrapping_add(1);
                let line = format!("\r\x1b[2Kyoink ▸ {} {frame}", spinner.label);
                {
                    let _guard = OUTPUT_LOCK.lock().ok();
                    let _ = io::stderr().write_all(line.as_bytes());
                    let _ = io::stderr().flush();
                }
                rendered = true;
                thread::sleep(TICK);
            }
        });
    }

    fn push(&self, label: String) -> u64 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id = state.next_id.saturating_add(1);
        state.spinners.push(Spinner {
            id,
            label,
            started_at: Instant::now(),
        });
        id
    }

    fn remove(&self, id: u64) {
        let mut state = self.lock();
        state.spinners.retain(|spinner| spinner.id != id);
    }

    fn suspend(&self) {
        let mut state = self.lock();
        state.suspend_count = state.suspend_count.saturating_add(1);
    }

    fn resume(&self) {
        let mut state = self.lock();
        state.suspend_count = state.suspend_count.saturating_sub(1);
    }
}

/// Hides the spinner while a subprocess owns the terminal.
pub(crate) struct ProgressSuspendGuard {
    enabled: bool,
}

impl ProgressSuspendGuard {
    pub(crate) fn new() -> Self {
        if !progress_enabled() {
            return Self { enabled: false };
        }
        manager().suspend();
        clear_progress_line();
        Self { enabled: true }
    }
}

impl Drop for ProgressSuspendGuard {
    fn drop(&mut self) {
        if self.enabled {
            manager().resume();
        }
    }
}

pub struct ProgressReporter {
    id: Option<u64>,
}

impl ProgressReporter {
    pub fn spinner(label: impl Into<String>) -> Self {
        if !progress_enabled() {
            return Self { id: None };
        }
        manager().start_renderer();
        Self {
            id: Some(manager().push(label.into())),
        }
    }

    /// Stops the spinner and leaves `message` on stderr.
    pub fn finish(mut self, message: impl Into<String>) {
        self.stop();
        eprintln!("yoink ▸ {}", message.into());
    }

    fn stop(&mut self) {
        if let Some(id) = self.id.take() {
            manager().remove(id);
            clear_progress_line();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn disabled_reporter_registers_nothing() {
        env::set_var(PROGRESS_ENV, "0");
        let reporter = ProgressReporter::spinner("Casting for htop");
        assert!(reporter.id.is_none());
        drop(reporter);
        env::remove_var(PROGRESS_ENV);
    }

    #[test]
    #[serial]
    fn suspend_guard_nests() {
        env::set_var(PROGRESS_ENV, "1");
        {
            let _outer = ProgressSuspendGuard::new();
            let _inner = ProgressSuspendGuard::new();
            assert_eq!(manager().lock().suspend_count, 2);
        }
        assert_eq!(manager().lock().suspend_count, 0);
        env::remove_var(PROGRESS_ENV);
    }
}
