use indicatif::{ProgressBar, ProgressStyle};

/// Runs with fewer files than this never show a bar
const PROGRESS_THRESHOLD: usize = 10;

/// Per-file progress bar on stderr; a no-op when disabled or the batch is small
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn disabled() -> Self {
        Self { bar: None }
    }

    pub fn new(total: usize, enabled: bool) -> Self {
        if !enabled || total < PROGRESS_THRESHOLD {
            return Self::disabled();
        }

        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar: Some(bar) }
    }

    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }

    pub fn start_file(&self, name: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(name.to_string());
        }
    }

    pub fn finish_file(&self) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    /// Hide the bar while `f` prints, so report lines are not torn
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.bar {
            Some(ref bar) => bar.suspend(f),
            None => f(),
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_batches_have_no_bar() {
        assert!(!ProgressReporter::new(PROGRESS_THRESHOLD - 1, true).is_active());
        assert!(!ProgressReporter::new(100, false).is_active());
        assert!(ProgressReporter::new(PROGRESS_THRESHOLD, true).is_active());
    }

    #[test]
    fn test_suspend_returns_closure_value() {
        let progress = ProgressReporter::disabled();
        assert_eq!(progress.suspend(|| 42), 42);
    }
}
