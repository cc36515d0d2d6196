use indicatif::{ProgressBar, ProgressStyle};

/// Where a sampler is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Proposals are tuned at every checkpoint.
    Adapting,
    /// Proposals are frozen.
    Sampling,
    /// Every configured iteration has run.
    Done,
}

pub(crate) fn progress_bar(n_steps: usize, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(n_steps as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_prefix(prefix.to_string());
    pb
}
