use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use surge_core::prelude::DelegatedShutdownListener;

use crate::types::SurgeResult;

/// Displays a progress bar while the test is running to show the user how long is left.
///
/// The planned runtime is only an estimate, workers can take a little longer to finish their last
/// virtual users, so the bar stays full until the listener fires.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    shutdown_listener: DelegatedShutdownListener,
) -> SurgeResult<()> {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}]",
    )
    .context("Invalid progress bar template")?
    .with_key("planned_runtime", {
        let planned = format_hms(planned_runtime);
        move |_state: &ProgressState, w: &mut dyn Write| {
            // Nowhere to report a failed write from inside the template.
            let _ = w.write_str(&planned);
        }
    })
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let new = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
                pb.set_position(new);
                std::thread::sleep(Duration::from_millis(500));
            }
        })
        .context("Failed to start progress thread")?;

    Ok(())
}

fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
