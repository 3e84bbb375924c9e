use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct SurgeCli {
    /// Path to the test script, in YAML or JSON
    pub script: PathBuf,

    /// A JSON file whose content is handed to every worker as-is
    #[clap(short, long)]
    pub payload: Option<PathBuf>,

    /// The number of worker processes to spread the load across.
    ///
    /// Defaults to the value of `SURGE_WORKERS`, or a single worker if that is not set either.
    #[clap(short, long)]
    pub workers: Option<usize>,

    /// The worker binary to launch.
    ///
    /// Defaults to the value of `SURGE_WORKER_PATH`, then a `surge-worker` next to this binary, then
    /// `surge-worker` on the `PATH`.
    #[clap(long)]
    pub worker_bin: Option<PathBuf>,

    /// A name for the environment under test, passed through to the workers
    #[clap(short, long)]
    pub environment: Option<String>,

    /// Identify this run. A random id is generated if none is given.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_arguments() {
        let cli = SurgeCli::try_parse_from(["surge", "load.yaml"]).unwrap();

        assert_eq!(PathBuf::from("load.yaml"), cli.script);
        assert_eq!(None, cli.workers);
        assert!(!cli.no_progress);
    }

    #[test]
    fn parse_all_arguments() {
        let cli = SurgeCli::try_parse_from([
            "surge",
            "load.yaml",
            "-p",
            "users.json",
            "-w",
            "4",
            "--worker-bin",
            "/opt/surge-worker",
            "-e",
            "staging",
            "--run-id",
            "nightly",
            "--no-progress",
        ])
        .unwrap();

        assert_eq!(Some(PathBuf::from("users.json")), cli.payload);
        assert_eq!(Some(4), cli.workers);
        assert_eq!(Some(PathBuf::from("/opt/surge-worker")), cli.worker_bin);
        assert_eq!(Some("staging".to_string()), cli.environment);
        assert_eq!(Some("nightly".to_string()), cli.run_id);
        assert!(cli.no_progress);
    }

    #[test]
    fn script_is_required() {
        assert!(SurgeCli::try_parse_from(["surge"]).is_err());
    }
}
