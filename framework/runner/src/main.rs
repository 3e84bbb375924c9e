use surge_runner::prelude::{init, run, SurgeResult};

fn main() -> SurgeResult<()> {
    let cli = init();

    run(cli)
}
