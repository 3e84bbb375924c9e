use std::time::Duration;

use serde_json::json;
use surge_core::prelude::{RunOptions, Script};
use surge_runner::prelude::{Coordinator, CoordinatorEvent, PoolSize, WorkerLauncher};

#[tokio::test(flavor = "multi_thread")]
async fn coordinator_drives_worker_processes() {
    let script: Script = serde_json::from_value(json!({
        "config": {
            "phases": [
                { "name": "ramp", "duration": 1, "arrivalRate": 4, "rampTo": 12 },
                { "name": "fixed", "duration": 1, "arrivalCount": 3 }
            ],
            "statsInterval": 1
        },
        "scenarios": [
            { "name": "browse", "weight": 3, "flow": [
                { "request": { "name": "home", "latencyMs": [1, 5] } },
                { "think": { "seconds": 0.01 } },
                { "request": { "name": "product", "latencyMs": [1, 5] } }
            ]},
            { "name": "buy", "weight": 1, "flow": [
                { "request": { "name": "checkout", "latencyMs": [1, 5], "errorRate": 1.0 } }
            ]}
        ]
    }))
    .unwrap();

    let mut running = Coordinator::new(
        script,
        json!(null),
        RunOptions {
            run_id: Some("e2e".to_string()),
            environment: None,
        },
    )
    .with_pool_size(PoolSize::new(2).unwrap())
    .with_launcher(WorkerLauncher::new(env!("CARGO_BIN_EXE_surge-worker")))
    .run()
    .unwrap();

    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(event) = running.next_event().await {
            events.push(event);
        }
    })
    .await
    .expect("run did not finish in time");

    let phases = events
        .iter()
        .filter_map(|event| match event {
            CoordinatorEvent::PhaseStarted(phase) => Some(phase.display_name()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(vec!["ramp", "fixed"], phases);

    assert!(
        !events
            .iter()
            .any(|event| matches!(event, CoordinatorEvent::Error(_))),
        "events {events:?}"
    );

    let Some(CoordinatorEvent::Done(report)) = events.last() else {
        panic!("run did not complete: {events:?}");
    };
    // Average rate of 8 over one second split across two workers, plus 3 fixed arrivals.
    assert_eq!(11, report.scenarios_created);
    assert_eq!(11, report.scenarios_completed);
    let failed = report.errors.values().sum::<u64>();
    let succeeded = report.codes.values().sum::<u64>();
    assert_eq!(report.requests_completed, succeeded);
    assert!(failed + succeeded >= 11);
}
